use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error in {path}: {details}")]
    PdfParse { path: String, details: String },

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no index found for namespace '{0}'")]
    NotFound(String),

    #[error("invalid namespace '{0}': use letters, digits, '_', '-' or '.'")]
    InvalidNamespace(String),

    #[error("index for namespace '{namespace}' failed integrity check: expected {expected}, found {actual}")]
    Integrity {
        namespace: String,
        expected: String,
        actual: String,
    },

    #[error("index for namespace '{namespace}' could not be decoded: {details}")]
    Deserialization { namespace: String, details: String },

    #[error("index for namespace '{namespace}' was built with model '{stored}', not '{requested}'")]
    ModelMismatch {
        namespace: String,
        stored: String,
        requested: String,
    },

    #[error("vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding count {embeddings} doesn't match chunk count {chunks}")]
    CountMismatch { chunks: usize, embeddings: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{backend} rejected the API key: {details}")]
    InvalidCredential { backend: String, details: String },

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("{backend} returned no usable content")]
    EmptyResponse { backend: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("request rejected before sending: {0}")]
    Request(String),
}

impl ServiceError {
    pub fn is_invalid_credential(&self) -> bool {
        matches!(self, ServiceError::InvalidCredential { .. })
    }

    /// Message shown to an operator when a hosted model call fails.
    pub fn user_message(&self) -> String {
        if self.is_invalid_credential() {
            "Invalid API Key. Please enter a valid API Key.".to_string()
        } else {
            format!("Failed to configure API due to {self}")
        }
    }
}

#[derive(Debug, Error)]
pub enum EntityError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("column '{column}' not found; available: {available}")]
    MissingColumn { column: String, available: String },

    #[error("cannot {action} while run is {state}")]
    InvalidTransition { action: String, state: String },
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("prompt template is missing the {0} placeholder")]
    MissingPlaceholder(&'static str),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("query is empty")]
    EmptyQuery,
}
