pub mod gemini;
pub mod openai;
pub mod serpapi;

pub use gemini::{GeminiChat, GeminiEmbedder};
pub use openai::OpenAiCompatibleChat;
pub use serpapi::SerpApiClient;

use crate::ServiceError;
use reqwest::{Response, StatusCode};

const CREDENTIAL_MARKERS: [&str; 4] = [
    "API_KEY_INVALID",
    "invalid_api_key",
    "Invalid API key",
    "API key not valid",
];

const MAX_ERROR_BODY: usize = 512;

/// Passes successful responses through and turns everything else into a
/// [`ServiceError`], separating rejected credentials from other failures.
pub(crate) async fn check_response(backend: &str, response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_failure(backend, status, &body))
}

pub(crate) fn classify_failure(backend: &str, status: StatusCode, body: &str) -> ServiceError {
    let mut details = format!("{status}: {}", body.trim());
    if details.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !details.is_char_boundary(cut) {
            cut -= 1;
        }
        details.truncate(cut);
    }

    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || mentions_bad_credential(body)
    {
        ServiceError::InvalidCredential {
            backend: backend.to_string(),
            details,
        }
    } else {
        ServiceError::BackendResponse {
            backend: backend.to_string(),
            details,
        }
    }
}

pub(crate) fn mentions_bad_credential(text: &str) -> bool {
    CREDENTIAL_MARKERS.iter().any(|marker| text.contains(marker))
}
