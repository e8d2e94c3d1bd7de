use super::check_response;
use crate::embeddings::Embedder;
use crate::models::GenerationConfig;
use crate::traits::CompletionClient;
use crate::ServiceError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use serde_with::skip_serializing_none;

pub const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_EMBEDDING_MODEL: &str = "models/embedding-001";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-1.5-flash";

const BACKEND: &str = "gemini";
const API_KEY_HEADER: &str = "x-goog-api-key";
const MAX_BATCH: usize = 100;

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

impl<'a> Content<'a> {
    fn text(text: &'a str) -> Self {
        Self {
            parts: vec![Part { text }],
        }
    }
}

/// Documents and queries are embedded asymmetrically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: TaskType,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationBody {
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationBody,
}

pub struct GeminiEmbedder {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl GeminiEmbedder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: GEMINI_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = qualified_model(&model.into());
        self
    }

    fn request<'a>(&'a self, text: &'a str, task_type: TaskType) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: &self.model,
            content: Content::text(text),
            task_type,
        }
    }

    async fn post(&self, method: &str, body: &impl Serialize) -> Result<Value, ServiceError> {
        let response = self
            .client
            .post(format!("{}/{}:{method}", self.endpoint, self.model))
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await?;

        let response = check_response(BACKEND, response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let body = self.request(text, TaskType::RetrievalQuery);
        let parsed = self.post("embedContent", &body).await?;

        parsed
            .pointer("/embedding/values")
            .and_then(values_to_vector)
            .ok_or_else(|| ServiceError::EmptyResponse {
                backend: BACKEND.to_string(),
            })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(MAX_BATCH) {
            let body = BatchEmbedRequest {
                requests: batch
                    .iter()
                    .map(|text| self.request(text, TaskType::RetrievalDocument))
                    .collect(),
            };
            let parsed = self.post("batchEmbedContents", &body).await?;

            let embeddings = parsed
                .pointer("/embeddings")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            if embeddings.len() != batch.len() {
                return Err(ServiceError::BackendResponse {
                    backend: BACKEND.to_string(),
                    details: format!(
                        "asked for {} embeddings, received {}",
                        batch.len(),
                        embeddings.len()
                    ),
                });
            }

            for embedding in embeddings {
                let vector = embedding
                    .pointer("/values")
                    .and_then(values_to_vector)
                    .ok_or_else(|| ServiceError::EmptyResponse {
                        backend: BACKEND.to_string(),
                    })?;
                vectors.push(vector);
            }
        }

        Ok(vectors)
    }
}

pub struct GeminiChat {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_output_tokens: Option<u32>,
}

impl GeminiChat {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: GEMINI_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: qualified_model(DEFAULT_CHAT_MODEL),
            max_output_tokens: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = qualified_model(&model.into());
        self
    }

    pub fn with_max_output_tokens(mut self, limit: u32) -> Self {
        self.max_output_tokens = Some(limit);
        self
    }
}

#[async_trait]
impl CompletionClient for GeminiChat {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn complete(
        &self,
        prompt: &str,
        generation: &GenerationConfig,
    ) -> Result<String, ServiceError> {
        let body = GenerateContentRequest {
            contents: vec![Content::text(prompt)],
            generation_config: GenerationBody {
                temperature: Some(generation.temperature),
                max_output_tokens: self.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/{}:generateContent", self.endpoint, self.model))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;

        let parsed: Value = check_response(BACKEND, response).await?.json().await?;
        candidate_text(&parsed)
    }
}

fn qualified_model(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

fn values_to_vector(values: &Value) -> Option<Vec<f32>> {
    let values = values.as_array()?;
    if values.is_empty() {
        return None;
    }
    values
        .iter()
        .map(|value| value.as_f64().map(|number| number as f32))
        .collect()
}

fn candidate_text(parsed: &Value) -> Result<String, ServiceError> {
    if let Some(reason) = parsed
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
    {
        return Err(ServiceError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!("prompt blocked: {reason}"),
        });
    }

    let parts = parsed
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| ServiceError::EmptyResponse {
            backend: BACKEND.to_string(),
        })?;

    Ok(parts
        .iter()
        .filter_map(|part| part.pointer("/text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn model_names_are_qualified_once() {
        assert_eq!(qualified_model("gemini-1.5-flash"), "models/gemini-1.5-flash");
        assert_eq!(qualified_model("models/embedding-001"), "models/embedding-001");
    }

    #[test]
    fn embed_requests_carry_the_retrieval_task() -> Result<(), serde_json::Error> {
        let embedder = GeminiEmbedder::new("key");

        let query = serde_json::to_value(embedder.request("pump failure", TaskType::RetrievalQuery))?;
        assert_eq!(query["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(query["model"], "models/embedding-001");
        assert_eq!(query["content"]["parts"][0]["text"], "pump failure");

        let document = serde_json::to_value(embedder.request("chunk", TaskType::RetrievalDocument))?;
        assert_eq!(document["taskType"], "RETRIEVAL_DOCUMENT");
        Ok(())
    }

    #[test]
    fn generation_body_omits_unset_fields() -> Result<(), serde_json::Error> {
        let body = GenerationBody {
            temperature: Some(0.3),
            max_output_tokens: None,
        };
        let encoded = serde_json::to_value(&body)?;
        assert!(encoded.get("maxOutputTokens").is_none());
        assert!(encoded.get("temperature").is_some());
        Ok(())
    }

    #[test]
    fn candidate_parts_are_joined() -> Result<(), ServiceError> {
        let parsed = json!({
            "candidates": [
                {"content": {"parts": [{"text": "Boolean query: "}, {"text": "(a AND b)"}]}}
            ]
        });
        assert_eq!(candidate_text(&parsed)?, "Boolean query: (a AND b)");
        Ok(())
    }

    #[test]
    fn blocked_prompt_is_reported() {
        let parsed = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let error = candidate_text(&parsed).err();
        assert!(matches!(error, Some(ServiceError::BackendResponse { .. })));
    }

    #[test]
    fn embedding_values_convert_to_f32() {
        let values = json!([0.5, -1.0, 2]);
        assert_eq!(values_to_vector(&values), Some(vec![0.5, -1.0, 2.0]));
        assert_eq!(values_to_vector(&json!([])), None);
    }
}
