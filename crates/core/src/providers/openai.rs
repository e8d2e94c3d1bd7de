use super::check_response;
use crate::models::GenerationConfig;
use crate::traits::CompletionClient;
use crate::ServiceError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use serde_with::skip_serializing_none;

pub const GROQ_ENDPOINT: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.1-8b-instant";

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

/// Chat client for any `/chat/completions` endpoint speaking the OpenAI
/// wire format (Groq by default).
pub struct OpenAiCompatibleChat {
    client: Client,
    backend: String,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: Option<u32>,
}

impl OpenAiCompatibleChat {
    pub fn groq(api_key: impl Into<String>) -> Self {
        Self::new("groq", GROQ_ENDPOINT, api_key, DEFAULT_GROQ_MODEL)
    }

    pub fn new(
        backend: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            backend: backend.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, limit: u32) -> Self {
        self.max_tokens = Some(limit);
        self
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatibleChat {
    fn backend(&self) -> &str {
        &self.backend
    }

    async fn complete(
        &self,
        prompt: &str,
        generation: &GenerationConfig,
    ) -> Result<String, ServiceError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            temperature: Some(generation.temperature),
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let parsed: Value = check_response(&self.backend, response).await?.json().await?;
        message_content(&self.backend, &parsed)
    }
}

fn message_content(backend: &str, parsed: &Value) -> Result<String, ServiceError> {
    parsed
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ServiceError::EmptyResponse {
            backend: backend.to_string(),
        })
}
