use super::{check_response, mentions_bad_credential};
use crate::models::{OrganicResult, SearchResults};
use crate::traits::WebSearch;
use crate::ServiceError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use url::Url;

pub const SERPAPI_ENDPOINT: &str = "https://serpapi.com/search.json";
pub const DEFAULT_ENGINE: &str = "google";

const BACKEND: &str = "serpapi";

pub struct SerpApiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    engine: String,
}

impl SerpApiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: SERPAPI_ENDPOINT.to_string(),
            api_key: api_key.into(),
            engine: DEFAULT_ENGINE.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    fn request_url(&self, query: &str) -> Result<Url, ServiceError> {
        Ok(Url::parse_with_params(
            &self.endpoint,
            &[
                ("engine", self.engine.as_str()),
                ("q", query),
                ("api_key", self.api_key.as_str()),
            ],
        )?)
    }
}

#[async_trait]
impl WebSearch for SerpApiClient {
    async fn search(&self, query: &str) -> Result<SearchResults, ServiceError> {
        if query.trim().is_empty() {
            return Err(ServiceError::Request("search query is empty".to_string()));
        }

        let response = self.client.get(self.request_url(query)?).send().await?;
        let raw: Value = check_response(BACKEND, response).await?.json().await?;
        parse_results(query, raw)
    }
}

fn parse_results(query: &str, raw: Value) -> Result<SearchResults, ServiceError> {
    if let Some(message) = raw.pointer("/error").and_then(Value::as_str) {
        let details = message.to_string();
        return Err(if mentions_bad_credential(message) {
            ServiceError::InvalidCredential {
                backend: BACKEND.to_string(),
                details,
            }
        } else {
            ServiceError::BackendResponse {
                backend: BACKEND.to_string(),
                details,
            }
        });
    }

    let organic = match raw.pointer("/organic_results") {
        Some(listed) => serde_json::from_value::<Vec<OrganicResult>>(listed.clone())?,
        None => Vec::new(),
    };

    Ok(SearchResults {
        query: query.to_string(),
        organic,
        raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_url_encodes_query() -> Result<(), ServiceError> {
        let client = SerpApiClient::new("key-123");
        let url = client.request_url("Find information about Acme & Co")?;
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        assert!(pairs.contains(&("engine".to_string(), "google".to_string())));
        assert!(pairs.contains(&("q".to_string(), "Find information about Acme & Co".to_string())));
        assert!(pairs.contains(&("api_key".to_string(), "key-123".to_string())));
        Ok(())
    }

    #[test]
    fn organic_results_are_parsed() -> Result<(), ServiceError> {
        let raw = json!({
            "search_metadata": {"status": "Success"},
            "organic_results": [
                {"position": 1, "title": "Acme Corp", "link": "https://acme.example", "snippet": "Contact us"},
                {"position": 2, "title": "Acme on Wiki"}
            ]
        });

        let results = parse_results("acme", raw)?;
        assert_eq!(results.organic.len(), 2);
        assert_eq!(results.organic[1].snippet, "");
        assert!(results.to_prompt_context().contains("https://acme.example"));
        Ok(())
    }

    #[test]
    fn error_field_is_a_failure() {
        let bad_key = parse_results("q", json!({"error": "Invalid API key. Your API key should be here: https://serpapi.com/manage-api-key"}));
        assert!(matches!(bad_key, Err(ServiceError::InvalidCredential { .. })));

        let quota = parse_results("q", json!({"error": "Your account has run out of searches."}));
        assert!(matches!(quota, Err(ServiceError::BackendResponse { .. })));
    }
}
