use crate::models::{GenerationConfig, SearchResults};
use crate::ServiceError;
use async_trait::async_trait;

#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn backend(&self) -> &str;

    async fn complete(
        &self,
        prompt: &str,
        generation: &GenerationConfig,
    ) -> Result<String, ServiceError>;
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchResults, ServiceError>;
}

#[async_trait]
impl<T: CompletionClient + ?Sized> CompletionClient for Box<T> {
    fn backend(&self) -> &str {
        (**self).backend()
    }

    async fn complete(
        &self,
        prompt: &str,
        generation: &GenerationConfig,
    ) -> Result<String, ServiceError> {
        (**self).complete(prompt, generation).await
    }
}
