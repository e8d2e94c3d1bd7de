use crate::embeddings::Embedder;
use crate::error::PipelineError;
use crate::models::{QueryResult, RetrievalConfig};
use crate::store::{IndexStore, Namespace, VectorIndex};
use tracing::debug;

/// A loaded index paired with the embedder that must match its model.
pub struct Retriever<'a, E: ?Sized> {
    namespace: Namespace,
    index: VectorIndex,
    embedder: &'a E,
    config: RetrievalConfig,
}

impl<'a, E> Retriever<'a, E>
where
    E: Embedder + ?Sized,
{
    /// Fails with `IndexError::NotFound` when nothing was built under
    /// `namespace`, never with an empty retriever.
    pub fn open(
        store: &IndexStore,
        namespace: &Namespace,
        embedder: &'a E,
        config: RetrievalConfig,
    ) -> Result<Self, PipelineError> {
        let index = store.load(namespace, embedder.model())?;
        Ok(Self {
            namespace: namespace.clone(),
            index,
            embedder,
            config,
        })
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub async fn retrieve(&self, query: &str) -> Result<QueryResult, PipelineError> {
        if query.trim().is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        let query_vector = self.embedder.embed(query).await?;
        let hits = self.index.search(&query_vector, self.config.top_k)?;

        debug!(
            namespace = %self.namespace,
            hits = hits.len(),
            best = hits.first().map(|hit| hit.score).unwrap_or_default(),
            "retrieved chunks"
        );

        Ok(QueryResult {
            query: query.to_string(),
            hits,
        })
    }
}
