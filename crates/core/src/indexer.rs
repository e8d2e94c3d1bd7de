use crate::embeddings::Embedder;
use crate::error::PipelineError;
use crate::models::IndexedChunk;
use crate::store::{IndexManifest, IndexStore, Namespace, VectorIndex};
use tracing::info;

/// Embeds chunks and persists them as the index for a namespace.
pub struct Indexer<'a, E: ?Sized> {
    embedder: &'a E,
    store: &'a IndexStore,
}

impl<'a, E> Indexer<'a, E>
where
    E: Embedder + ?Sized,
{
    pub fn new(embedder: &'a E, store: &'a IndexStore) -> Self {
        Self { embedder, store }
    }

    pub async fn build(&self, chunks: Vec<IndexedChunk>) -> Result<VectorIndex, PipelineError> {
        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_batch(&texts).await?
        };

        Ok(VectorIndex::build(self.embedder.model(), chunks, vectors)?)
    }

    /// Overwrites any index already stored under `namespace`.
    pub async fn index(
        &self,
        namespace: &Namespace,
        chunks: Vec<IndexedChunk>,
    ) -> Result<IndexManifest, PipelineError> {
        let index = self.build(chunks).await?;
        let manifest = self.store.save(namespace, &index)?;

        info!(
            namespace = %namespace,
            model = %manifest.model,
            entries = manifest.entries,
            dimensions = manifest.dimensions,
            "index saved"
        );

        Ok(manifest)
    }
}
