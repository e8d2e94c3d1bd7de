use crate::answer::{Answer, Answerer, PromptTemplate};
use crate::chunking::{Chunker, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::PipelineError;
use crate::extractor::{extract_text, LopdfExtractor};
use crate::indexer::Indexer;
use crate::ingest::{chunk_extracted, collect_inputs};
use crate::models::{ExtractedText, GenerationConfig, QueryResult, RetrievalConfig};
use crate::retriever::Retriever;
use crate::store::{IndexManifest, IndexStore, Namespace};
use crate::traits::CompletionClient;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
    pub template: PromptTemplate,
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub files: Vec<PathBuf>,
    pub characters: usize,
    pub chunks: usize,
    pub manifest: IndexManifest,
}

/// Extract → chunk → embed → persist, and later retrieve → answer, against
/// one explicit index store.
pub struct DocumentPipeline<E, C> {
    embedder: E,
    completion: C,
    store: IndexStore,
    extractor: LopdfExtractor,
    chunker: Chunker,
    options: PipelineOptions,
}

impl<E, C> DocumentPipeline<E, C>
where
    E: Embedder,
    C: CompletionClient,
{
    pub fn new(embedder: E, completion: C, store: IndexStore) -> Result<Self, PipelineError> {
        Self::with_options(embedder, completion, store, PipelineOptions::default())
    }

    pub fn with_options(
        embedder: E,
        completion: C,
        store: IndexStore,
        options: PipelineOptions,
    ) -> Result<Self, PipelineError> {
        let chunker = Chunker::new(options.chunking.clone())?;
        Ok(Self {
            embedder,
            completion,
            store,
            extractor: LopdfExtractor,
            chunker,
            options,
        })
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Reads every PDF in `inputs` and replaces the index under `namespace`.
    pub async fn ingest<P: AsRef<Path>>(
        &self,
        namespace: &Namespace,
        inputs: &[P],
    ) -> Result<IngestReport, PipelineError> {
        let files = collect_inputs(inputs)?;
        let extracted = extract_text(&self.extractor, &files)?;

        info!(
            namespace = %namespace,
            files = files.len(),
            characters = extracted.text.len(),
            "extracted text"
        );

        let (chunks, manifest) = self.index_text(namespace, &extracted).await?;
        Ok(IngestReport {
            files,
            characters: extracted.text.len(),
            chunks,
            manifest,
        })
    }

    pub async fn index_text(
        &self,
        namespace: &Namespace,
        extracted: &ExtractedText,
    ) -> Result<(usize, IndexManifest), PipelineError> {
        let chunks = chunk_extracted(&self.chunker, extracted);
        let count = chunks.len();
        let manifest = Indexer::new(&self.embedder, &self.store)
            .index(namespace, chunks)
            .await?;
        Ok((count, manifest))
    }

    pub async fn retrieve(&self, namespace: &Namespace, query: &str) -> Result<QueryResult, PipelineError> {
        Retriever::open(&self.store, namespace, &self.embedder, self.options.retrieval)?
            .retrieve(query)
            .await
    }

    pub async fn ask(&self, namespace: &Namespace, question: &str) -> Result<Answer, PipelineError> {
        let retrieved = self.retrieve(namespace, question).await?;
        Answerer::new(&self.completion)
            .with_template(self.options.template.clone())
            .with_generation(self.options.generation)
            .answer(retrieved, question)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::fakes::RecordingClient;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::IndexError;
    use crate::extractor::fixtures::write_pdf;
    use tempfile::tempdir;

    const PAGE_ONE: &str = "Hydraulic pumps move fluid under steady pressure.";
    const PAGE_THREE: &str = "Glacier retreat accelerates during warm alpine summers.";

    fn pipeline(
        root: &Path,
        chunking: ChunkingConfig,
    ) -> Result<DocumentPipeline<CharacterNgramEmbedder, RecordingClient>, PipelineError> {
        DocumentPipeline::with_options(
            CharacterNgramEmbedder::default(),
            RecordingClient::replying("glacier AND retreat"),
            IndexStore::new(root.join("indexes")),
            PipelineOptions {
                chunking,
                ..PipelineOptions::default()
            },
        )
    }

    #[tokio::test]
    async fn page_three_phrase_retrieves_page_three_chunk() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let pdf = dir.path().join("report.pdf");
        write_pdf(&pdf, &[PAGE_ONE, "", PAGE_THREE])?;

        let pipeline = pipeline(dir.path(), ChunkingConfig::with_size(10_000, 1_000))?;
        let namespace = Namespace::new("test")?;
        let report = pipeline.ingest(&namespace, &[&pdf]).await?;
        assert_eq!(report.files.len(), 1);
        assert_eq!(report.chunks, 1);

        let result = pipeline.retrieve(&namespace, "Glacier retreat accelerates").await?;
        let top = result.top().ok_or("no hits")?;
        assert!(top.chunk.from_page(3));
        assert!(!top.chunk.from_page(2));
        assert!(top.chunk.text.contains(PAGE_THREE));
        Ok(())
    }

    #[tokio::test]
    async fn small_chunks_keep_pages_apart() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let pdf = dir.path().join("report.pdf");
        write_pdf(&pdf, &[PAGE_ONE, "", PAGE_THREE])?;

        let pipeline = pipeline(dir.path(), ChunkingConfig::with_size(60, 0))?;
        let namespace = Namespace::new("small")?;
        let report = pipeline.ingest(&namespace, &[&pdf]).await?;
        assert!(report.chunks >= 2);

        let result = pipeline.retrieve(&namespace, "Glacier retreat accelerates").await?;
        assert_eq!(result.hits.len(), report.chunks.min(4));
        let top = result.top().ok_or("no hits")?;
        assert!(top.chunk.from_page(3));
        assert!(result.hits.iter().all(|hit| !hit.chunk.from_page(2)));
        Ok(())
    }

    #[tokio::test]
    async fn ask_sends_retrieved_context_to_the_model() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let pdf = dir.path().join("report.pdf");
        write_pdf(&pdf, &[PAGE_ONE, "", PAGE_THREE])?;

        let pipeline = pipeline(dir.path(), ChunkingConfig::default())?;
        let namespace = Namespace::for_role("AI Engineer")?;
        pipeline.ingest(&namespace, &[dir.path()]).await?;

        let answer = pipeline.ask(&namespace, "glacier studies").await?;
        assert_eq!(answer.text, "glacier AND retreat");
        assert_eq!(answer.sources.hits.len(), 1);

        let prompts = pipeline.completion.prompts();
        assert!(prompts[0].contains(PAGE_THREE));
        assert!(prompts[0].contains("glacier studies"));
        Ok(())
    }

    #[tokio::test]
    async fn asking_an_unbuilt_namespace_fails() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let pipeline = pipeline(dir.path(), ChunkingConfig::default())?;
        let result = pipeline.ask(&Namespace::for_role("Nobody")?, "anything").await;

        assert!(matches!(
            result,
            Err(PipelineError::Index(IndexError::NotFound(_)))
        ));
        assert!(pipeline.completion.prompts().is_empty());
        Ok(())
    }
}
