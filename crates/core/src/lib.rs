pub mod answer;
pub mod chunking;
pub mod embeddings;
pub mod entity;
pub mod error;
pub mod extractor;
pub mod indexer;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod retriever;
pub mod store;
pub mod traits;

pub use answer::{stuff_context, Answer, Answerer, PromptTemplate, DEFAULT_QA_TEMPLATE};
pub use chunking::{Chunker, ChunkingConfig, TextChunk, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use embeddings::{
    cosine_similarity, CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use entity::{
    lookup_entities, write_results, EntityConfig, EntityReport, EntityRun, EntityTable, RunState,
    NO_DATA_FOUND, NO_RELEVANT_DATA,
};
pub use error::{
    EntityError, IndexError, IngestError, PipelineError, ServiceError, TemplateError,
};
pub use extractor::{extract_text, LopdfExtractor, PageText, PdfExtractor};
pub use indexer::Indexer;
pub use ingest::{chunk_extracted, collect_inputs, discover_pdf_files};
pub use models::{
    ExtractedText, GenerationConfig, IndexedChunk, OrganicResult, PageRef, PageSpan, QueryResult,
    ResultRow, RetrievalConfig, ScoredChunk, SearchResults,
};
pub use pipeline::{DocumentPipeline, IngestReport, PipelineOptions};
pub use providers::{GeminiChat, GeminiEmbedder, OpenAiCompatibleChat, SerpApiClient};
pub use retriever::Retriever;
pub use store::{IndexManifest, IndexStore, Namespace, VectorIndex};
pub use traits::{CompletionClient, WebSearch};
