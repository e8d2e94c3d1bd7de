use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pdf_qa_core::entity::DEFAULT_QUERY_TEMPLATE;
use pdf_qa_core::providers::gemini::DEFAULT_CHAT_MODEL;
use pdf_qa_core::providers::openai::DEFAULT_GROQ_MODEL;
use pdf_qa_core::{
    CharacterNgramEmbedder, CompletionClient, DocumentPipeline, Embedder, EntityConfig, EntityRun,
    EntityTable, GeminiChat, GeminiEmbedder, GenerationConfig, IndexStore, Namespace,
    OpenAiCompatibleChat, PipelineError, PipelineOptions, RetrievalConfig, SerpApiClient,
    ServiceError,
};
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type Pipeline = DocumentPipeline<Box<dyn Embedder>, Box<dyn CompletionClient>>;

#[derive(Parser)]
#[command(name = "pdf-qa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding one sub-directory per index namespace.
    #[arg(long, env = "PDF_QA_INDEX_ROOT", default_value = "indexes", global = true)]
    index_root: PathBuf,

    /// Embedding backend used to build and query indexes.
    #[arg(long, value_enum, default_value_t = EmbedderKind::Gemini, global = true)]
    embedder: EmbedderKind,

    /// Completion backend used for answers and entity extraction.
    #[arg(long, value_enum, default_value_t = LlmKind::Gemini, global = true)]
    llm: LlmKind,

    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true, global = true)]
    google_api_key: Option<String>,

    /// Used when GOOGLE_API_KEY is not set.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    gemini_api_key: Option<String>,

    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true, global = true)]
    groq_api_key: Option<String>,

    #[arg(long, env = "SEARCH_API_KEY", hide_env_values = true, global = true)]
    search_api_key: Option<String>,

    /// Gemini chat model.
    #[arg(long, default_value = DEFAULT_CHAT_MODEL, global = true)]
    gemini_model: String,

    /// Groq chat model.
    #[arg(long, default_value = DEFAULT_GROQ_MODEL, global = true)]
    groq_model: String,

    /// Sampling temperature for every completion.
    #[arg(long, default_value = "0.3", global = true)]
    temperature: f32,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    Gemini,
    /// Offline character-trigram embedder.
    Ngram,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LlmKind {
    Gemini,
    Groq,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Target {
    /// Role whose index is used, e.g. "AI Engineer".
    #[arg(long)]
    role: Option<String>,

    /// Explicit index namespace.
    #[arg(long)]
    namespace: Option<String>,
}

impl Target {
    fn namespace(&self) -> anyhow::Result<Namespace> {
        let namespace = match (&self.role, &self.namespace) {
            (Some(role), _) => Namespace::for_role(role)?,
            (None, Some(namespace)) => Namespace::new(namespace.as_str())?,
            (None, None) => bail!("either --role or --namespace is required"),
        };
        Ok(namespace)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Extract, chunk and embed PDFs into a fresh index.
    Ingest {
        #[command(flatten)]
        target: Target,
        /// PDF files or folders containing PDFs.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Answer a question from an existing index.
    Ask {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        question: String,
        /// Number of chunks handed to the model.
        #[arg(long, default_value = "4")]
        top_k: usize,
    },
    /// Interactive session: pick a role, ask, then add PDFs.
    Chat,
    /// Look up every unique value of a CSV column on the web.
    Entities {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        column: String,
        /// Search query with an {entity} placeholder.
        #[arg(long, default_value = DEFAULT_QUERY_TEMPLATE)]
        prompt: String,
        /// Results CSV; printed to stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

/// Stands in for a completion backend whose key was never supplied, so that
/// commands which never call the model still run.
struct MissingKey {
    backend: &'static str,
    variable: &'static str,
}

#[async_trait]
impl CompletionClient for MissingKey {
    fn backend(&self) -> &str {
        self.backend
    }

    async fn complete(&self, _prompt: &str, _generation: &GenerationConfig) -> Result<String, ServiceError> {
        Err(ServiceError::Request(format!("{} is not set", self.variable)))
    }
}

impl Cli {
    fn google_key(&self) -> Option<&str> {
        self.google_api_key
            .as_deref()
            .or(self.gemini_api_key.as_deref())
            .filter(|key| !key.trim().is_empty())
    }

    fn embedder(&self) -> anyhow::Result<Box<dyn Embedder>> {
        match self.embedder {
            EmbedderKind::Ngram => Ok(Box::new(CharacterNgramEmbedder::default())),
            EmbedderKind::Gemini => {
                let key = self
                    .google_key()
                    .ok_or_else(|| anyhow!("GOOGLE_API_KEY or GEMINI_API_KEY is required for --embedder gemini"))?;
                Ok(Box::new(GeminiEmbedder::new(key)))
            }
        }
    }

    fn completion(&self) -> Box<dyn CompletionClient> {
        match self.llm {
            LlmKind::Gemini => match self.google_key() {
                Some(key) => Box::new(GeminiChat::new(key).with_model(self.gemini_model.as_str())),
                None => Box::new(MissingKey {
                    backend: "gemini",
                    variable: "GOOGLE_API_KEY",
                }),
            },
            LlmKind::Groq => match self.groq_api_key.as_deref().filter(|key| !key.trim().is_empty()) {
                Some(key) => Box::new(OpenAiCompatibleChat::groq(key).with_model(self.groq_model.as_str())),
                None => Box::new(MissingKey {
                    backend: "groq",
                    variable: "GROQ_API_KEY",
                }),
            },
        }
    }

    fn generation(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: self.temperature,
        }
    }

    fn pipeline(&self, top_k: usize) -> anyhow::Result<Pipeline> {
        let options = PipelineOptions {
            retrieval: RetrievalConfig { top_k },
            generation: self.generation(),
            ..PipelineOptions::default()
        };
        let pipeline = DocumentPipeline::with_options(
            self.embedder()?,
            self.completion(),
            IndexStore::new(&self.index_root),
            options,
        )?;
        Ok(pipeline)
    }
}

/// Hosted-model failures are shown with the operator-facing message before
/// the error propagates.
fn surface(error: PipelineError) -> anyhow::Error {
    if let PipelineError::Service(service) = &error {
        eprintln!("{}", service.user_message());
    }
    error.into()
}

async fn ingest(pipeline: &Pipeline, namespace: &Namespace, paths: &[PathBuf]) -> anyhow::Result<()> {
    let report = pipeline.ingest(namespace, paths).await.map_err(surface)?;

    info!(
        namespace = %namespace,
        build_id = %report.manifest.build_id,
        "index replaced"
    );
    println!(
        "{} chunks from {} file(s) indexed into '{}' at {}",
        report.chunks,
        report.files.len(),
        namespace,
        Utc::now().to_rfc3339()
    );
    Ok(())
}

async fn ask(pipeline: &Pipeline, namespace: &Namespace, question: &str) -> anyhow::Result<()> {
    let answer = pipeline.ask(namespace, question).await.map_err(surface)?;

    println!("Reply: {}", answer.text);
    for hit in &answer.sources.hits {
        let pages = hit
            .chunk
            .pages
            .iter()
            .map(|page| format!("{}#{}", page.source_path, page.page))
            .collect::<Vec<_>>()
            .join(", ");
        println!("  [{:.4}] chunk={} pages={}", hit.score, hit.chunk.chunk_index, pages);
    }
    Ok(())
}

fn prompt_line(input: &mut impl BufRead, message: &str) -> anyhow::Result<String> {
    print!("{message}");
    io::stdout().flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// An unknown or mismatched index ends the session before any upload prompt.
async fn chat(pipeline: &Pipeline, input: &mut impl BufRead) -> anyhow::Result<()> {
    println!("Chat PDF");
    let role = prompt_line(&mut *input, "Select Role (AI Engineer / GenAI Engineer): ")?;
    let namespace = Namespace::for_role(&role)?;

    let question = prompt_line(
        &mut *input,
        &format!("Ask a Question related to research studies or clinical trials from the {role} PDF Files: "),
    )?;
    if !question.is_empty() {
        ask(pipeline, &namespace, &question).await?;
    }

    let count = prompt_line(&mut *input, &format!("How many {role} PDFs would you like to upload? "))?;
    let count: usize = if count.is_empty() {
        0
    } else {
        count.parse().with_context(|| format!("'{count}' is not a number of files"))?
    };

    let mut paths = Vec::with_capacity(count);
    for position in 1..=count {
        let path = prompt_line(&mut *input, &format!("Enter the path of PDF file {position}: "))?;
        paths.push(PathBuf::from(path));
    }

    if !paths.is_empty() {
        println!("Processing {role} PDFs...");
        ingest(pipeline, &namespace, &paths).await?;
        println!("{role} PDFs Processed Successfully");
    }
    Ok(())
}

async fn entities(
    cli: &Cli,
    input: &Path,
    column: &str,
    prompt: String,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let key = cli
        .search_api_key
        .as_deref()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| anyhow!("SEARCH_API_KEY is required for entity lookup"))?;
    let search = SerpApiClient::new(key);
    let client = cli.completion();

    let config = EntityConfig {
        generation: cli.generation(),
        ..EntityConfig::default()
    };
    let mut run = EntityRun::new(&search, client.as_ref(), config);
    run.start()?;
    run.upload(EntityTable::from_path(input)?)?;
    let selected = run.select_column(column)?.len();
    run.set_query_template(prompt)?;
    info!(column = %column, entities = selected, "entity lookup started");

    let report = run.process().await?;
    for failure in &report.failures {
        warn!(entity = %failure.entity, error = %failure.message, "entity lookup failed");
        eprintln!("Error processing entity {}: {}", failure.entity, failure.message);
    }

    match output {
        Some(path) => {
            pdf_qa_core::write_results(File::create(path)?, &report.rows)?;
            println!("{} rows written to {}", report.rows.len(), path.display());
        }
        None => print!("{}", report.to_csv()?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        index_root = %cli.index_root.display(),
        "pdf-qa boot"
    );

    match &cli.command {
        Command::Ingest { target, paths } => {
            let pipeline = cli.pipeline(RetrievalConfig::default().top_k)?;
            ingest(&pipeline, &target.namespace()?, paths).await?;
        }
        Command::Ask {
            target,
            question,
            top_k,
        } => {
            let pipeline = cli.pipeline(*top_k)?;
            ask(&pipeline, &target.namespace()?, question).await?;
        }
        Command::Chat => {
            let pipeline = cli.pipeline(RetrievalConfig::default().top_k)?;
            chat(&pipeline, &mut io::stdin().lock()).await?;
        }
        Command::Entities {
            input,
            column,
            prompt,
            output,
        } => {
            entities(&cli, input, column, prompt.clone(), output.as_deref()).await?;
        }
    }

    Ok(())
}
