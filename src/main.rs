use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use code_rag::config::{Config, EmbeddingBackend};
use code_rag::embedding::{CachedEmbedding, EmbeddingProvider, OllamaEmbedding, OpenAIEmbedding};
use code_rag::generator::{AnswerGenerator, OllamaGenerator};
use code_rag::vector_db::{sanitize_collection_name, MilvusVectorDatabase, VectorDatabase};
use code_rag::{build_context, ChunkStrategy, Chunker, Indexer, RetrievalResult, Retriever};

#[derive(Parser)]
#[command(name = "code-rag", version, about = "Index a code base and ask questions about it")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed and store every code file under a directory
    Index {
        #[arg(long, short)]
        path: PathBuf,
        /// Defaults to the directory name
        #[arg(long, short)]
        collection: Option<String>,
        #[arg(long)]
        strategy: Option<ChunkStrategy>,
        /// Maximum tokens per chunk
        #[arg(long)]
        max_chunk: Option<usize>,
        /// Token overlap between sliding windows
        #[arg(long)]
        overlap: Option<usize>,
    },
    /// Retrieve relevant code for a question and answer it
    Query {
        question: String,
        #[arg(long, short)]
        collection: String,
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
        #[arg(long)]
        threshold: Option<f32>,
        #[arg(long)]
        max_context: Option<usize>,
        /// Print the retrieved chunks instead of generating an answer
        #[arg(long)]
        no_llm: bool,
        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,
    },
    /// List collections with their entry counts
    List,
    /// Drop a collection
    Delete {
        #[arg(long, short)]
        collection: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

/// Load .env files from multiple locations with priority order:
/// 1. Current working directory (project-specific config)
/// 2. XDG config directory ~/.config/code-rag/.env (global default config)
///
/// Environment variables set directly in the shell always take highest priority.
fn load_env_files() {
    let cwd_env = std::env::current_dir().map(|p| p.join(".env")).ok();
    if let Some(path) = cwd_env {
        if path.exists() && dotenv::from_path(&path).is_ok() {
            tracing::debug!("Loaded .env from: {}", path.display());
            return;
        }
    }

    if let Some(config_dir) = get_xdg_config_dir() {
        let xdg_env = config_dir.join("code-rag").join(".env");
        if xdg_env.exists() && dotenv::from_path(&xdg_env).is_ok() {
            tracing::debug!("Loaded .env from: {}", xdg_env.display());
            return;
        }
    }

    tracing::debug!("No .env file found, using environment variables only");
}

/// Get XDG config directory, fallback to ~/.config
fn get_xdg_config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
}

const GENERATION_HINT: &str = "Answer generation failed; rerun with --no-llm to see retrieved code";

fn build_embedding(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedding = &config.embedding;
    let provider: Arc<dyn EmbeddingProvider> = match embedding.provider {
        EmbeddingBackend::Ollama => {
            Arc::new(OllamaEmbedding::new(&embedding.ollama_host, &embedding.model))
        }
        EmbeddingBackend::OpenAI => {
            let api_key = embedding
                .openai_api_key
                .as_deref()
                .context("OPENAI_API_KEY must be set when EMBEDDING_PROVIDER=openai")?;
            Arc::new(OpenAIEmbedding::new(api_key, &embedding.model))
        }
    };
    Ok(provider)
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_files();

    // Logs go to stderr so they never mix with command output
    let env_filter =
        EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    let store: Arc<dyn VectorDatabase> = Arc::new(MilvusVectorDatabase::new(&config.milvus_address));

    match cli.command {
        Command::Index {
            path,
            collection,
            strategy,
            max_chunk,
            overlap,
        } => {
            if !path.is_dir() {
                anyhow::bail!("Path is not a directory: {}", path.display());
            }
            let root = path
                .canonicalize()
                .with_context(|| format!("Failed to resolve path: {}", path.display()))?;
            let repo_name = root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "repo".to_string());
            let collection = sanitize_collection_name(collection.as_deref().unwrap_or(&repo_name));

            if let Some(strategy) = strategy {
                config.chunking.strategy = strategy;
            }
            if let Some(max_chunk) = max_chunk {
                config.chunking.max_chunk_tokens = max_chunk;
            }
            if let Some(overlap) = overlap {
                config.chunking.overlap_tokens = overlap;
            }

            println!(
                "Indexing {} into '{}' (strategy: {}, max chunk: {} tokens)",
                root.display(),
                collection,
                config.chunking.strategy,
                config.chunking.max_chunk_tokens
            );
            let indexer = Indexer::new(
                Chunker::new(config.chunking.clone()),
                build_embedding(&config)?,
                store,
            );
            let report = indexer.index_directory(&root, &collection, &repo_name).await?;

            println!("Files found:   {}", report.files_seen);
            println!("Files indexed: {}", report.files_indexed);
            println!("Files skipped: {}", report.files_skipped);
            println!("Chunks stored: {}", report.chunks);
        }

        Command::Query {
            question,
            collection,
            top_k,
            threshold,
            max_context,
            no_llm,
            stream,
        } => {
            let top_k = top_k.unwrap_or(config.retrieval.top_k);
            let threshold = threshold.unwrap_or(config.retrieval.similarity_threshold);
            let max_context = max_context.unwrap_or(config.retrieval.max_context_tokens);

            let embedding: Arc<dyn EmbeddingProvider> =
                Arc::new(CachedEmbedding::new(build_embedding(&config)?));
            let retriever = Retriever::new(embedding, store.clone(), config.retrieval.clone())
                .with_collection(&collection);
            let bound = retriever.collection().unwrap_or_default();
            if !store.has_collection(bound).await? {
                anyhow::bail!(
                    "Collection '{}' not found. Run `code-rag list` to see available collections.",
                    bound
                );
            }

            let results = retriever.retrieve(&question, top_k, None, threshold).await?;
            if results.is_empty() {
                println!("No relevant results found.");
                return Ok(());
            }

            print_results(&results);

            if no_llm {
                println!();
                for (i, result) in results.iter().enumerate() {
                    println!("--- [{}] {} ---", i + 1, result.file_path().unwrap_or("unknown"));
                    println!("{}", result.content);
                }
                return Ok(());
            }

            let context = build_context(&results, max_context, true)?;
            if let Some(notice) = empty_context_notice(&context, max_context) {
                println!("\n{}", notice);
            }
            let generator = OllamaGenerator::new(&config.llm);
            if stream {
                print_streamed_answer(&generator, &question, &context)
                    .await
                    .context(GENERATION_HINT)?;
            } else {
                let answer = generator
                    .generate(&question, &context)
                    .await
                    .context(GENERATION_HINT)?;
                println!("\n{}", answer);
            }
        }

        Command::List => {
            let collections = store.list_collections().await?;
            if collections.is_empty() {
                println!("No collections yet. Create one with: code-rag index --path <dir>");
                return Ok(());
            }
            println!("{:<40} {:>10}", "COLLECTION", "CHUNKS");
            for info in collections {
                println!("{:<40} {:>10}", info.name, info.count);
            }
        }

        Command::Delete { collection, yes } => {
            let collection = sanitize_collection_name(&collection);
            if !yes && !confirm(&format!("Delete collection '{}'?", collection))? {
                println!("Cancelled.");
                return Ok(());
            }
            store.drop_collection(&collection).await?;
            println!("Deleted collection '{}'", collection);
        }
    }

    Ok(())
}

async fn print_streamed_answer(
    generator: &dyn AnswerGenerator,
    question: &str,
    context: &str,
) -> Result<()> {
    let mut pieces = generator.generate_stream(question, context).await?;
    let mut stdout = io::stdout();
    writeln!(stdout)?;
    while let Some(piece) = pieces.next().await {
        write!(stdout, "{}", piece?)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}

/// Shown when no retrieved fragment fits the budget and the question goes out alone
fn empty_context_notice(context: &str, max_context: usize) -> Option<String> {
    context.is_empty().then(|| {
        format!(
            "No usable context: no retrieved fragment fits in {} tokens. Asking without code context.",
            max_context
        )
    })
}

fn result_row(index: usize, result: &RetrievalResult) -> String {
    format!(
        "{:>3}  {:<40} {:<11} {:<12} {:<24} {:>10.3}",
        index,
        result.file_path().unwrap_or("unknown"),
        result.line_span(),
        result.chunk_type().unwrap_or("code"),
        result.name().unwrap_or("-"),
        result.similarity
    )
}

fn print_results(results: &[RetrievalResult]) {
    println!("Found {} code fragments:\n", results.len());
    println!(
        "{:>3}  {:<40} {:<11} {:<12} {:<24} {:>10}",
        "#", "FILE", "LINES", "TYPE", "NAME", "SIMILARITY"
    );
    for (i, result) in results.iter().enumerate() {
        println!("{}", result_row(i + 1, result));
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
