//! # Lorekeeper CLI (`lore`)
//!
//! The `lore` binary is the primary interface for Lorekeeper. It provides
//! commands for index initialization, document ingestion, querying, source
//! statistics, and starting the HTTP query API.
//!
//! ## Usage
//!
//! ```bash
//! lore --config ./config/lore.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lore init` | Provision the vector index and metadata catalog |
//! | `lore ingest <path>` | Ingest normalized document JSON files |
//! | `lore query "<text>"` | Ask a question over the indexed chunks |
//! | `lore sources` | Show per-source document and chunk counts |
//! | `lore serve` | Start the HTTP query API |
//!
//! ## Examples
//!
//! ```bash
//! # Provision the database
//! lore init --config ./config/lore.toml
//!
//! # Ingest a directory of normalized documents
//! lore ingest ./normalized/ --config ./config/lore.toml
//!
//! # Ask a question, restricted to wiki and tracker sources
//! lore query "how do we rotate the signing keys?" --source wiki,tracker
//!
//! # Start the HTTP API
//! lore serve --config ./config/lore.toml
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use lorekeeper::answer::{Answerer, HttpChatModel};
use lorekeeper::catalog::{Catalog, SqliteCatalog};
use lorekeeper::config::{load_config, Config};
use lorekeeper::db;
use lorekeeper::embedding::HttpEmbedder;
use lorekeeper::error::PipelineError;
use lorekeeper::index::{SqliteIndex, VectorIndex};
use lorekeeper::models::{derive_document_id, NormalizedDocument, SourceType};
use lorekeeper::pipeline::{IngestPipeline, QueryPipeline};
use lorekeeper::retrieve::Retriever;
use lorekeeper::server::run_server;
use lorekeeper::stats::run_sources;

/// Lorekeeper CLI — retrieval-augmented question answering over
/// organizational knowledge sources.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lore.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lore",
    about = "Lorekeeper — retrieval-augmented question answering over organizational knowledge",
    version,
    long_about = "Lorekeeper ingests documents normalized from wikis, chat transcripts, issue \
    trackers, and code repositories, chunks and embeds them into a vector index, and answers \
    natural-language questions grounded in the most relevant chunks."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lore.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Provision the vector index and metadata catalog.
    ///
    /// Idempotent: re-running against an existing database is a no-op,
    /// but a database provisioned for a different embedding model or
    /// dimension is rejected rather than silently reused.
    Init,

    /// Ingest normalized document JSON files.
    ///
    /// `path` may be a single `.json` file or a directory of them, one
    /// normalized document per file. A failing document is reported and
    /// skipped; the rest of the batch continues.
    Ingest {
        /// File or directory of normalized document JSON files.
        path: PathBuf,
    },

    /// Ask a question over the indexed chunks.
    Query {
        /// The question to answer.
        text: String,

        /// Number of chunks to retrieve as context.
        #[arg(long)]
        top_k: Option<usize>,

        /// Comma-separated source types to search (wiki, chat, tracker, repo).
        #[arg(long)]
        source: Option<String>,
    },

    /// Show per-source document counts and total indexed chunks.
    Sources,

    /// Start the HTTP query API.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Ingest { path } => run_ingest(&config, &path).await,
        Commands::Query {
            text,
            top_k,
            source,
        } => run_query(&config, &text, top_k, source.as_deref()).await,
        Commands::Sources => {
            let (index, _) = open_stores(&config).await?;
            run_sources(index.as_ref()).await
        }
        Commands::Serve => run_serve(&config).await,
    }
}

/// Open the index and catalog, ensuring both schemas exist and the index
/// agrees with the configured embedding model.
async fn open_stores(config: &Config) -> Result<(Arc<SqliteIndex>, Arc<SqliteCatalog>)> {
    let pool = db::connect(&config.db.path).await?;

    let index = Arc::new(SqliteIndex::new(
        pool.clone(),
        &config.embedding.model,
        config.embedding.dims,
    ));
    let catalog = Arc::new(SqliteCatalog::new(pool));

    index
        .ensure_schema()
        .await
        .context("failed to provision vector index")?;
    catalog
        .ensure_schema()
        .await
        .context("failed to provision metadata catalog")?;

    Ok((index, catalog))
}

async fn run_init(config: &Config) -> Result<()> {
    open_stores(config).await?;
    println!("initialized {}", config.db.path.display());
    Ok(())
}

async fn run_ingest(config: &Config, path: &Path) -> Result<()> {
    let files = collect_document_files(path)?;
    if files.is_empty() {
        bail!("no .json document files found under {}", path.display());
    }

    let (index, catalog) = open_stores(config).await?;
    let embedder = Arc::new(HttpEmbedder::new(&config.embedding)?);

    let pipeline = IngestPipeline::new(
        config.chunking.clone(),
        &config.embedding,
        embedder,
        index.clone() as Arc<dyn VectorIndex>,
        catalog.clone() as Arc<dyn Catalog>,
    );

    let mut ingested = 0u64;
    let mut chunks_written = 0u64;
    let mut skipped = 0u64;
    let mut failed = 0u64;

    for file in &files {
        let document = match read_document(file) {
            Ok(doc) => doc,
            Err(e) => {
                eprintln!("  skipping {}: {e:#}", file.display());
                failed += 1;
                continue;
            }
        };

        // One document's failure must not abort its siblings.
        match pipeline.ingest(&document).await {
            Ok(result) => {
                ingested += 1;
                chunks_written += result.chunks_written as u64;
            }
            Err(e) if matches!(e.root(), PipelineError::DocumentTooShort { .. }) => {
                tracing::warn!(file = %file.display(), "document too short, skipped");
                skipped += 1;
            }
            Err(e) => {
                eprintln!("  failed {}: {e}", file.display());
                failed += 1;
            }
        }
    }

    println!("ingest {}", path.display());
    println!("  files found: {}", files.len());
    println!("  ingested documents: {ingested}");
    println!("  chunks written: {chunks_written}");
    if skipped > 0 {
        println!("  skipped (too short): {skipped}");
    }
    if failed > 0 {
        println!("  failed: {failed}");
    }
    println!("ok");

    Ok(())
}

async fn run_query(
    config: &Config,
    text: &str,
    top_k: Option<usize>,
    source: Option<&str>,
) -> Result<()> {
    let source_filter = match source {
        Some(s) => Some(parse_source_filter(s)?),
        None => None,
    };

    let (index, _) = open_stores(config).await?;
    let embedder = Arc::new(HttpEmbedder::new(&config.embedding)?);
    let chat = Arc::new(HttpChatModel::new(&config.generation)?);

    let pipeline = QueryPipeline::new(
        Retriever::new(embedder, index as Arc<dyn VectorIndex>),
        Answerer::new(chat),
    );

    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let output = pipeline
        .query(text, top_k, source_filter.as_deref())
        .await?;

    println!("{}", output.answer);

    if !output.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, s) in output.sources.iter().enumerate() {
            println!(
                "{}. [{:.3}] {} ({})",
                i + 1,
                s.relevance_score,
                s.title,
                s.source_type
            );
            println!("    url: {}", s.url);
            println!("    \"{}\"", s.snippet.replace('\n', " "));
        }
    }

    Ok(())
}

async fn run_serve(config: &Config) -> Result<()> {
    let (index, _) = open_stores(config).await?;
    let embedder = Arc::new(HttpEmbedder::new(&config.embedding)?);
    let chat = Arc::new(HttpChatModel::new(&config.generation)?);

    let index: Arc<dyn VectorIndex> = index;
    let pipeline = Arc::new(QueryPipeline::new(
        Retriever::new(embedder, index.clone()),
        Answerer::new(chat),
    ));

    run_server(
        &config.server.bind,
        pipeline,
        index,
        config.retrieval.top_k,
    )
    .await
}

/// Gather the `.json` files to ingest from a file or directory path.
fn collect_document_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        bail!("no such file or directory: {}", path.display());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(path)
        .with_context(|| format!("failed to read directory {}", path.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

/// Parse a normalized document file, deriving its `document_id` from the
/// source identity when the normalizer didn't supply one.
fn read_document(path: &Path) -> Result<NormalizedDocument> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut value: serde_json::Value =
        serde_json::from_str(&content).with_context(|| "invalid JSON")?;

    if value.get("document_id").is_none() {
        let source_type = value
            .get("source_type")
            .and_then(|s| s.as_str())
            .and_then(SourceType::parse)
            .ok_or_else(|| anyhow::anyhow!("missing or unknown source_type"))?;
        let source_url = value
            .get("source_url")
            .and_then(|s| s.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing source_url"))?;

        let id = derive_document_id(source_type, source_url);
        value["document_id"] = serde_json::Value::String(id);
    }

    let document: NormalizedDocument =
        serde_json::from_value(value).with_context(|| "invalid normalized document")?;
    Ok(document)
}

/// Parse a comma-separated source-type list (e.g. `wiki,tracker`).
fn parse_source_filter(s: &str) -> Result<Vec<SourceType>> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            SourceType::parse(t)
                .ok_or_else(|| anyhow::anyhow!("unknown source type: '{t}' (expected wiki, chat, tracker, or repo)"))
        })
        .collect()
}
