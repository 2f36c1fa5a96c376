//! Phil Ingestion Job
//!
//! Loads the Stoic corpus into the vector index:
//! 1. Reads the philosopher text files from the data directory
//! 2. Chunks each document on sentence boundaries
//! 3. Embeds every chunk and upserts it under `{document}-{index}`
//! 4. Logs a summary with the index's vector count

mod chunker;
mod corpus;
mod errors;
mod processor;

use clap::Parser;
use errors::IngestionError;
use phil_common::config::AppConfig;
use phil_common::embeddings::create_embedder;
use phil_common::index::create_index;
use phil_common::VERSION;
use processor::IngestionProcessor;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Embed the philosophy corpus into the vector index
#[derive(Parser, Debug)]
#[command(name = "phil-ingest", version)]
struct Cli {
    /// Chunk and report without calling the embedding or index services
    #[arg(long)]
    dry_run: bool,

    /// Directory holding the corpus text files (overrides configuration)
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config);
    info!("Starting Phil ingestion v{}", VERSION);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Ingestion failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli, config: AppConfig) -> Result<(), IngestionError> {
    let data_dir = cli
        .data_dir
        .unwrap_or_else(|| PathBuf::from(&config.ingestion.data_dir));

    let documents = corpus::load_corpus(&data_dir).await?;
    info!(
        data_dir = %data_dir.display(),
        documents = documents.len(),
        chunk_size = config.ingestion.chunk_size,
        embed_delay = ?config.ingestion.embed_delay(),
        "Corpus loaded"
    );

    if cli.dry_run {
        let report = processor::plan(&documents, config.ingestion.chunk_size);
        info!(total_chunks = report.total_chunks(), "Dry run complete, nothing uploaded");
        return Ok(());
    }

    let embedder = create_embedder(&config.embedding)
        .map_err(|e| IngestionError::ConfigError(e.to_string()))?;
    let index = create_index(&config.index).map_err(|e| IngestionError::ConfigError(e.to_string()))?;
    info!(
        model = embedder.model_name(),
        index = index.name(),
        "Clients initialized"
    );

    let processor = IngestionProcessor::new(embedder, index.clone(), &config.ingestion);
    let report = processor.run(&documents).await?;

    for doc in &report.documents {
        info!(document = %doc.key, chunks = doc.chunks, "Document summary");
    }
    info!(total_chunks = report.total_chunks(), "All documents uploaded");

    match index.stats().await {
        Ok(stats) => info!(
            total_vectors = stats.total_vector_count,
            dimension = ?stats.dimension,
            "Index stats"
        ),
        Err(e) => warn!(error = %e, "Could not read index stats"),
    }

    Ok(())
}
