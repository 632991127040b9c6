mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use docseek_index::corpus::Corpus;
use docseek_index::embedder::Embedder;
use docseek_index::history::QueryHistory;
use docseek_index::manager::{IndexManager, IndexReport, OpenOutcome};
use docseek_index::persist::IndexStorage;
use docseek_index::query::QueryEngine;
use docseek_llm::any::AnyProvider;
use docseek_llm::hash::HashEmbedder;
use docseek_llm::ollama::OllamaProvider;

use crate::config::{Config, EmbeddingBackend, ProviderKind, resolve_config_path};

#[derive(Debug, Parser)]
#[command(name = "docseek", version, about = "Ask questions about your local documents")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load the persisted index or build it from the corpus.
    Index {
        /// Rebuild even when a valid persisted index exists.
        #[arg(long)]
        rebuild: bool,
    },
    /// Copy files into the corpus and rebuild the index.
    Add {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Answer a question from the indexed documents.
    Ask {
        question: String,
        /// Number of passages to retrieve.
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Print previous questions and answers.
    History,
    /// Delete all documents, the index and the question history.
    Clear {
        #[arg(long)]
        keep_history: bool,
    },
    /// Show corpus and index information.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.clone());
    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    config.validate()?;
    tracing::debug!(path = %config_path.display(), "config loaded");

    run(cli.command, &config).await
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

async fn run(command: Command, config: &Config) -> anyhow::Result<()> {
    match command {
        Command::Index { rebuild } => {
            let manager = open_manager(config).await?;
            if rebuild {
                let report = manager.rebuild().await?;
                print_report(&report);
            } else {
                print_outcome(&manager.open().await?);
            }
        }
        Command::Add { files } => {
            // add_documents rebuilds from the whole corpus.
            let manager = open_manager(config).await?;
            let (ids, report) = manager.add_documents(&files).await?;
            for id in &ids {
                println!("added {} as {id}", id.display_name());
            }
            print_report(&report);
        }
        Command::Ask { question, top_k } => {
            let manager = Arc::new(open_manager(config).await?);
            manager.open().await?;
            let llm = Arc::new(create_chat_provider(config));
            let engine = QueryEngine::new(manager, llm, config.query_config());

            let answer = engine.answer(&question, top_k).await?;
            println!("{}", answer.text);
            if !answer.sources.is_empty() {
                println!("\nSources:");
                for source in answer.source_previews(config.retrieval.preview_chars) {
                    println!("\n[{}] (score {:.3})", source.file_name, source.score);
                    println!("{}", source.preview);
                }
            }
        }
        Command::History => {
            let history = QueryHistory::new(&config.storage.history_file);
            print!("{}", history.render().await?);
        }
        Command::Clear { keep_history } => {
            clear_storage(config, !keep_history).await?;
            if keep_history {
                println!("Documents and index cleared.");
            } else {
                println!("Documents, index and question history cleared.");
            }
        }
        Command::Status => print_status(config).await?,
    }
    Ok(())
}

fn create_embedding_provider(config: &Config) -> AnyProvider {
    match config.llm.embedding_backend {
        EmbeddingBackend::Ollama => AnyProvider::Ollama(OllamaProvider::new(
            &config.llm.base_url,
            config.llm.model.clone(),
            config.llm.embedding_model.clone(),
        )),
        EmbeddingBackend::Hash => {
            AnyProvider::Hash(HashEmbedder::new(config.llm.embedding_dimensions))
        }
    }
}

fn create_chat_provider(config: &Config) -> AnyProvider {
    match config.llm.provider {
        ProviderKind::Ollama => AnyProvider::Ollama(OllamaProvider::new(
            &config.llm.base_url,
            config.llm.model.clone(),
            config.llm.embedding_model.clone(),
        )),
        #[cfg(feature = "mock")]
        ProviderKind::Mock => AnyProvider::Mock(docseek_llm::mock::MockProvider::default()),
    }
}

async fn open_manager(config: &Config) -> anyhow::Result<IndexManager> {
    let provider = Arc::new(create_embedding_provider(config));
    let embedder = Embedder::new(provider).await.with_context(|| {
        format!(
            "embedding backend {} ({}) unavailable",
            config.llm.embedding_backend, config.llm.embedding_model
        )
    })?;
    let manager = IndexManager::new(
        config.index_paths(),
        embedder,
        config.splitter_config(),
        config.index.max_file_size,
    )
    .await?;
    Ok(manager)
}

/// Delete corpus files, the persisted index and optionally the history log.
///
/// Works on the paths alone, so it succeeds while the embedding backend is down.
async fn clear_storage(config: &Config, include_history: bool) -> anyhow::Result<()> {
    let corpus = Corpus::open(&config.storage.corpus_dir).await?;
    let removed = corpus.clear().await?;
    IndexStorage::new(&config.storage.index_dir).remove().await?;
    if include_history {
        QueryHistory::new(&config.storage.history_file).clear().await?;
    }
    tracing::info!(removed, include_history, "storage cleared");
    Ok(())
}

fn print_outcome(outcome: &OpenOutcome) {
    match outcome {
        OpenOutcome::Loaded { chunks } => {
            println!("Loaded persisted index with {chunks} chunks.");
        }
        OpenOutcome::Built(report) => print_report(report),
        OpenOutcome::Rebuilt { reason, report } => {
            println!("Persisted index was out of date ({reason}); rebuilt from corpus.");
            print_report(report);
        }
    }
}

fn print_report(report: &IndexReport) {
    println!(
        "Indexed {} of {} files into {} chunks in {} ms.",
        report.documents_indexed, report.files_scanned, report.chunks_created, report.duration_ms
    );
    for warning in &report.warnings {
        println!("  skipped {warning}");
    }
}

async fn print_status(config: &Config) -> anyhow::Result<()> {
    let corpus = Corpus::open(&config.storage.corpus_dir).await?;
    let documents = corpus.list().await?;
    println!(
        "Corpus: {} ({} documents)",
        corpus.dir().display(),
        documents.len()
    );
    for id in &documents {
        println!("  {}", id.display_name());
    }

    let storage = IndexStorage::new(&config.storage.index_dir);
    if storage.exists().await {
        let meta = storage.meta().await?;
        println!(
            "Index: {} chunks, model {} ({} dims), built {}",
            meta.chunk_count,
            meta.embedding_model,
            meta.dimension,
            meta.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    } else {
        println!("Index: not built");
    }

    println!(
        "Embeddings: {} ({})",
        config.llm.embedding_backend, config.llm.embedding_model
    );
    println!("Chat model: {} via {}", config.llm.model, config.llm.provider);
    if config.llm.provider == ProviderKind::Ollama {
        let ollama = OllamaProvider::new(
            &config.llm.base_url,
            config.llm.model.clone(),
            config.llm.embedding_model.clone(),
        );
        match ollama.health_check().await {
            Ok(()) => println!("Ollama: reachable at {}", config.llm.base_url),
            Err(e) => println!("Ollama: unreachable at {} ({e})", config.llm.base_url),
        }
    }
    Ok(())
}
