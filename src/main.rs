mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use mnemo::config::MnemoConfig;
use mnemo::memory::manage::CleanupCriteria;

#[derive(Parser)]
#[command(name = "mnemo", version, about = "Semantic memory retrieval with cross-encoder reranking")]
struct Cli {
    /// Config file (default: ~/.mnemo/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search memories: vector recall, quality filter, rerank
    Search {
        query: String,
        /// Candidates pulled from the vector index
        #[arg(long)]
        initial_k: Option<usize>,
        /// Results returned after reranking
        #[arg(long)]
        final_k: Option<usize>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Chunk, embed, and store a file (text, json, jsonl, csv, chat export)
    Ingest {
        file: PathBuf,
        /// Override format detection
        #[arg(long)]
        format: Option<String>,
        /// Characters per plain-text chunk
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Discard existing memories instead of merging
        #[arg(long)]
        replace: bool,
        /// Drop exact-duplicate content
        #[arg(long)]
        dedup: bool,
        /// Keep plain-text chunks shorter than the minimum length
        #[arg(long)]
        keep_short: bool,
        /// Source for chunks that don't carry their own
        #[arg(long)]
        source: Option<String>,
        /// Tag added to every chunk (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Show store statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Check configuration, model files, and store health
    Doctor,
    /// Show a single memory by mem-{i} or uid
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Delete memories by mem-{i} or uid
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Replace a memory's content and re-embed it
    Edit { id: String, content: String },
    /// Find low-value memories; delete them with --apply
    Cleanup {
        #[arg(long)]
        min_importance: Option<f64>,
        #[arg(long)]
        min_length: Option<usize>,
        /// Remove memories from this source (repeatable)
        #[arg(long = "source")]
        sources: Vec<String>,
        /// Remove exact-duplicate content, keeping the first
        #[arg(long)]
        duplicates: bool,
        /// Actually delete (default is a dry run)
        #[arg(long)]
        apply: bool,
    },
    /// Back up the store files
    Backup,
    /// Re-embed every memory with the current backend
    Rebuild,
    /// Manage the local models
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model and cross-encoder to ~/.mnemo/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MnemoConfig::load_from(path)?,
        None => MnemoConfig::load()?,
    };

    // Log to stderr so stdout stays clean for --json output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Search {
            query,
            initial_k,
            final_k,
            json,
        } => cli::search::search(&config, &query, initial_k, final_k, json).await?,
        Command::Ingest {
            file,
            format,
            chunk_size,
            replace,
            dedup,
            keep_short,
            source,
            tags,
        } => {
            let args = cli::ingest::IngestArgs {
                format,
                chunk_size,
                replace,
                dedup,
                keep_short,
                source,
                tags,
            };
            cli::ingest::ingest(&config, &file, args).await?
        }
        Command::Stats { json } => cli::stats::stats(&config, json)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
        Command::Show { id, json } => cli::show::show(&config, &id, json)?,
        Command::Delete { ids } => cli::delete::delete(&config, &ids)?,
        Command::Edit { id, content } => cli::edit::edit(&config, &id, &content).await?,
        Command::Cleanup {
            min_importance,
            min_length,
            sources,
            duplicates,
            apply,
        } => {
            let criteria = CleanupCriteria {
                min_importance,
                min_length,
                sources,
                remove_duplicates: duplicates,
                dry_run: !apply,
            };
            cli::cleanup::cleanup(&config, criteria)?
        }
        Command::Backup => cli::backup::backup(&config)?,
        Command::Rebuild => cli::rebuild::rebuild(&config).await?,
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding, &config.rerank).await?
            }
        },
    }

    Ok(())
}
