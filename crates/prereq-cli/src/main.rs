//! prereq CLI: annotate, merge and generate math prerequisite labels.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "prereq",
    version,
    about = "Annotation toolkit for math question prerequisites"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Label the next unannotated questions interactively
    Annotate {
        /// Question dataset CSV (default: from config)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Directory holding annotation ledgers (default: from config)
        #[arg(long)]
        ledger_dir: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show every annotator's progress
    Status {
        /// Question dataset CSV (default: from config)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Directory holding annotation ledgers (default: from config)
        #[arg(long)]
        ledger_dir: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Merge all annotators' ledgers into one CSV
    Merge {
        /// Directory to search for annotations_*.csv (default: from config)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Merged output file (default: annotations-merged-<timestamp>.csv)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Ask an LLM for the prerequisites of each question in a file
    Generate {
        /// Questions as .jsonl or .csv with a `question` field
        #[arg(long)]
        input: PathBuf,

        /// Output CSV
        #[arg(long, default_value = "gsm8k_prerequisites.csv")]
        output: PathBuf,

        /// Number of questions to process (default: from config)
        #[arg(long)]
        limit: Option<usize>,

        /// Pause between API calls in milliseconds (default: from config)
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Provider name from config (default: default_provider)
        #[arg(long)]
        provider: Option<String>,

        /// Model id (default: default_model)
        #[arg(long)]
        model: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List available models
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create a starter prereq.toml
    Init,
}

#[tokio::main]
async fn main() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("prereq=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Annotate {
            data,
            ledger_dir,
            config,
        } => commands::annotate::execute(data, ledger_dir, config).await,
        Commands::Status {
            data,
            ledger_dir,
            config,
        } => commands::status::execute(data, ledger_dir, config),
        Commands::Merge {
            dir,
            output,
            config,
        } => commands::merge::execute(dir, output, config),
        Commands::Generate {
            input,
            output,
            limit,
            delay_ms,
            provider,
            model,
            config,
        } => {
            commands::generate::execute(input, output, limit, delay_ms, provider, model, config)
                .await
        }
        Commands::ListModels { provider, config } => {
            commands::list_models::execute(provider, config).await
        }
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
