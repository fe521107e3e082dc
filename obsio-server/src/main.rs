mod config;
mod ingest;

use clap::{Parser, Subcommand};
use config::Config;
use obsio_core::{open_blob_store, TransitionStore};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "obsio")]
#[command(about = "Asynchronous observation upload pipeline for interactive sessions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration and backend connectivity, then exit
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Replay a JSONL session capture through the upload pipeline
    Ingest {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: String,

        /// Path to the JSONL capture file
        #[arg(short, long)]
        file: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "obsio=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => {
            let cfg = load_config(&config);

            if let Err(error) = open_blob_store(&cfg.storage).await {
                tracing::error!("Blob store initialization failed: {}", error);
                std::process::exit(1);
            }

            if let Err(error) = TransitionStore::new(cfg.database.path.clone()) {
                tracing::error!("Database initialization failed: {}", error);
                std::process::exit(1);
            }

            tracing::info!("Configuration, blob store, and database are all usable");
        }
        Commands::Ingest { config, file } => {
            let cfg = load_config(&config);

            tracing::info!("Ingesting capture {} ", file);
            if let Err(error) = ingest::run_ingest(cfg, &file).await {
                tracing::error!("Ingest failed: {}", error);
                std::process::exit(1);
            }
        }
    }
}

fn load_config(path: &str) -> Config {
    match Config::from_file(path) {
        Ok(config) => config,
        Err(error) => {
            tracing::error!("Failed to load config: {}", error);
            std::process::exit(1);
        }
    }
}
