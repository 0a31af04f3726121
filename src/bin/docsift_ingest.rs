use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use docsift::{
    config::{self, DEFAULT_MAX_IMAGE_DIMENSION},
    logging,
    processing::{IngestJob, ProcessingService, ValidatorRegistry},
};
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "docsift-ingest",
    about = "Validate or ingest a local document without the HTTP server"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sniff and validate a file, printing its document type.
    Validate {
        file: PathBuf,
        #[arg(long, default_value_t = DEFAULT_MAX_IMAGE_DIMENSION)]
        max_image_dimension: u32,
    },
    /// Run the full pipeline on a file using the environment configuration.
    Ingest {
        file: PathBuf,
        /// Session to store chunks under; a new one is generated when omitted.
        #[arg(long)]
        session_id: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Validate {
            file,
            max_image_dimension,
        } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let document_type = ValidatorRegistry::with_defaults(max_image_dimension)
                .validate_document(&bytes)?;
            println!("{document_type}");
        }
        Command::Ingest { file, session_id } => {
            config::init_config();
            logging::init_tracing();
            let config = config::get_config();

            let bytes = std::fs::read(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            if bytes.len() > config.max_document_size {
                bail!(
                    "{} is {} bytes; the limit is {} bytes",
                    file.display(),
                    bytes.len(),
                    config.max_document_size
                );
            }
            let document_type = ValidatorRegistry::with_defaults(config.max_image_dimension)
                .validate_document(&bytes)?;

            let service = ProcessingService::new()
                .await
                .context("failed to initialize chunk store")?;
            let outcome = service
                .process(IngestJob {
                    session_id: session_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                    path: file,
                    document_type,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }
    Ok(())
}
