//! Ingestion worker binary.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tapestry_worker::Pipeline;

#[derive(Parser)]
#[command(name = "tapestry-worker", about = "Ingest short-form video posts into the vector index")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest the post payloads in a JSON file (an object or an array)
    Ingest {
        /// Path to the payload file
        file: PathBuf,
    },
    /// Summarize a stored video and write a screenplay for it
    Analyze {
        /// Post whose video is already in object storage
        post_id: String,
        /// Post caption
        #[arg(long)]
        description: Option<String>,
    },
    /// Recommend edits from a JSON file with `high_performing` and `low_performing`
    SuggestEdits {
        /// Path to the comparison file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();
    match cli.command {
        Command::Ingest { file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let body: Value = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", file.display()))?;

            let pipeline = Pipeline::from_env().await?;
            info!(file = %file.display(), "Starting ingestion");

            let documents = pipeline.ingest(body).await?;
            info!(count = documents.len(), "Ingestion finished");

            let output = serde_json::json!({
                "count": documents.len(),
                "documents": documents,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Analyze {
            post_id,
            description,
        } => {
            let pipeline = Pipeline::from_env().await?;
            info!(post_id = %post_id, "Starting video analysis");

            let analysis = pipeline
                .analyzer()
                .analyze_post(&post_id, description.as_deref())
                .await?;

            let output = serde_json::json!({
                "summary": analysis.summary,
                "screenplay": analysis.screenplay,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::SuggestEdits { file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let mut body: Value = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", file.display()))?;

            let high_performing = match body.get_mut("high_performing").map(Value::take) {
                Some(Value::Array(items)) => items,
                None | Some(Value::Null) => Vec::new(),
                Some(_) => anyhow::bail!("high_performing must be an array"),
            };
            let low_performing = body
                .get_mut("low_performing")
                .map(Value::take)
                .unwrap_or_default();
            if !low_performing.is_object() {
                anyhow::bail!("low_performing must be an object");
            }

            let pipeline = Pipeline::from_env().await?;
            let edits = pipeline
                .analyzer()
                .suggest_edits(high_performing, low_performing)
                .await?;
            println!("{}", edits);
        }
    }

    Ok(())
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("tapestry=info".parse()?)
        .add_directive("fantoccini=warn".parse()?)
        .add_directive("aws_config=warn".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}
