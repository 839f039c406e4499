use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use review_agents::{
    AnthropicCompletions, AnthropicConfig, Orchestrator, PipelineSettings, ReviewConfig,
};
use review_coordination::Document;
use tracing::{info, warn};

/// Review a structured document with the multi-agent pipeline.
#[derive(Debug, Parser)]
#[command(name = "review-agents", version)]
struct Args {
    /// Structured document JSON.
    document: PathBuf,

    /// TOML pipeline settings.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Run the adversary as a three-seat panel.
    #[arg(long)]
    panel: bool,

    /// Skip the external-evidence pipeline.
    #[arg(long)]
    no_domain: bool,

    /// Guidance appended to every agent prompt.
    #[arg(long)]
    steering: Option<String>,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    // Logs go to stderr; stdout carries the event stream.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let raw = std::fs::read_to_string(&args.document)
        .with_context(|| format!("Failed to read {}", args.document.display()))?;
    let document = Document::from_json(&raw).context("Invalid document")?;

    let settings = match &args.settings {
        Some(path) => PipelineSettings::from_toml_file(path)?,
        None => PipelineSettings::default(),
    };
    let service = AnthropicCompletions::new(AnthropicConfig::from_env()?)?;

    let config = ReviewConfig {
        panel_mode: args.panel,
        enable_domain: !args.no_domain,
        steering_memo: args.steering,
    };

    let orchestrator = Orchestrator::new(Arc::new(service), settings);
    let mut run = orchestrator.start(Arc::new(document), config);
    info!(run_id = %run.run_id(), "Review started");

    let mut interrupted = false;
    loop {
        tokio::select! {
            event = run.next_event() => {
                let Some(event) = event else { break };
                println!("{}", serde_json::to_string(&event)?);
            }
            _ = tokio::signal::ctrl_c() => {
                interrupted = true;
                break;
            }
        }
    }
    if interrupted {
        warn!("Interrupted, cancelling review");
        run.cancel().await;
    }

    Ok(())
}
