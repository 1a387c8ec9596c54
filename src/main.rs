//! Feed Recovery Binary
//!
//! Pulls the full record stream from a feed server, backfills gaps,
//! and writes the ordered dataset as JSON.
//!
//! Usage:
//!   feed-recovery --host 127.0.0.1 --port 3000 --output output.json
//!
//! Environment:
//!   FEED_CONFIG_PATH - TOML config file (optional)
//!   FEED_HOST - Feed server host (default: 127.0.0.1)
//!   FEED_PORT - Feed server port (default: 3000)
//!   FEED_OUTPUT - Output file (default: output.json)
//!   FEED_BACKFILL_DELAY_MS - Pause between re-send attempts (default: 100)
//!   FEED_READ_TIMEOUT_MS - Read timeout (default: none, reads block)
//!   RUST_LOG - Log filter (default: info)

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use feed_recovery::feed::{DuplicatePolicy, FeedClientConfig, FeedSession, SessionOutcome};
use feed_recovery::{JsonFileExporter, SessionReport};

#[derive(Parser, Debug)]
#[command(name = "feed-recovery")]
#[command(about = "Retrieve a gap-free, sequence-ordered dataset from a binary market data feed")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "FEED_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Feed server host
    #[arg(long, env = "FEED_HOST")]
    host: Option<String>,

    /// Feed server port
    #[arg(short, long, env = "FEED_PORT")]
    port: Option<u16>,

    /// Output JSON file
    #[arg(short, long, env = "FEED_OUTPUT")]
    output: Option<PathBuf>,

    /// Pause between backfill attempts in milliseconds
    #[arg(long, env = "FEED_BACKFILL_DELAY_MS")]
    backfill_delay_ms: Option<u64>,

    /// Read timeout in milliseconds (reads block indefinitely when unset)
    #[arg(long, env = "FEED_READ_TIMEOUT_MS")]
    read_timeout_ms: Option<u64>,

    /// Connect timeout in milliseconds
    #[arg(long, env = "FEED_CONNECT_TIMEOUT_MS")]
    connect_timeout_ms: Option<u64>,

    /// Discard records whose sequence number was already received
    #[arg(long)]
    drop_duplicates: bool,

    /// Also write the session report as JSON to this path
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn resolve_config(&self) -> Result<FeedClientConfig> {
        let mut config = match &self.config {
            Some(path) => FeedClientConfig::load(path)
                .with_context(|| format!("Failed to load config: {:?}", path))?,
            None => FeedClientConfig::default(),
        };

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(output) = &self.output {
            config.output_path = output.clone();
        }
        if let Some(ms) = self.backfill_delay_ms {
            config.backfill_delay_ms = ms;
        }
        if self.read_timeout_ms.is_some() {
            config.read_timeout_ms = self.read_timeout_ms;
        }
        if self.connect_timeout_ms.is_some() {
            config.connect_timeout_ms = self.connect_timeout_ms;
        }
        if self.drop_duplicates {
            config.duplicate_policy = DuplicatePolicy::Drop;
        }
        Ok(config)
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(args: Args) -> Result<bool> {
    let config = args.resolve_config()?;

    info!("Starting feed recovery");
    info!("  Endpoint: {}", config.endpoint());
    info!("  Output: {}", config.output_path.display());
    info!("  Backfill delay: {}ms", config.backfill_delay_ms);
    info!("  Duplicate policy: {:?}", config.duplicate_policy);

    let mut exporter = JsonFileExporter::new(config.output_path.clone());
    let mut session = FeedSession::new(config.connector())
        .with_recovery(config.gap_recovery())
        .with_duplicate_policy(config.duplicate_policy);

    let summary = match session.run(&mut exporter) {
        SessionOutcome::Done(summary) => summary,
        SessionOutcome::Aborted(e) => {
            error!("Session aborted: {}", e);
            return Ok(false);
        }
    };

    let report = SessionReport::from_summary(
        &summary,
        Some(config.output_path.display().to_string()),
    );
    println!("\n{}", report.executive_summary());

    if let Some(path) = &args.report_json {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report: {:?}", path))?;
        info!("Report written to {}", path.display());
    }

    Ok(summary.export_error.is_none())
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_logging(args.log_json);

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
