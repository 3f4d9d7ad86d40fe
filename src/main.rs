//! Progwatch main entry point
//!
//! Command-line interface for the progwatch change-detection crawler.

use anyhow::Context;
use clap::{Parser, Subcommand};
use progwatch::config::load_config_with_hash;
use progwatch::crawl::{replay_dlq_by_id, run_due_sources, CrawlExecutor};
use progwatch::fetch::{FetchClient, HostRegistry};
use progwatch::pipeline::SignalParser;
use progwatch::storage::{JobStatus, SourceRecord, SqliteStorage, Storage};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Progwatch: a polite change-detection crawler
///
/// Progwatch fetches registered government and utility program pages on a
/// schedule, scores what changed since the last snapshot, and queues
/// failures for replay, while respecting robots.txt and per-host pacing.
#[derive(Parser, Debug)]
#[command(name = "progwatch")]
#[command(version = "0.6.0")]
#[command(about = "A polite change-detection crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG", default_value = "progwatch.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl every due source, or one specific source
    Crawl {
        /// Crawl only this source id, whether or not it is due
        #[arg(long)]
        source_id: Option<String>,
    },

    /// Register a new source
    AddSource {
        /// Page URL to watch
        url: String,

        /// Human-readable source name
        #[arg(long)]
        name: String,

        /// Crawl frequency in milliseconds
        #[arg(long, default_value_t = 86_400_000)]
        frequency_ms: i64,

        /// Canonical host override when it differs from the URL's host
        #[arg(long)]
        allowed_host: Option<String>,
    },

    /// Replay a dead-letter queue entry
    Replay {
        /// DLQ entry id to replay
        dlq_id: String,
    },

    /// Show job, snapshot, and DLQ counts
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded (hash: {})", config_hash);

    let storage = Arc::new(Mutex::new(SqliteStorage::new(Path::new(
        &config.storage.database_path,
    ))?));

    match cli.command {
        Command::Crawl { source_id } => {
            let fetcher = Arc::new(FetchClient::new(&config, HostRegistry::new())?);
            let executor = CrawlExecutor::new(
                storage,
                fetcher,
                Arc::new(SignalParser),
                config.crawler.max_fetch_attempts,
                Some(config_hash),
            );

            match source_id {
                Some(id) => {
                    let report = executor.execute(&id, None).await;
                    println!(
                        "{} (trace {}, job {})",
                        if report.success { "succeeded" } else { "failed" },
                        report.trace_id,
                        report.job_id.as_deref().unwrap_or("-"),
                    );
                }
                None => {
                    let reports = run_due_sources(&executor).await?;
                    let succeeded = reports.iter().filter(|r| r.success).count();
                    println!(
                        "{} sources crawled, {} succeeded, {} failed",
                        reports.len(),
                        succeeded,
                        reports.len() - succeeded
                    );
                }
            }
        }

        Command::AddSource {
            url,
            name,
            frequency_ms,
            allowed_host,
        } => {
            let mut storage = storage.lock().unwrap();
            if let Some(existing) = storage.find_source_by_url(&url)? {
                anyhow::bail!("source already registered with id {}", existing.id);
            }
            let source = SourceRecord::new(url, name, frequency_ms, allowed_host);
            storage.insert_source(&source)?;
            println!("registered source {}", source.id);
        }

        Command::Replay { dlq_id } => {
            let fetcher = Arc::new(FetchClient::new(&config, HostRegistry::new())?);
            let executor = CrawlExecutor::new(
                storage,
                fetcher,
                Arc::new(SignalParser),
                config.crawler.max_fetch_attempts,
                Some(config_hash),
            );

            let succeeded = replay_dlq_by_id(&executor, &dlq_id).await?;
            println!(
                "replay {}",
                if succeeded { "succeeded; entry resolved" } else { "failed; entry left unresolved" }
            );
        }

        Command::Stats => {
            let storage = storage.lock().unwrap();
            println!("Sources (active): {}", storage.list_active_sources()?.len());
            println!(
                "Jobs: {} running, {} succeeded, {} failed, {} policy-blocked",
                storage.count_jobs_by_status(JobStatus::Running)?,
                storage.count_jobs_by_status(JobStatus::Succeeded)?,
                storage.count_jobs_by_status(JobStatus::Failed)?,
                storage.count_jobs_by_status(JobStatus::PolicyBlocked)?,
            );
            println!("Unresolved DLQ entries: {}", storage.count_unresolved_dlq()?);
        }
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("progwatch=info,warn"),
            1 => EnvFilter::new("progwatch=debug,info"),
            2 => EnvFilter::new("progwatch=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}
