//! forum-harvest main entry point
//!
//! This is the command-line interface for the forum harvester.

use anyhow::Context;
use clap::Parser;
use forum_harvest::config::{load_config_with_hash, Config};
use forum_harvest::crawler::{default_worker_count, ForumHarvester};
use forum_harvest::output::{format_batch_failure, format_summary};
use forum_harvest::HarvestError;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// forum-harvest: authenticated concurrent forum fetcher
///
/// Logs into a cookie-session forum, fetches an index page, and fetches
/// every topic it links to through a bounded worker pool.
#[derive(Parser, Debug)]
#[command(name = "forum-harvest")]
#[command(version)]
#[command(about = "Authenticated concurrent forum fetcher", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be fetched without logging in
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else {
        handle_harvest(&config).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("forum_harvest=info,warn"),
            1 => EnvFilter::new("forum_harvest=debug,info"),
            2 => EnvFilter::new("forum_harvest=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be fetched
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== forum-harvest Dry Run ===\n");

    println!("Site:");
    println!("  Login: {}", config.site.login_url()?);
    println!("  Index: {}", config.site.index_url()?);
    println!("  Topic marker: {}", config.site.topic_marker);
    println!("  Expected cookies: {}", config.site.expected_cookies);

    println!("\nCredentials:");
    println!("  Username: {}", config.credentials.username);

    println!("\nHTTP:");
    println!("  User agent: {}", config.http.user_agent);
    println!(
        "  Timeouts: {}s total, {}s connect",
        config.http.timeout_secs, config.http.connect_timeout_secs
    );
    println!("  Max redirects: {}", config.http.max_redirects);
    println!("  HTTPS only: {}", config.http.https_only);

    println!("\nFetch:");
    let workers = if config.fetch.workers == 0 {
        format!("{} (automatic)", default_worker_count())
    } else {
        config.fetch.workers.to_string()
    };
    println!("  Workers: {}", workers);
    println!("  Cancel grace: {}ms", config.fetch.cancel_grace_ms);

    println!("\nOutput:");
    match &config.output.directory {
        Some(directory) => println!("  Directory: {}", directory),
        None => println!("  Directory: (pages are not saved)"),
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: &Config) -> anyhow::Result<()> {
    let harvester = ForumHarvester::new(config).context("failed to set up harvester")?;

    let cancel = harvester.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling outstanding fetches");
            cancel.cancel();
        }
    });

    match harvester.run().await {
        Ok(report) => {
            tracing::info!("Harvest completed successfully");
            print!("{}", format_summary(&report));
            Ok(())
        }
        Err(HarvestError::Batch(failure)) => {
            eprint!("{}", format_batch_failure(&failure));
            Err(HarvestError::Batch(failure).into())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}
