//! kongfz-crawler main entry point
//!
//! This is the command-line interface for the kongfz catalog crawler.

use anyhow::Context;
use clap::Parser;
use kongfz_crawler::config::{load_config_with_hash, Config};
use kongfz_crawler::crawler::{Coordinator, RunOptions};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// kongfz-crawler: a polite catalog crawler
///
/// Walks the book catalog from its category menu through every category's
/// paginated listings, deduplicating visited pages and routing each item record to
/// the configured sinks (dedup, document store, CSV export).
#[derive(Parser, Debug)]
#[command(name = "kongfz-crawler")]
#[command(version)]
#[command(about = "A polite catalog crawler", long_about = None)]
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

    /// Forget dedup keys of previous runs before crawling
    #[arg(long)]
    fresh: bool,

    /// Override the maximum listing pages per category
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    max_pages: Option<u32>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config, cli.max_pages);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        let options = RunOptions {
            fresh: cli.fresh,
            max_pages: cli.max_pages,
            config_hash,
        };
        handle_crawl(config, options).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("kongfz_crawler=info,warn"),
            1 => EnvFilter::new("kongfz_crawler=debug,info"),
            2 => EnvFilter::new("kongfz_crawler=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, max_pages: Option<u32>) {
    println!("=== kongfz-crawler Dry Run ===\n");

    println!("Crawler Configuration:");
    println!(
        "  Max pages per category: {}",
        max_pages.unwrap_or(config.crawler.max_pages)
    );
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!("  Politeness delay: {}ms", config.crawler.politeness_delay);
    println!("  Fetch timeout: {}s", config.crawler.fetch_timeout);
    println!("  Follow details: {}", config.crawler.follow_details);

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!(
        "  Backoff: {}ms .. {}ms",
        config.retry.base_delay, config.retry.max_delay
    );

    println!("\nHTTP:");
    println!("  User agent: {}", config.http.user_agent);
    println!("  Listing API: {}", config.http.listing_api);

    println!("\nSession:");
    match &config.session.cookies_file {
        Some(path) => println!("  Cookie file: {}", path),
        None => println!("  Inline cookies: {}", config.session.cookies.len()),
    }

    println!("\nDedup:");
    if config.dedup.persistent {
        println!(
            "  Persistent, scope: {}",
            config.dedup.scope.as_deref().unwrap_or("(per run)")
        );
    } else {
        println!("  In memory, per run");
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Export dir: {}", config.output.export_dir);
    let sinks: Vec<String> = config
        .output
        .sinks
        .iter()
        .map(|kind| format!("{:?}", kind).to_lowercase())
        .collect();
    println!("  Sinks: {}", sinks.join(" -> "));

    println!("\nSeeds ({}):", config.crawler.seeds.len());
    for seed in &config.crawler.seeds {
        println!("  * {}", seed);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start crawling with {} seed URLs",
        config.crawler.seeds.len()
    );
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use kongfz_crawler::output::{load_statistics, print_statistics};
    use kongfz_crawler::storage::SqliteStorage;

    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("Failed to open database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
///
/// Ctrl-C stops the crawl gracefully; a second Ctrl-C is left to the default handler
/// once the first has been consumed.
async fn handle_crawl(config: Config, options: RunOptions) -> anyhow::Result<()> {
    use kongfz_crawler::output::print_run_summary;

    if options.fresh {
        tracing::info!("Starting fresh crawl (forgetting previous dedup keys)");
    }
    tracing::info!(
        "Seeds: {}, sinks: {}",
        config.crawler.seeds.len(),
        config.output.sinks.len()
    );

    let coordinator = Coordinator::new(config, options).context("Failed to initialize crawl")?;
    let stop = coordinator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping crawl");
            stop.stop();
        }
    });

    match coordinator.run().await {
        Ok(summary) => {
            print_run_summary(&summary);
            tracing::info!("Crawl finished");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
