//! Scrape-Pool main entry point
//!
//! This is the command-line interface for the Scrape-Pool crawler.

use anyhow::Context;
use clap::Parser;
use scrape_pool::config::{load_config_with_hash, Config};
use scrape_pool::crawler::{load_snapshot, save_snapshot, Crawler, CrawlerFactory};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const PROGRESS_EVERY_POLLS: u32 = 10;

/// Scrape-Pool: a concurrent, resumable web scraper
///
/// Scrape-Pool crawls outward from a seed URL with a pool of worker threads,
/// collecting the configured content types until every type reaches its limit
/// or no unvisited links remain.
#[derive(Parser, Debug)]
#[command(name = "scrape-pool")]
#[command(version)]
#[command(about = "A concurrent, resumable web scraper", long_about = None)]
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

    /// Start from this URL instead of the configured seed
    #[arg(long, value_name = "URL", conflicts_with = "resume")]
    seed: Option<String>,

    /// Resume the crawl saved in a snapshot file
    #[arg(long, value_name = "SNAPSHOT")]
    resume: Option<PathBuf>,

    /// Where to save a snapshot when the time limit expires
    #[arg(long, value_name = "PATH", requires = "time_limit")]
    snapshot: Option<PathBuf>,

    /// Stop (or snapshot) the crawl after this many seconds
    #[arg(long, value_name = "SECS")]
    time_limit: Option<u64>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    // DEBUG_MODE implies at least debug output
    let verbose = if config.options.debug_mode {
        cli.verbose.max(1)
    } else {
        cli.verbose
    };
    setup_logging(verbose, cli.quiet);
    tracing::info!(
        "Configuration loaded from {} (hash: {})",
        cli.config.display(),
        config_hash
    );

    if cli.dry_run {
        handle_dry_run(&config, cli.seed.as_deref());
        return Ok(());
    }

    handle_crawl(&cli, &config, config_hash)
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("scrape_pool=info,warn"),
            1 => EnvFilter::new("scrape_pool=debug,info"),
            2 => EnvFilter::new("scrape_pool=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the validated configuration
fn handle_dry_run(config: &Config, seed: Option<&str>) {
    println!("=== Scrape-Pool Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Seed: {}", seed.unwrap_or(&config.crawler.seed));
    println!("  Threads: {}", config.crawler.threads);
    println!("  Data limit per content type: {}", config.crawler.data_limit);
    println!("  Link cache limit: {}", config.crawler.link_cache_limit);
    println!("  Data cache limit: {}", config.crawler.data_cache_limit);
    println!(
        "  Rate limit back-off: {}s",
        config.crawler.rate_limit_backoff_secs
    );
    println!("  Request timeout: {}s", config.crawler.request_timeout_secs);
    println!("  User agent: {}", config.crawler.user_agent);

    println!(
        "\nOptions: {}",
        scrape_pool::Options::from(&config.options)
    );
    if let Some(language) = &config.options.language {
        println!("  Language: {}", language);
    }

    println!("\nOutput:");
    println!("  Backend: {:?}", config.output.backend);
    if let Some(directory) = &config.output.directory {
        println!("  Directory: {}", directory);
    }
    if let Some(path) = &config.output.database_path {
        println!("  Database: {}", path);
    }

    println!("\nContent Types ({}):", config.content.len());
    for entry in &config.content {
        match (&entry.pattern, &entry.selector) {
            (Some(pattern), _) => println!("  - {} (pattern {})", entry.name, pattern),
            (_, Some(selector)) => println!(
                "  - {} (selector {}{})",
                entry.name,
                selector,
                entry
                    .attribute
                    .as_ref()
                    .map(|a| format!(" @{}", a))
                    .unwrap_or_default()
            ),
            _ => println!("  - {}", entry.name),
        }
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main crawl operation
fn handle_crawl(cli: &Cli, config: &Config, config_hash: String) -> anyhow::Result<()> {
    let factory = CrawlerFactory::from_config(config)
        .context("Failed to set up the crawler")?
        .with_config_hash(config_hash);

    let crawler = match &cli.resume {
        Some(path) => resume(&factory, path)?,
        None => {
            let seed = cli.seed.as_deref().unwrap_or(&config.crawler.seed);
            let crawler = factory.create(seed);
            crawler
                .try_start()
                .with_context(|| format!("unable to start {}", crawler))?;
            crawler
        }
    };

    let outcome = supervise(&crawler, cli);
    crawler.close();
    tracing::info!("{}", crawler.get_collected_info());
    outcome
}

fn resume(factory: &CrawlerFactory, path: &Path) -> anyhow::Result<Crawler> {
    let snapshot = load_snapshot(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let crawler = factory
        .restore(snapshot)
        .with_context(|| format!("Failed to resume from {}", path.display()))?;
    Ok(crawler)
}

/// Waits for the crawl to finish or for the time limit to expire
fn supervise(crawler: &Crawler, cli: &Cli) -> anyhow::Result<()> {
    let deadline = cli
        .time_limit
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut polls = 0u32;

    while crawler.is_running() {
        thread::sleep(POLL_INTERVAL);
        polls += 1;
        if polls % PROGRESS_EVERY_POLLS == 0 {
            tracing::info!("{}", crawler.get_collected_info());
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            tracing::info!("Time limit reached for {}", crawler);
            match &cli.snapshot {
                Some(path) => {
                    let snapshot = crawler.snapshot();
                    save_snapshot(&snapshot, path)
                        .with_context(|| format!("Failed to save snapshot {}", path.display()))?;
                }
                None => crawler.stop(),
            }
            break;
        }
    }
    Ok(())
}
