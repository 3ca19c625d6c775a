//! Shortsnap main entry point
//!
//! Command-line interface for the short-video metadata harvester.

use clap::Parser;
use shortsnap::config::load_config_with_hash;
use shortsnap::crawler::{open_store, run_crawl, Shutdown};
use shortsnap::download::{run_download_queue, YtDlpFetcher};
use shortsnap::filter::BucketTargets;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Shortsnap: a resumable short-video metadata harvester
///
/// Discovers short-form videos by keyword search, screens them with
/// adaptive engagement thresholds, and persists enriched metadata into
/// resumable snapshot documents revisited on a schedule to measure
/// growth over time.
#[derive(Parser, Debug)]
#[command(name = "shortsnap")]
#[command(version = "1.0.0")]
#[command(about = "A resumable short-video metadata harvester", long_about = None)]
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

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["status", "download"])]
    dry_run: bool,

    /// Show harvest progress from the snapshot store and exit
    #[arg(long, conflicts_with_all = ["dry_run", "download"])]
    status: bool,

    /// Work the video download queue instead of crawling
    #[arg(long, conflicts_with_all = ["dry_run", "status"])]
    download: bool,

    /// Destination directory for downloaded renditions
    #[arg(long, value_name = "DIR", default_value = "./downloads")]
    download_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((config, hash)) => {
            tracing::info!("Configuration loaded (hash: {})", hash);
            (config, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    if cli.status {
        return handle_status(&config).await;
    }

    let shutdown = Shutdown::new();
    shutdown.listen_for_ctrl_c();

    if cli.download {
        return handle_download(&config, &cli.download_dir, shutdown).await;
    }

    match run_crawl(config, &config_hash, shutdown).await {
        Ok(()) => {
            tracing::info!("Crawl finished");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

/// Sets up the tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("shortsnap=info,warn"),
            1 => EnvFilter::new("shortsnap=debug,info"),
            2 => EnvFilter::new("shortsnap=trace,debug"),
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

/// Handles --dry-run: validates config and shows what would be crawled
fn handle_dry_run(config: &shortsnap::Config) {
    println!("=== Shortsnap Dry Run ===\n");

    println!("Crawler:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Search page size: {}", config.crawler.search_page_size);
    println!("  Query retries: {}", config.crawler.query_retries);
    println!("  Growth generations: {}", config.crawler.max_generations);
    println!(
        "  Revisit interval: {} days",
        config.crawler.revisit_interval_days
    );

    println!("\nFilter:");
    println!("  Rule: {:?}", config.filter.rule);
    println!("  Max duration: {}s", config.filter.max_duration_secs);
    println!(
        "  Recompute: every {} accepted (min {} samples)",
        config.filter.recompute_interval, config.filter.min_samples
    );

    println!("\nStorage:");
    println!("  Results: {}", config.storage.results_dir);
    match &config.storage.mirror_dir {
        Some(dir) => println!("  Mirror: {}", dir),
        None => println!("  Mirror: disabled"),
    }

    println!("\nCredentials: {} API keys", config.credentials.api_keys.len());

    println!("\nBucket targets (total {}):", config.category_target());
    for (bucket, target) in &config.buckets {
        println!("  {}: {}", bucket, target);
    }

    println!("\nCategories ({}):", config.categories.len());
    for category in &config.categories {
        println!(
            "  - {} ({} keywords)",
            category.name,
            category.keywords.len()
        );
    }

    println!("\n✓ Configuration is valid");
}

/// Handles --status: prints harvest progress from the store
async fn handle_status(config: &shortsnap::Config) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let targets = BucketTargets::new(config.buckets.clone());

    println!("Results: {}\n", config.storage.results_dir);

    let mut complete = 0;
    for category in &config.categories {
        match store.load_category(&category.name)? {
            Some(container) => {
                let records = container.total_records();
                if container.completed {
                    complete += 1;
                    println!("  {} - complete ({} records)", category.name, records);
                } else {
                    let missing: usize = store
                        .missing_work(&category.name, &targets)?
                        .values()
                        .sum();
                    println!(
                        "  {} - {} records, {} still missing",
                        category.name, records, missing
                    );
                }
            }
            None => println!("  {} - not started", category.name),
        }
    }
    println!(
        "\n{} of {} categories complete",
        complete,
        config.categories.len()
    );

    let sequence = store.load_sequence()?;
    println!(
        "Sequence: {} ids across {} discovery timestamps",
        sequence.total_ids(),
        sequence.0.len()
    );

    for generation in 1..=config.crawler.max_generations {
        match store.load_target_map(generation)? {
            Some(map) => {
                let ledger = store
                    .load_progress(shortsnap::store::SnapshotScope::Generation(generation))?;
                let done = map.keys().filter(|t| ledger.is_complete(t)).count();
                println!(
                    "Snapshot {}: {} of {} timestamps complete",
                    generation,
                    done,
                    map.len()
                );
            }
            None => println!("Snapshot {}: not started", generation),
        }
    }

    let downloads = store.load_download_ledger()?;
    println!("Downloads: {} confirmed artifacts", downloads.count);

    Ok(())
}

/// Handles --download: works the rendition download queue
async fn handle_download(
    config: &shortsnap::Config,
    dest_dir: &std::path::Path,
    shutdown: Shutdown,
) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let fetcher = YtDlpFetcher::new(&config.download);

    let downloaded =
        run_download_queue(config, &store, &fetcher, dest_dir, &shutdown).await?;
    println!("✓ Downloaded {} videos", downloaded);
    Ok(())
}
