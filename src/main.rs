//! Harrow main entry point
//!
//! This is the command-line interface for the Harrow listing crawler.

use clap::Parser;
use harrow::config::{load_config_with_hash, Config};
use harrow::crawler::crawl;
use harrow::output::print_report;
use harrow::target::{configured_regions, page_url, sub_area_cache_path};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Harrow: a resumable incremental listing crawler
///
/// Harrow walks regions, sub-areas and pages of a listing site, collects
/// records into a JSON snapshot and can be stopped and resumed at any page
/// without losing or duplicating records.
#[derive(Parser, Debug)]
#[command(name = "harrow")]
#[command(version = "1.0.0")]
#[command(about = "A resumable incremental listing crawler", long_about = None)]
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

    /// Start from the first region, ignoring the stored checkpoint
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "fresh")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
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

    if cli.fresh {
        tracing::info!("Starting fresh crawl (checkpoint ignored, snapshot kept)");
    }

    let report = match crawl(config, &config_hash, cli.fresh).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    print_report(&report);
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("harrow=info,warn"),
            1 => EnvFilter::new("harrow=debug,info"),
            2 => EnvFilter::new("harrow=trace,debug"),
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

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== Harrow Dry Run ===\n");

    let crawler = &config.crawler;
    println!("Crawler Configuration:");
    println!("  Pages per sub-area: {}", crawler.max_pages_per_sub_area);
    println!("  Empty-page threshold: {}", crawler.max_empty_pages);
    println!("  Start page: {}", crawler.start_page);
    println!("  Flush every: {} pages", crawler.save_every_pages);
    if let Some(limit) = crawler.max_sub_areas_per_region {
        println!("  Sub-areas per region: {}", limit);
    }
    match (crawler.min_date, crawler.max_date) {
        (None, None) => {}
        (min, max) => println!(
            "  Date window: {} .. {}",
            min.map(|d| d.to_string()).unwrap_or_default(),
            max.map(|d| d.to_string()).unwrap_or_default()
        ),
    }
    println!(
        "  Politeness delay: {:.1}-{:.1}s",
        crawler.delay_min_secs, crawler.delay_max_secs
    );

    println!("\nFetcher:");
    println!("  Attempts: {}", config.fetcher.max_attempts);
    println!("  User agents: {}", config.fetcher.user_agents.len());
    println!("  Proxies: {}", config.fetcher.proxies.len());

    println!("\nOutput:");
    println!("  Snapshot: {}", config.output.snapshot_path);
    println!("  Checkpoint: {}", config.output.checkpoint_path);
    println!("  Debug pages: {}", config.output.debug_dir);

    let regions = configured_regions(config);
    println!("\nRegions ({}):", regions.len());
    for region in &regions {
        if region.sub_areas.is_empty() {
            let cache = sub_area_cache_path(Path::new(&config.output.cache_dir), &region.code);
            let source = if cache.exists() {
                format!("cached in {}", cache.display())
            } else {
                "discovered on first run".to_string()
            };
            println!("  - {} ({}): sub-areas {}", region.name, region.code, source);
            continue;
        }

        println!(
            "  - {} ({}): {} sub-areas",
            region.name,
            region.code,
            region.sub_areas.len()
        );
        for sub_area in &region.sub_areas {
            println!(
                "    * {} -> {}",
                sub_area.name,
                page_url(&config.urls, &region.code, &sub_area.code, crawler.start_page)
            );
        }
    }

    if config.parser.is_none() {
        println!("\n! No [parser] section: crawling requires one");
    }

    println!("\n✓ Configuration is valid");
}
