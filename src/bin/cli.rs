//! wgcrawler CLI
//!
//! Local execution entry point.

use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Parser, Subcommand};
use wgcrawler::{
    cache::{LocalCacheStore, MemoizingCache, Namespace},
    error::{AppError, Result},
    models::{Config, ExportStamp, Region},
    pipeline::{self, REGION_LIST_KEY, RegionOrchestrator, RunMode, StalenessPolicy},
    services::{ArcGisGeocoder, HttpListingExtractor, HttpPageFetcher},
    utils::fs::read_optional,
};

/// wgcrawler - shared-flat listing crawler
#[derive(Parser, Debug)]
#[command(
    name = "wgcrawler",
    version,
    about = "Crawls room listings per region into a geocoded dataset"
)]
struct Cli {
    /// Path to storage directory holding config.toml, the cache and the export
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl every region from scratch
    Init,

    /// Re-crawl stale regions and reconcile them with their snapshot
    Update {
        /// Crawl regions even if they are still fresh
        #[arg(long)]
        force: bool,
    },

    /// Rebuild the dataset from the cache without crawling
    Export,

    /// Show region snapshot ages and the last export
    Info,

    /// Validate configuration
    Validate,

    /// Forget the cached region list so the next run enumerates it again
    ResetRegions,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Regions as last enumerated by a crawl.
async fn cached_regions(cache: &MemoizingCache<LocalCacheStore>) -> Result<Vec<Region>> {
    cache
        .get::<Vec<Region>>(Namespace::RegionList, REGION_LIST_KEY)
        .await?
        .map(|entry| entry.value)
        .ok_or_else(|| AppError::config("No cached region list. Run 'init' first."))
}

async fn crawl(
    config: &Config,
    cache: &MemoizingCache<LocalCacheStore>,
    export_path: &Path,
    mode: RunMode,
) -> Result<()> {
    config.validate()?;

    let mut fetcher = HttpPageFetcher::new(config)?;
    let extractor = HttpListingExtractor::new(config, ArcGisGeocoder::new(config)?)?;

    let summary = RegionOrchestrator::new(config, &mut fetcher, &extractor, cache, export_path)
        .run(mode)
        .await?;

    if !summary.failed.is_empty() {
        log::warn!(
            "{} of {} regions kept their previous snapshot",
            summary.failed.len(),
            summary.regions_total
        );
    }
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("wgcrawler starting...");

    let config_path = cli.storage_dir.join("config.toml");
    let config = Config::load_or_default(&config_path);

    log::info!("Loaded configuration from {}", cli.storage_dir.display());

    let cache = MemoizingCache::new(LocalCacheStore::new(config.cache_dir(&cli.storage_dir)));
    let export_path = config.export_path(&cli.storage_dir);

    match cli.command {
        Command::Init => crawl(&config, &cache, &export_path, RunMode::Init).await?,

        Command::Update { force } => {
            crawl(&config, &cache, &export_path, RunMode::Update { force }).await?
        }

        Command::Export => {
            let regions = cached_regions(&cache).await?;
            pipeline::export_dataset(&cache, &regions, &export_path).await?;
        }

        Command::Info => {
            log::info!("Storage directory: {}", cli.storage_dir.display());

            match read_optional(&pipeline::stamp_path(&export_path)).await? {
                Some(bytes) => {
                    let stamp: ExportStamp = serde_json::from_slice(&bytes)?;
                    log::info!(
                        "Last export: {} places at {}",
                        stamp.count,
                        stamp.updated_at
                    );
                }
                None => log::info!("No export found yet."),
            }

            let Ok(regions) = cached_regions(&cache).await else {
                log::info!("No regions enumerated yet.");
                return Ok(());
            };

            let now = Utc::now();
            let statuses = pipeline::region_statuses(
                &cache,
                &regions,
                StalenessPolicy::from_config(&config),
                now,
            )
            .await?;

            log::info!("{} regions:", statuses.len());
            for status in statuses {
                match status.last_written {
                    Some(written) => log::info!(
                        "  {} [{}] crawled {} min ago",
                        status.region,
                        status.state,
                        (now - written).num_minutes()
                    ),
                    None => log::info!("  {} [{}] never crawled", status.region, status.state),
                }
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }

            log::info!("All validations passed!");
        }

        Command::ResetRegions => {
            cache
                .invalidate(Namespace::RegionList, REGION_LIST_KEY)
                .await?;
            log::info!("Region list cleared; it will be enumerated on the next crawl.");
        }
    }

    log::info!("Done!");

    Ok(())
}
