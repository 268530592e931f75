// src/pipeline/update.rs

//! Region orchestration.
//!
//! Every region is either FRESH (its link set was written within the staleness
//! window) or STALE. Stale regions are walked, reconciled against their cached
//! snapshot and written back; fresh ones cause no network traffic at all. The
//! export at the end always covers every region.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};

use crate::cache::{CacheStore, MemoizingCache, Namespace};
use crate::error::Result;
use crate::models::{Config, ListingRecord, ListingRef, Region};
use crate::services::{ListingExtractor, PageFetcher, PaginationWalker};

use super::export::export_dataset;
use super::reconcile::{Reconciliation, ReconciliationEngine};

/// Fixed cache key of the region list.
pub const REGION_LIST_KEY: &str = "regions";

/// How a run treats existing snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// First-time crawl: every region, empty priors.
    Init,
    /// Staleness-gated reconciliation; `force` crawls fresh regions too.
    Update { force: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    Fresh,
    Stale,
}

impl fmt::Display for RegionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fresh => write!(f, "FRESH"),
            Self::Stale => write!(f, "STALE"),
        }
    }
}

/// Classifies a region by the age of its link set.
#[derive(Debug, Clone, Copy)]
pub struct StalenessPolicy {
    window: Duration,
}

impl StalenessPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cache.staleness_window())
    }

    /// A region without a link set is always stale.
    pub fn state(&self, last_written: Option<DateTime<Utc>>, now: DateTime<Utc>) -> RegionState {
        match last_written {
            Some(written) if now - written < self.window => RegionState::Fresh,
            _ => RegionState::Stale,
        }
    }
}

/// Per-region status, as reported by `info`.
#[derive(Debug, Clone)]
pub struct RegionStatus {
    pub region: Region,
    pub last_written: Option<DateTime<Utc>>,
    pub state: RegionState,
}

/// Result of one orchestrated run.
#[derive(Debug, Clone, Default)]
pub struct UpdateSummary {
    pub regions_total: usize,
    pub refreshed: usize,
    pub skipped: usize,
    /// Ids of regions whose walk or cache access failed; their previous link set was kept
    pub failed: Vec<String>,
    pub added: usize,
    pub removed: usize,
    pub dropped: usize,
    pub exported: usize,
}

impl UpdateSummary {
    fn record(&mut self, result: &Reconciliation) {
        self.refreshed += 1;
        self.added += result.added.len();
        self.removed += result.removed.len();
        self.dropped += result.dropped.len();
    }

    pub fn log(&self) {
        log::info!(
            "Regions: {} total, {} refreshed, {} skipped, {} failed",
            self.regions_total,
            self.refreshed,
            self.skipped,
            self.failed.len()
        );
        log::info!(
            "Listings: +{} added, -{} removed, {} dropped",
            self.added,
            self.removed,
            self.dropped
        );
        if !self.failed.is_empty() {
            log::warn!("Failed regions: {}", self.failed.join(", "));
        }
        log::info!("Exported {} places", self.exported);
    }
}

enum RegionOutcome {
    Skipped,
    Failed,
    Refreshed(Reconciliation),
}

/// Drives walking, reconciliation and export across all regions.
///
/// Regions are processed one after the other since they share one
/// navigation session.
pub struct RegionOrchestrator<'a, F: ?Sized, E: ?Sized, S> {
    config: &'a Config,
    fetcher: &'a mut F,
    extractor: &'a E,
    cache: &'a MemoizingCache<S>,
    export_path: PathBuf,
    policy: StalenessPolicy,
}

impl<'a, F, E, S> RegionOrchestrator<'a, F, E, S>
where
    F: PageFetcher + ?Sized,
    E: ListingExtractor + ?Sized,
    S: CacheStore,
{
    pub fn new(
        config: &'a Config,
        fetcher: &'a mut F,
        extractor: &'a E,
        cache: &'a MemoizingCache<S>,
        export_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            fetcher,
            extractor,
            cache,
            export_path: export_path.into(),
            policy: StalenessPolicy::from_config(config),
        }
    }

    /// The region list, enumerated once and then served from the cache.
    pub async fn regions(&mut self) -> Result<Vec<Region>> {
        let fetcher = &mut *self.fetcher;
        self.cache
            .get_or_compute(Namespace::RegionList, REGION_LIST_KEY, move || async move {
                let regions = fetcher.regions().await?;
                log::info!("Enumerated {} regions", regions.len());
                Ok(regions)
            })
            .await
    }

    /// Run every region through `mode` and export the consolidated dataset.
    pub async fn run(&mut self, mode: RunMode) -> Result<UpdateSummary> {
        let regions = self.regions().await?;
        let mut summary = UpdateSummary {
            regions_total: regions.len(),
            ..Default::default()
        };

        for (index, region) in regions.iter().enumerate() {
            log::info!("[{}/{}] {}", index + 1, regions.len(), region);

            match self.refresh_region(region, mode, Utc::now()).await {
                Ok(RegionOutcome::Skipped) => summary.skipped += 1,
                Ok(RegionOutcome::Failed) => summary.failed.push(region.id.clone()),
                Ok(RegionOutcome::Refreshed(result)) => summary.record(&result),
                Err(e) => {
                    log::error!("Region {} failed: {}", region.id, e);
                    summary.failed.push(region.id.clone());
                }
            }
        }

        let dataset = export_dataset(self.cache, &regions, &self.export_path).await?;
        summary.exported = dataset.len();
        summary.log();

        Ok(summary)
    }

    async fn refresh_region(
        &mut self,
        region: &Region,
        mode: RunMode,
        now: DateTime<Utc>,
    ) -> Result<RegionOutcome> {
        let force = match mode {
            RunMode::Init => true,
            RunMode::Update { force } => force,
        };

        if !force {
            let last_written = self
                .cache
                .last_written_at(Namespace::RegionLinks, &region.id)
                .await?;
            if self.policy.state(last_written, now) == RegionState::Fresh {
                log::info!("Region {} is fresh; skipping", region.id);
                return Ok(RegionOutcome::Skipped);
            }
        }

        let walk = PaginationWalker::new(&mut *self.fetcher, self.config.crawler.request_delay())
            .walk(region)
            .await;
        let walk = match walk {
            Ok(walk) => walk,
            Err(e) => {
                log::error!("{}; keeping the previous snapshot", e);
                return Ok(RegionOutcome::Failed);
            }
        };

        let (prior_links, prior_records) = match mode {
            RunMode::Init => (Vec::new(), Vec::new()),
            RunMode::Update { .. } => self.prior_snapshot(region).await?,
        };

        let result = ReconciliationEngine::new(self.extractor)
            .with_concurrency(self.config.crawler.max_concurrent)
            .reconcile(&prior_links, &prior_records, &walk.links)
            .await;

        // The link set's write time marks the region fresh, so it goes last.
        self.cache
            .overwrite(Namespace::RegionDetails, &region.id, &result.records)
            .await?;
        self.cache
            .overwrite(Namespace::RegionLinks, &region.id, &result.links())
            .await?;

        log::info!(
            "Region {}: +{} / -{} listings, {} dropped, {} records",
            region.id,
            result.added.len(),
            result.removed.len(),
            result.dropped.len(),
            result.records.len()
        );

        Ok(RegionOutcome::Refreshed(result))
    }

    async fn prior_snapshot(&self, region: &Region) -> Result<(Vec<ListingRef>, Vec<ListingRecord>)> {
        let links = self
            .cache
            .get::<Vec<ListingRef>>(Namespace::RegionLinks, &region.id)
            .await?
            .map(|entry| entry.value)
            .unwrap_or_default();
        let records = self
            .cache
            .get::<Vec<ListingRecord>>(Namespace::RegionDetails, &region.id)
            .await?
            .map(|entry| entry.value)
            .unwrap_or_default();

        Ok((links, records))
    }
}

/// Snapshot age and state of every region, without touching the network.
pub async fn region_statuses<S: CacheStore>(
    cache: &MemoizingCache<S>,
    regions: &[Region],
    policy: StalenessPolicy,
    now: DateTime<Utc>,
) -> Result<Vec<RegionStatus>> {
    let mut statuses = Vec::with_capacity(regions.len());

    for region in regions {
        let last_written = cache
            .last_written_at(Namespace::RegionLinks, &region.id)
            .await?;
        statuses.push(RegionStatus {
            region: region.clone(),
            last_written,
            state: policy.state(last_written, now),
        });
    }

    Ok(statuses)
}
