// src/pipeline/export.rs

//! Dataset export.
//!
//! Concatenates the detail snapshots of all regions into one [`Dataset`] and
//! replaces the export file atomically, so readers only ever see a complete
//! previous or a complete new dataset.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::cache::{CacheStore, MemoizingCache, Namespace};
use crate::error::Result;
use crate::models::{Dataset, ExportStamp, ListingRecord, Region};
use crate::utils::fs::save_json;

/// File written next to the dataset on every export.
pub const STAMP_FILE: &str = "last_update.json";

/// Collect every region's detail snapshot, in region order.
///
/// Regions that were never crawled contribute nothing.
pub async fn collect_records<S: CacheStore>(
    cache: &MemoizingCache<S>,
    regions: &[Region],
) -> Result<Vec<ListingRecord>> {
    let mut records = Vec::new();

    for region in regions {
        match cache
            .get::<Vec<ListingRecord>>(Namespace::RegionDetails, &region.id)
            .await?
        {
            Some(entry) => records.extend(entry.value),
            None => log::debug!("Region {} has no detail snapshot yet", region.id),
        }
    }

    Ok(records)
}

/// Location of the stamp file for an export path.
pub fn stamp_path(export_path: &Path) -> PathBuf {
    export_path.with_file_name(STAMP_FILE)
}

/// Write `dataset` to `export_path` and refresh the stamp beside it.
pub async fn write_dataset(export_path: &Path, dataset: &Dataset) -> Result<()> {
    save_json(export_path, dataset).await?;

    let stamp = ExportStamp {
        updated_at: Utc::now(),
        count: dataset.len(),
    };
    save_json(&stamp_path(export_path), &stamp).await?;

    log::info!(
        "Exported {} places to {}",
        dataset.len(),
        export_path.display()
    );
    Ok(())
}

/// Rebuild the export from the cache without touching the network.
pub async fn export_dataset<S: CacheStore>(
    cache: &MemoizingCache<S>,
    regions: &[Region],
    export_path: &Path,
) -> Result<Dataset> {
    let records = collect_records(cache, regions).await?;
    let dataset = Dataset::from_records(&records);
    write_dataset(export_path, &dataset).await?;
    Ok(dataset)
}
