//! Pipeline entry points.
//!
//! - `reconcile`: merge a fresh link set into a prior snapshot
//! - `update`: per-region staleness gate, walk and write-back
//! - `export`: consolidated dataset from all cached snapshots

pub mod export;
pub mod reconcile;
pub mod update;

pub use export::{STAMP_FILE, collect_records, export_dataset, stamp_path, write_dataset};
pub use reconcile::{LinkDiff, Reconciliation, ReconciliationEngine, diff_links};
pub use update::{
    REGION_LIST_KEY, RegionOrchestrator, RegionState, RegionStatus, RunMode, StalenessPolicy,
    UpdateSummary, region_statuses,
};
