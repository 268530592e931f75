//! Snapshot reconciliation.
//!
//! Compares the link set of the last good crawl with a freshly walked one and
//! merges detail records accordingly:
//!
//! - added   = fresh − prior (these are extracted)
//! - removed = prior − fresh (their records are dropped)
//! - records of links present in both are carried over untouched
//!
//! A listed link whose prior record is missing, e.g. after a corrupted cache
//! entry, is extracted again as well.
//!
//! Detail extraction, and the geocoding it implies, is therefore paid once per
//! distinct listing URL no matter how often a region is re-crawled.

use std::collections::HashSet;

use futures::stream::{self, StreamExt};

use crate::models::{ListingRecord, ListingRef};
use crate::services::ListingExtractor;

/// Added and removed links between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkDiff {
    /// In fresh but not in prior, in fresh order
    pub added: Vec<ListingRef>,
    /// In prior but not in fresh, in prior order
    pub removed: Vec<ListingRef>,
}

/// Compute the set difference of two link lists by exact URL.
pub fn diff_links(prior: &[ListingRef], fresh: &[ListingRef]) -> LinkDiff {
    let prior_set: HashSet<&str> = prior.iter().map(String::as_str).collect();
    let fresh_set: HashSet<&str> = fresh.iter().map(String::as_str).collect();

    let mut seen = HashSet::new();
    let added = fresh
        .iter()
        .filter(|url| !prior_set.contains(url.as_str()) && seen.insert(url.as_str()))
        .cloned()
        .collect();

    let mut seen = HashSet::new();
    let removed = prior
        .iter()
        .filter(|url| !fresh_set.contains(url.as_str()) && seen.insert(url.as_str()))
        .cloned()
        .collect();

    LinkDiff { added, removed }
}

/// Outcome of reconciling one region.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Carried-over records followed by newly extracted ones
    pub records: Vec<ListingRecord>,
    pub added: Vec<ListingRef>,
    pub removed: Vec<ListingRef>,
    /// Links whose extraction failed in this run
    pub dropped: Vec<ListingRef>,
}

impl Reconciliation {
    /// Link set to persist: exactly the URLs that have a record.
    ///
    /// Dropped listings are left out so they come back as "added" on the
    /// next crawl instead of lingering without a record.
    pub fn links(&self) -> Vec<ListingRef> {
        self.records.iter().map(|r| r.url.clone()).collect()
    }
}

/// Merges a fresh link set into a prior snapshot.
pub struct ReconciliationEngine<'a, E: ?Sized> {
    extractor: &'a E,
    concurrency: usize,
}

impl<'a, E: ListingExtractor + ?Sized> ReconciliationEngine<'a, E> {
    pub fn new(extractor: &'a E) -> Self {
        Self {
            extractor,
            concurrency: 1,
        }
    }

    /// Number of detail extractions allowed in flight at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Reconcile `fresh_links` against the prior snapshot.
    ///
    /// `fresh_links` must come from a walk that completed; a partial walk
    /// would turn every unseen listing into a removal.
    pub async fn reconcile(
        &self,
        prior_links: &[ListingRef],
        prior_records: &[ListingRecord],
        fresh_links: &[ListingRef],
    ) -> Reconciliation {
        let diff = diff_links(prior_links, fresh_links);
        let fresh: HashSet<&str> = fresh_links.iter().map(String::as_str).collect();

        // Carry over one record per still-listed URL. This also sheds prior
        // records whose URL was never part of the prior link set.
        let mut kept = HashSet::new();
        let mut records: Vec<ListingRecord> = prior_records
            .iter()
            .filter(|r| fresh.contains(r.url.as_str()) && kept.insert(r.url.as_str()))
            .cloned()
            .collect();

        // Every listed URL without a carried-over record is extracted. Besides
        // the added links this covers links whose prior record went missing.
        let mut queued = HashSet::new();
        let targets: Vec<ListingRef> = fresh_links
            .iter()
            .filter(|url| !kept.contains(url.as_str()) && queued.insert(url.as_str()))
            .cloned()
            .collect();

        let added: HashSet<&str> = diff.added.iter().map(String::as_str).collect();
        let recovered = targets
            .iter()
            .filter(|url| !added.contains(url.as_str()))
            .count();
        if recovered > 0 {
            log::warn!("{} listed URLs lost their record; extracting them again", recovered);
        }
        if !targets.is_empty() {
            log::info!("Extracting {} listings", targets.len());
        }

        let extractor = self.extractor;
        let mut results = stream::iter(targets)
            .map(|url| async move {
                let result = extractor.extract(&url).await;
                (url, result)
            })
            .buffered(self.concurrency);

        let mut dropped = Vec::new();
        while let Some((url, result)) = results.next().await {
            match result {
                Ok(mut record) => {
                    if record.url != url {
                        log::warn!(
                            "Extractor returned {} for {}; keeping the listed URL",
                            record.url,
                            url
                        );
                        record.url = url;
                    }
                    records.push(record);
                }
                Err(e) if e.is_per_listing() => {
                    log::warn!("Dropping listing {}: {}", url, e);
                    dropped.push(url);
                }
                Err(e) => {
                    log::error!("Dropping listing {} after unexpected error: {}", url, e);
                    dropped.push(url);
                }
            }
        }

        Reconciliation {
            records,
            added: diff.added,
            removed: diff.removed,
            dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{AppError, Result};
    use crate::models::Coordinates;

    /// Records every extraction and fails for configured URLs.
    #[derive(Default)]
    struct CountingExtractor {
        calls: Mutex<Vec<String>>,
        failing: HashSet<String>,
    }

    impl CountingExtractor {
        fn failing(urls: &[&str]) -> Self {
            Self {
                failing: urls.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ListingExtractor for CountingExtractor {
        async fn extract(&self, url: &str) -> Result<ListingRecord> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.failing.contains(url) {
                return Err(AppError::extraction(url, "price block not found"));
            }
            Ok(record(url, "fresh"))
        }
    }

    fn record(url: &str, price: &str) -> ListingRecord {
        ListingRecord {
            url: url.to_string(),
            location: "Zürich".to_string(),
            address: format!("{url} street"),
            price: price.to_string(),
            coords: Some(Coordinates { x: 8.5, y: 47.4 }),
        }
    }

    fn links(urls: &[&str]) -> Vec<ListingRef> {
        urls.iter().map(|s| s.to_string()).collect()
    }

    fn urls(records: &[ListingRecord]) -> Vec<&str> {
        records.iter().map(|r| r.url.as_str()).collect()
    }

    #[test]
    fn test_no_changes() {
        let prior = links(&["A", "B"]);
        let diff = diff_links(&prior, &prior);
        assert_eq!(diff, LinkDiff::default());
    }

    #[test]
    fn test_mixed_changes() {
        let diff = diff_links(&links(&["A", "B", "C"]), &links(&["B", "C", "D"]));
        assert_eq!(diff.added, links(&["D"]));
        assert_eq!(diff.removed, links(&["A"]));
    }

    #[test]
    fn test_empty_to_full_and_back() {
        let full = links(&["A", "B"]);
        let diff = diff_links(&[], &full);
        assert_eq!(diff.added, full);
        assert!(diff.removed.is_empty());

        let diff = diff_links(&full, &[]);
        assert!(diff.added.is_empty());
        assert_eq!(diff.removed, full);
    }

    #[test]
    fn test_duplicates_reported_once() {
        let diff = diff_links(&links(&["A", "A"]), &links(&["B", "B"]));
        assert_eq!(diff.added, links(&["B"]));
        assert_eq!(diff.removed, links(&["A"]));
    }

    #[tokio::test]
    async fn test_reconcile_adds_and_removes() {
        let extractor = CountingExtractor::default();
        let prior_records = vec![record("A", "1"), record("B", "2"), record("C", "3")];

        let result = ReconciliationEngine::new(&extractor)
            .reconcile(
                &links(&["A", "B", "C"]),
                &prior_records,
                &links(&["B", "C", "D"]),
            )
            .await;

        assert_eq!(result.added, links(&["D"]));
        assert_eq!(result.removed, links(&["A"]));
        assert!(result.dropped.is_empty());
        assert_eq!(urls(&result.records), vec!["B", "C", "D"]);

        // Carried-over records are untouched, only D was extracted.
        assert_eq!(result.records[0], prior_records[1]);
        assert_eq!(result.records[1], prior_records[2]);
        assert_eq!(result.records[2].price, "fresh");
        assert_eq!(extractor.calls(), vec!["D"]);
    }

    #[tokio::test]
    async fn test_failed_extraction_is_dropped() {
        let extractor = CountingExtractor::failing(&["D"]);

        let result = ReconciliationEngine::new(&extractor)
            .reconcile(
                &links(&["A", "B", "C"]),
                &[record("A", "1"), record("B", "2"), record("C", "3")],
                &links(&["B", "C", "D"]),
            )
            .await;

        assert_eq!(urls(&result.records), vec!["B", "C"]);
        assert_eq!(result.dropped, links(&["D"]));
        assert_eq!(result.links(), links(&["B", "C"]));
    }

    #[tokio::test]
    async fn test_unchanged_links_extract_nothing() {
        let extractor = CountingExtractor::default();
        let prior_records = vec![record("A", "1"), record("B", "2")];

        let result = ReconciliationEngine::new(&extractor)
            .reconcile(&links(&["A", "B"]), &prior_records, &links(&["B", "A"]))
            .await;

        assert!(extractor.calls().is_empty());
        assert_eq!(result.records, prior_records);
    }

    #[tokio::test]
    async fn test_orphan_records_are_pruned_not_refetched() {
        let extractor = CountingExtractor::default();
        // "A" was linked without a record, "B" has a record (twice) but was
        // not in the prior link set, "Z" is an unlisted orphan record.
        let prior_records = vec![record("B", "2"), record("Z", "9"), record("B", "dup")];

        let result = ReconciliationEngine::new(&extractor)
            .reconcile(&links(&["A"]), &prior_records, &links(&["A", "B"]))
            .await;

        assert_eq!(urls(&result.records), vec!["B", "A"]);
        assert_eq!(result.records[0].price, "2");
        assert_eq!(extractor.calls(), vec!["A"]);
    }

    #[tokio::test]
    async fn test_listed_link_without_record_is_extracted_again() {
        let extractor = CountingExtractor::default();
        // The record of "B" was lost while its link survived.
        let prior_records = vec![record("A", "1")];

        let result = ReconciliationEngine::new(&extractor)
            .reconcile(&links(&["A", "B"]), &prior_records, &links(&["A", "B"]))
            .await;

        assert!(result.added.is_empty());
        assert!(result.removed.is_empty());
        assert_eq!(urls(&result.records), vec!["A", "B"]);
        assert_eq!(result.records[0].price, "1");
        assert_eq!(result.links(), links(&["A", "B"]));
        assert_eq!(extractor.calls(), vec!["B"]);
    }

    #[tokio::test]
    async fn test_concurrent_extraction_keeps_order() {
        let extractor = CountingExtractor::failing(&["C"]);

        let result = ReconciliationEngine::new(&extractor)
            .with_concurrency(4)
            .reconcile(&[], &[], &links(&["A", "B", "C", "D", "E"]))
            .await;

        assert_eq!(urls(&result.records), vec!["A", "B", "D", "E"]);
        assert_eq!(result.dropped, links(&["C"]));
    }
}
