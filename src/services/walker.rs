// src/services/walker.rs

//! Pagination walker.
//!
//! Walks a region's search results from page 1 until the pagination control
//! reports the last page. The "current / total" pair is the termination
//! condition; a "next" control that is still present on the last page is
//! ignored. Any layout surprise aborts the walk, because a partial link set
//! would later read as "everything unseen was removed".

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::error::{AppError, Result};
use crate::models::{ListingRef, Region};
use crate::services::PageFetcher;

static POSITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*/\s*(\d+)").expect("position pattern is valid")
});

/// Position reported by the pagination control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePosition {
    pub current: u32,
    pub total: u32,
}

impl PagePosition {
    /// Parse the first `current/total` pair of a control text such as "Seite 2/7".
    pub fn parse(text: &str) -> Option<Self> {
        let caps = POSITION_RE.captures(text)?;
        let current = caps.get(1)?.as_str().parse().ok()?;
        let total = caps.get(2)?.as_str().parse().ok()?;

        if current == 0 || total == 0 || current > total {
            return None;
        }
        Some(Self { current, total })
    }

    pub fn is_last(&self) -> bool {
        self.current == self.total
    }
}

impl fmt::Display for PagePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.current, self.total)
    }
}

/// Result of a completed walk.
#[derive(Debug, Clone, Default)]
pub struct WalkOutcome {
    /// Distinct listing references, in first-seen order
    pub links: Vec<ListingRef>,
    /// Number of result pages visited
    pub pages: usize,
}

/// Drives a [`PageFetcher`] through all result pages of one region.
pub struct PaginationWalker<'a, F: ?Sized> {
    fetcher: &'a mut F,
    delay: Duration,
}

impl<'a, F: PageFetcher + ?Sized> PaginationWalker<'a, F> {
    /// `delay` is the politeness pause between two page fetches; zero is bumped to 1ms.
    pub fn new(fetcher: &'a mut F, delay: Duration) -> Self {
        Self {
            fetcher,
            delay: delay.max(Duration::from_millis(1)),
        }
    }

    /// Walk every result page for `region`, starting a fresh search.
    pub async fn walk(&mut self, region: &Region) -> Result<WalkOutcome> {
        let fail = |message: String| AppError::traversal(&region.id, message);

        let mut page = self
            .fetcher
            .open_search(region)
            .await
            .map_err(|e| fail(format!("search submission failed: {e}")))?;

        let mut seen = HashSet::new();
        let mut outcome = WalkOutcome::default();
        let mut previous: Option<PagePosition> = None;

        loop {
            outcome.pages += 1;

            let Some(items) = page.items.take() else {
                if outcome.pages == 1 {
                    log::info!("No listings for region {}", region.id);
                    return Ok(outcome);
                }
                return Err(fail(format!(
                    "result list missing on page {}",
                    outcome.pages
                )));
            };

            let found = items.len();
            for link in items {
                if seen.insert(link.clone()) {
                    outcome.links.push(link);
                }
            }

            let text = page
                .position
                .as_deref()
                .ok_or_else(|| fail(format!("pagination control missing on page {}", outcome.pages)))?;
            let position = PagePosition::parse(text)
                .ok_or_else(|| fail(format!("unparsable pagination text '{text}'")))?;

            log::debug!(
                "Region {}: page {} lists {} items",
                region.id,
                position,
                found
            );

            if let Some(prev) = previous {
                if position.current <= prev.current || position.total != prev.total {
                    return Err(fail(format!(
                        "pagination went from {prev} to {position}"
                    )));
                }
            }

            if position.is_last() {
                break;
            }

            let next = page
                .next
                .take()
                .ok_or_else(|| fail(format!("no next page target at {position}")))?;
            previous = Some(position);

            tokio::time::sleep(self.delay).await;
            page = self
                .fetcher
                .follow(&next)
                .await
                .map_err(|e| fail(format!("fetching page after {position} failed: {e}")))?;
        }

        log::info!(
            "Region {}: {} distinct listings on {} pages",
            region.id,
            outcome.links.len(),
            outcome.pages
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;

    use super::*;
    use crate::services::ResultPage;

    /// Serves a fixed sequence of pages.
    #[derive(Default)]
    struct ScriptedFetcher {
        pages: VecDeque<Result<ResultPage>>,
        opened: usize,
        followed: Vec<String>,
    }

    impl ScriptedFetcher {
        fn new(pages: Vec<ResultPage>) -> Self {
            Self {
                pages: pages.into_iter().map(Ok).collect(),
                ..Default::default()
            }
        }

        fn next_page(&mut self) -> Result<ResultPage> {
            self.pages
                .pop_front()
                .unwrap_or_else(|| Err(AppError::fetch("script", "no more pages")))
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn open_search(&mut self, _region: &Region) -> Result<ResultPage> {
            self.opened += 1;
            self.next_page()
        }

        async fn follow(&mut self, target: &str) -> Result<ResultPage> {
            self.followed.push(target.to_string());
            self.next_page()
        }

        async fn regions(&mut self) -> Result<Vec<Region>> {
            Ok(Vec::new())
        }
    }

    fn page(items: &[&str], position: &str, next: Option<&str>) -> ResultPage {
        ResultPage {
            items: Some(items.iter().map(|s| s.to_string()).collect()),
            position: Some(position.to_string()),
            next: next.map(str::to_string),
        }
    }

    fn region() -> Region {
        Region::new("zurich", "Zürich")
    }

    async fn walk(fetcher: &mut ScriptedFetcher) -> Result<WalkOutcome> {
        PaginationWalker::new(fetcher, Duration::from_millis(1))
            .walk(&region())
            .await
    }

    #[test]
    fn test_parse_position() {
        assert_eq!(
            PagePosition::parse("Seite 2/7"),
            Some(PagePosition { current: 2, total: 7 })
        );
        assert_eq!(
            PagePosition::parse("3 / 3"),
            Some(PagePosition { current: 3, total: 3 })
        );
        assert!(PagePosition::parse("3/3").unwrap().is_last());
        assert_eq!(PagePosition::parse("Seite"), None);
        assert_eq!(PagePosition::parse("4/3"), None);
        assert_eq!(PagePosition::parse("0/0"), None);
    }

    #[tokio::test]
    async fn test_visits_exactly_three_pages() {
        let mut fetcher = ScriptedFetcher::new(vec![
            page(&["a", "b"], "1/3", Some("p2")),
            page(&["c"], "2/3", Some("p3")),
            // The next control stays clickable on the last page.
            page(&["d"], "3/3", Some("p4")),
        ]);

        let outcome = walk(&mut fetcher).await.unwrap();
        assert_eq!(outcome.pages, 3);
        assert_eq!(outcome.links, vec!["a", "b", "c", "d"]);
        assert_eq!(fetcher.opened, 1);
        assert_eq!(fetcher.followed, vec!["p2", "p3"]);
    }

    #[tokio::test]
    async fn test_duplicate_links_are_collapsed() {
        let mut fetcher = ScriptedFetcher::new(vec![
            page(&["a", "b"], "1/2", Some("p2")),
            page(&["b", "c", "c"], "2/2", None),
        ]);

        let outcome = walk(&mut fetcher).await.unwrap();
        assert_eq!(outcome.links, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_missing_result_list_is_zero_results() {
        let mut fetcher = ScriptedFetcher::new(vec![ResultPage::default()]);

        let outcome = walk(&mut fetcher).await.unwrap();
        assert!(outcome.links.is_empty());
        assert_eq!(outcome.pages, 1);
        assert!(fetcher.followed.is_empty());
    }

    #[tokio::test]
    async fn test_missing_result_list_on_later_page_fails() {
        let mut fetcher = ScriptedFetcher::new(vec![
            page(&["a"], "1/2", Some("p2")),
            ResultPage::default(),
        ]);

        assert!(matches!(
            walk(&mut fetcher).await,
            Err(AppError::Traversal { .. })
        ));
    }

    #[tokio::test]
    async fn test_unparsable_position_fails() {
        let mut fetcher = ScriptedFetcher::new(vec![page(&["a"], "Seite ?", Some("p2"))]);

        let err = walk(&mut fetcher).await.unwrap_err();
        assert!(matches!(err, AppError::Traversal { ref region, .. } if region == "zurich"));
    }

    #[tokio::test]
    async fn test_missing_next_before_last_page_fails() {
        let mut fetcher = ScriptedFetcher::new(vec![page(&["a"], "1/2", None)]);
        assert!(walk(&mut fetcher).await.is_err());
    }

    #[tokio::test]
    async fn test_non_advancing_pagination_fails() {
        let mut fetcher = ScriptedFetcher::new(vec![
            page(&["a"], "1/3", Some("p2")),
            page(&["a"], "1/3", Some("p2")),
        ]);
        assert!(walk(&mut fetcher).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_error_mid_walk_is_traversal_error() {
        let mut fetcher = ScriptedFetcher::new(vec![page(&["a"], "1/2", Some("p2"))]);
        fetcher
            .pages
            .push_back(Err(AppError::fetch("p2", "operation timed out")));

        assert!(matches!(
            walk(&mut fetcher).await,
            Err(AppError::Traversal { .. })
        ));
    }
}
