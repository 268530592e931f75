// src/services/pages.rs

//! Search session and result page parsing.
//!
//! A [`PageFetcher`] drives one navigable search session: it submits the
//! search form for a region and follows "next page" targets. Result pages are
//! reduced to a [`ResultPage`] so the pagination logic never touches markup.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Config, ListingRef, Region, SiteConfig};
use crate::utils::http::{create_session_client, fetch_text, response_text};
use crate::utils::{normalize_whitespace, parse_selector, resolve_url};

/// What the pagination logic needs to know about one result page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPage {
    /// Detail URLs on this page; `None` when the result container is absent
    pub items: Option<Vec<ListingRef>>,

    /// Raw "current / total" text of the pagination control
    pub position: Option<String>,

    /// Target of the "next page" control
    pub next: Option<String>,
}

/// A navigable search session.
///
/// A session is exclusively owned by one walk at a time.
#[async_trait]
pub trait PageFetcher: Send {
    /// Start a fresh search scoped to `region` and return its first page.
    async fn open_search(&mut self, region: &Region) -> Result<ResultPage>;

    /// Navigate to a target reported by the previous page.
    async fn follow(&mut self, target: &str) -> Result<ResultPage>;

    /// Enumerate the regions offered by the search form.
    async fn regions(&mut self) -> Result<Vec<Region>>;
}

/// Extracts [`ResultPage`]s and regions from search markup.
pub struct ResultPageParser {
    list: Selector,
    item: Selector,
    link: Selector,
    position: Selector,
    next: Selector,
    region_option: Selector,
    region_exclude: HashSet<String>,
}

impl ResultPageParser {
    pub fn new(site: &SiteConfig) -> Result<Self> {
        Ok(Self {
            list: parse_selector(&site.result_list_selector)?,
            item: parse_selector(&site.item_selector)?,
            link: parse_selector(&site.item_link_selector)?,
            position: parse_selector(&site.position_selector)?,
            next: parse_selector(&site.next_selector)?,
            region_option: parse_selector(&site.region_option_selector)?,
            region_exclude: site.region_exclude.iter().cloned().collect(),
        })
    }

    /// Parse a result page, resolving links against `base`.
    pub fn parse(&self, html: &str, base: &Url) -> ResultPage {
        let document = Html::parse_document(html);

        let items = document.select(&self.list).next().map(|list| {
            list.select(&self.item)
                .filter_map(|item| item.select(&self.link).next())
                .filter_map(|a| a.value().attr("href"))
                .map(|href| resolve_url(base, href.trim()))
                .collect()
        });

        let position = document
            .select(&self.position)
            .next()
            .map(|el| normalize_whitespace(&el.text().collect::<String>()));

        let next = document
            .select(&self.next)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|href| resolve_url(base, href.trim()));

        ResultPage {
            items,
            position,
            next,
        }
    }

    /// Parse the region options of the search form.
    pub fn parse_regions(&self, html: &str) -> Vec<Region> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();

        document
            .select(&self.region_option)
            .filter_map(|option| {
                let id = option.value().attr("value")?.trim().to_string();
                if self.region_exclude.contains(&id) || !seen.insert(id.clone()) {
                    return None;
                }
                let name = normalize_whitespace(&option.text().collect::<String>());
                let display_name = if name.is_empty() { id.clone() } else { name };
                Some(Region { id, display_name })
            })
            .collect()
    }
}

/// Search session over plain HTTP with a cookie-carrying client.
pub struct HttpPageFetcher {
    client: reqwest::Client,
    site: SiteConfig,
    parser: ResultPageParser,
    settle_delay: Duration,
    current_url: Option<Url>,
}

impl HttpPageFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: create_session_client(&config.crawler)?,
            site: config.site.clone(),
            parser: ResultPageParser::new(&config.site)?,
            settle_delay: config.crawler.settle_delay(),
            current_url: None,
        })
    }

    fn base_url(&self) -> Result<Url> {
        match &self.current_url {
            Some(url) => Ok(url.clone()),
            None => Ok(Url::parse(&self.site.search_url)?),
        }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn open_search(&mut self, region: &Region) -> Result<ResultPage> {
        // Loading the form page resets whatever search the session had.
        fetch_text(&self.client, &self.site.search_url).await?;

        let mut form: Vec<(&str, &str)> = self
            .site
            .search_params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        form.push((self.site.region_param.as_str(), region.id.as_str()));

        let action = &self.site.form_action;
        let response = self
            .client
            .post(action)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::fetch(action.as_str(), e))?;
        let final_url = response.url().clone();
        let html = response_text(action, response).await?;

        tokio::time::sleep(self.settle_delay).await;

        let page = self.parser.parse(&html, &final_url);
        self.current_url = Some(final_url);
        Ok(page)
    }

    async fn follow(&mut self, target: &str) -> Result<ResultPage> {
        let url = self.base_url()?.join(target)?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AppError::fetch(url.as_str(), e))?;
        let final_url = response.url().clone();
        let html = response_text(url.as_str(), response).await?;

        let page = self.parser.parse(&html, &final_url);
        self.current_url = Some(final_url);
        Ok(page)
    }

    async fn regions(&mut self) -> Result<Vec<Region>> {
        let html = fetch_text(&self.client, &self.site.search_url).await?;
        let regions = self.parser.parse_regions(&html);
        if regions.is_empty() {
            return Err(AppError::validation(format!(
                "no regions found on {} with selector '{}'",
                self.site.search_url, self.site.region_option_selector
            )));
        }
        Ok(regions)
    }
}
