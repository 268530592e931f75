//! Application configuration structures.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::utils::parse_selector;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and politeness settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Search form and result page layout
    #[serde(default)]
    pub site: SiteConfig,

    /// Listing detail page layout and acceptance policy
    #[serde(default)]
    pub details: DetailsConfig,

    /// Geocoding service settings
    #[serde(default)]
    pub geocoder: GeocoderConfig,

    /// Snapshot cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Dataset export settings
    #[serde(default)]
    pub export: ExportConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.request_delay_ms == 0 {
            return Err(AppError::validation("crawler.request_delay_ms must be > 0"));
        }
        if self.crawler.settle_delay_ms == 0 {
            return Err(AppError::validation("crawler.settle_delay_ms must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.cache.staleness_minutes == 0 {
            return Err(AppError::validation("cache.staleness_minutes must be > 0"));
        }
        if self.geocoder.max_candidates == 0 {
            return Err(AppError::validation("geocoder.max_candidates must be > 0"));
        }
        if self.site.region_param.trim().is_empty() {
            return Err(AppError::validation("site.region_param is empty"));
        }

        url::Url::parse(&self.site.search_url)?;
        url::Url::parse(&self.site.form_action)?;
        url::Url::parse(&self.geocoder.endpoint)?;

        for selector in [
            &self.site.result_list_selector,
            &self.site.item_selector,
            &self.site.item_link_selector,
            &self.site.position_selector,
            &self.site.next_selector,
            &self.site.region_option_selector,
            &self.details.price_block_selector,
            &self.details.address_block_selector,
        ] {
            parse_selector(selector)?;
        }

        Ok(())
    }

    /// Directory holding the snapshot cache, relative to the storage root.
    pub fn cache_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.cache.dir)
    }

    /// Path of the exported dataset, relative to the storage root.
    pub fn export_path(&self, root: &Path) -> PathBuf {
        root.join(&self.export.file)
    }
}

/// HTTP client and politeness settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Page-load timeout in seconds; an exceeded budget is a fetch error
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between successive result pages in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Delay after submitting the search form in milliseconds
    #[serde(default = "defaults::settle_delay")]
    pub settle_delay_ms: u64,

    /// Maximum concurrent listing detail fetches
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Skip TLS certificate verification (the listing site has served broken chains)
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl CrawlerConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms.max(1))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms.max(1))
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            settle_delay_ms: defaults::settle_delay(),
            max_concurrent: defaults::max_concurrent(),
            accept_invalid_certs: false,
        }
    }
}

/// Search form and result page layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Page holding the search form; loading it resets the server-side search
    #[serde(default = "defaults::search_url")]
    pub search_url: String,

    /// Target of the search form submission
    #[serde(default = "defaults::form_action")]
    pub form_action: String,

    /// Form field carrying the region selector value
    #[serde(default = "defaults::region_param")]
    pub region_param: String,

    /// Additional fixed form fields sent with every search
    #[serde(default = "defaults::search_params")]
    pub search_params: BTreeMap<String, String>,

    /// Region option values that do not denote a region (e.g. "all")
    #[serde(default = "defaults::region_exclude")]
    pub region_exclude: Vec<String>,

    /// Container of the result items; absent when a search has no results
    #[serde(default = "defaults::result_list_selector")]
    pub result_list_selector: String,

    /// One result item inside the container
    #[serde(default = "defaults::item_selector")]
    pub item_selector: String,

    /// Link to the detail page inside a result item (first match wins)
    #[serde(default = "defaults::item_link_selector")]
    pub item_link_selector: String,

    /// Element whose text reports "current / total" pages
    #[serde(default = "defaults::position_selector")]
    pub position_selector: String,

    /// Link to the next result page
    #[serde(default = "defaults::next_selector")]
    pub next_selector: String,

    /// Region options of the search form
    #[serde(default = "defaults::region_option_selector")]
    pub region_option_selector: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            search_url: defaults::search_url(),
            form_action: defaults::form_action(),
            region_param: defaults::region_param(),
            search_params: defaults::search_params(),
            region_exclude: defaults::region_exclude(),
            result_list_selector: defaults::result_list_selector(),
            item_selector: defaults::item_selector(),
            item_link_selector: defaults::item_link_selector(),
            position_selector: defaults::position_selector(),
            next_selector: defaults::next_selector(),
            region_option_selector: defaults::region_option_selector(),
        }
    }
}

/// Listing detail page layout and acceptance policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailsConfig {
    /// Block holding the price/date paragraphs
    #[serde(default = "defaults::price_block_selector")]
    pub price_block_selector: String,

    /// Block holding the address/region paragraphs
    #[serde(default = "defaults::address_block_selector")]
    pub address_block_selector: String,

    /// Label (suffix match) of the monthly price paragraph
    #[serde(default = "defaults::price_label")]
    pub price_label: String,

    /// Label of the street address paragraph
    #[serde(default = "defaults::address_label")]
    pub address_label: String,

    /// Label of the location (city) paragraph
    #[serde(default = "defaults::location_label")]
    pub location_label: String,

    /// Reject listings whose price text carries the agency marker
    #[serde(default = "defaults::reject_agency")]
    pub reject_agency: bool,

    #[serde(default = "defaults::agency_marker")]
    pub agency_marker: String,
}

impl Default for DetailsConfig {
    fn default() -> Self {
        Self {
            price_block_selector: defaults::price_block_selector(),
            address_block_selector: defaults::address_block_selector(),
            price_label: defaults::price_label(),
            address_label: defaults::address_label(),
            location_label: defaults::location_label(),
            reject_agency: defaults::reject_agency(),
            agency_marker: defaults::agency_marker(),
        }
    }
}

/// Geocoding service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    /// `findAddressCandidates` endpoint of an ArcGIS geocode server
    #[serde(default = "defaults::geocoder_endpoint")]
    pub endpoint: String,

    /// Number of candidates requested per lookup
    #[serde(default = "defaults::max_candidates")]
    pub max_candidates: usize,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::geocoder_endpoint(),
            max_candidates: defaults::max_candidates(),
        }
    }
}

/// Snapshot cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory, relative to the storage root
    #[serde(default = "defaults::cache_dir")]
    pub dir: String,

    /// Minimum age of a region's link set before it is re-crawled
    #[serde(default = "defaults::staleness_minutes")]
    pub staleness_minutes: u64,
}

impl CacheConfig {
    pub fn staleness_window(&self) -> chrono::Duration {
        // Capped at one year; anything longer means "never re-crawl" in practice.
        chrono::Duration::minutes(self.staleness_minutes.min(525_600) as i64)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: defaults::cache_dir(),
            staleness_minutes: defaults::staleness_minutes(),
        }
    }
}

/// Dataset export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Dataset file, relative to the storage root
    #[serde(default = "defaults::export_file")]
    pub file: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            file: defaults::export_file(),
        }
    }
}

mod defaults {
    use std::collections::BTreeMap;

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/122.0.0.0 Safari/537.36"
            .into()
    }
    pub fn timeout() -> u64 {
        100
    }
    pub fn request_delay() -> u64 {
        1000
    }
    pub fn settle_delay() -> u64 {
        1000
    }
    pub fn max_concurrent() -> usize {
        1
    }

    // Site defaults
    pub fn search_url() -> String {
        "https://www.wgzimmer.ch/wgzimmer/search/mate.html?reset=true".into()
    }
    pub fn form_action() -> String {
        "https://www.wgzimmer.ch/wgzimmer/search/mate.html".into()
    }
    pub fn region_param() -> String {
        "wgState".into()
    }
    pub fn search_params() -> BTreeMap<String, String> {
        [
            ("query", ""),
            ("priceMin", "50"),
            ("priceMax", "3000"),
            ("permanent", "all"),
            ("student", "none"),
            ("typeofwg", "all"),
            ("orderBy", "@sortDate"),
            ("orderDir", "descending"),
            ("startSearchMate", "true"),
            ("wgStartSearch", "true"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }
    pub fn region_exclude() -> Vec<String> {
        vec!["".into(), "all".into()]
    }
    pub fn result_list_selector() -> String {
        "#search-result-list".into()
    }
    pub fn item_selector() -> String {
        ".search-mate-entry".into()
    }
    pub fn item_link_selector() -> String {
        "a[href]".into()
    }
    pub fn position_selector() -> String {
        ".result-navigation .skip span".into()
    }
    pub fn next_selector() -> String {
        ".result-navigation .skip a.next".into()
    }
    pub fn region_option_selector() -> String {
        "select[name=\"wgState\"] option".into()
    }

    // Detail defaults
    pub fn price_block_selector() -> String {
        "div[class^=\"wrap col-wrap date-cost\"]".into()
    }
    pub fn address_block_selector() -> String {
        "div[class^=\"wrap col-wrap adress-region\"]".into()
    }
    pub fn price_label() -> String {
        "Monat".into()
    }
    pub fn address_label() -> String {
        "Adresse".into()
    }
    pub fn location_label() -> String {
        "Ort".into()
    }
    pub fn reject_agency() -> bool {
        true
    }
    pub fn agency_marker() -> String {
        "Agentur".into()
    }

    // Geocoder defaults
    pub fn geocoder_endpoint() -> String {
        "https://geocode.arcgis.com/arcgis/rest/services/World/GeocodeServer/findAddressCandidates"
            .into()
    }
    pub fn max_candidates() -> usize {
        1
    }

    // Cache defaults
    pub fn cache_dir() -> String {
        "cache".into()
    }
    pub fn staleness_minutes() -> u64 {
        60
    }

    // Export defaults
    pub fn export_file() -> String {
        "places.json".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.crawler.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_politeness_delay() {
        let mut config = Config::default();
        config.crawler.request_delay_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_broken_selector() {
        let mut config = Config::default();
        config.site.item_selector = "[[invalid".to_string();
        assert!(matches!(
            config.validate(),
            Err(AppError::Selector { .. })
        ));
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            [crawler]
            request_delay_ms = 2500

            [cache]
            staleness_minutes = 15
            "#,
        )
        .unwrap();

        assert_eq!(config.crawler.request_delay_ms, 2500);
        assert_eq!(config.crawler.timeout_secs, 100);
        assert_eq!(config.cache.staleness_window(), chrono::Duration::minutes(15));
        assert_eq!(config.site.region_param, "wgState");
        assert!(config.details.reject_agency);
    }

    #[test]
    fn storage_paths_are_relative_to_root() {
        let config = Config::default();
        let root = Path::new("/tmp/storage");
        assert_eq!(config.cache_dir(root), root.join("cache"));
        assert_eq!(config.export_path(root), root.join("places.json"));
    }
}
