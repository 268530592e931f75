// src/models/mod.rs

//! Domain models for the crawler.

mod config;
mod dataset;
mod listing;
mod region;

// Re-export all public types
pub use config::{
    CacheConfig, Config, CrawlerConfig, DetailsConfig, ExportConfig, GeocoderConfig, SiteConfig,
};
pub use dataset::{Dataset, ExportStamp, Place};
pub use listing::{Coordinates, ListingRecord, ListingRef};
pub use region::Region;
