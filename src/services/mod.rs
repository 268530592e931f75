//! Service layer for the crawler.
//!
//! This module contains the collaborators the pipeline drives:
//! - Search sessions and result page parsing (`PageFetcher`, `HttpPageFetcher`)
//! - Pagination traversal (`PaginationWalker`)
//! - Listing detail extraction (`ListingExtractor`, `HttpListingExtractor`)
//! - Address geocoding (`Geocoder`, `ArcGisGeocoder`)

mod details;
mod geocode;
mod pages;
mod walker;

pub use details::{DetailParser, HttpListingExtractor, ListingExtractor, ParsedDetail};
pub use geocode::{ArcGisGeocoder, Candidate, Geocoder};
pub use pages::{HttpPageFetcher, PageFetcher, ResultPage, ResultPageParser};
pub use walker::{PagePosition, PaginationWalker, WalkOutcome};
