// src/lib.rs

//! wgcrawler library
//!
//! Walks a paginated room-listing search per region, memoizes the expensive
//! per-listing work in a persistent cache, and reconciles each fresh crawl
//! against the previous snapshot before exporting one consolidated dataset.

pub mod cache;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod utils;
