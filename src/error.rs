// src/error.rs

//! Unified error handling for the crawler.

use std::fmt;

use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed (includes timeouts)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Pagination could not be walked to completion; no link set from it can be trusted.
    #[error("Traversal error for region {region}: {message}")]
    Traversal { region: String, message: String },

    /// A single page or detail fetch failed at the transport level.
    #[error("Fetch error for {url}: {message}")]
    Fetch { url: String, message: String },

    /// A listing could not be turned into a record.
    #[error("Extraction failed for {url}: {reason}")]
    Extraction { url: String, reason: String },

    /// The geocoding service could not be reached or answered garbage.
    #[error("Geocoding error: {0}")]
    Geocode(String),

    /// The cache store failed to read or write an entry.
    #[error("Cache error for {namespace}/{key}: {message}")]
    Cache {
        namespace: String,
        key: String,
        message: String,
    },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a traversal error for a region.
    pub fn traversal(region: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Traversal {
            region: region.into(),
            message: message.to_string(),
        }
    }

    /// Create a fetch error for a URL.
    pub fn fetch(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create an extraction failure for a listing URL.
    pub fn extraction(url: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Extraction {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a geocoding error.
    pub fn geocode(message: impl fmt::Display) -> Self {
        Self::Geocode(message.to_string())
    }

    /// Create a cache error for an entry.
    pub fn cache(
        namespace: impl fmt::Display,
        key: impl Into<String>,
        message: impl fmt::Display,
    ) -> Self {
        Self::Cache {
            namespace: namespace.to_string(),
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error only concerns a single listing.
    ///
    /// These are isolated by the caller: the listing is dropped and the run continues.
    pub fn is_per_listing(&self) -> bool {
        matches!(
            self,
            Self::Extraction { .. } | Self::Fetch { .. } | Self::Http(_) | Self::Geocode(_)
        )
    }
}
