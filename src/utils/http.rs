// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;

fn builder(config: &CrawlerConfig) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .danger_accept_invalid_certs(config.accept_invalid_certs)
}

/// Create the client backing a search session.
///
/// Keeps cookies so the submitted search survives across result pages.
pub fn create_session_client(config: &CrawlerConfig) -> Result<reqwest::Client> {
    Ok(builder(config).cookie_store(true).build()?)
}

/// Create a stateless client for detail pages and geocoding.
pub fn create_client(config: &CrawlerConfig) -> Result<reqwest::Client> {
    Ok(builder(config).build()?)
}

/// Turn a response into its body text, treating non-success statuses as fetch errors.
pub async fn response_text(url: &str, response: reqwest::Response) -> Result<String> {
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::fetch(url, format!("HTTP status {status}")));
    }
    Ok(response.text().await?)
}

/// Fetch a page body with GET.
pub async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::fetch(url, e))?;
    response_text(url, response).await
}
