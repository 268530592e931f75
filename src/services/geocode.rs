// src/services/geocode.rs

//! Geocoding collaborator.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{Config, Coordinates};
use crate::utils::http::create_client;

/// One geocoding match.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Candidate {
    #[serde(default)]
    pub address: String,
    pub location: Coordinates,
    #[serde(default)]
    pub score: f64,
}

/// Resolves free-text addresses into coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Candidates ordered best first; an empty list means no match.
    async fn geocode(&self, address: &str) -> Result<Vec<Candidate>>;
}

#[derive(Debug, Deserialize)]
struct FindCandidatesResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Geocoder backed by an ArcGIS `findAddressCandidates` endpoint.
pub struct ArcGisGeocoder {
    client: reqwest::Client,
    endpoint: String,
    max_candidates: usize,
}

impl ArcGisGeocoder {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: create_client(&config.crawler)?,
            endpoint: config.geocoder.endpoint.clone(),
            max_candidates: config.geocoder.max_candidates.max(1),
        })
    }

    fn parse_response(body: &str) -> Result<Vec<Candidate>> {
        let response: FindCandidatesResponse = serde_json::from_str(body)
            .map_err(|e| AppError::geocode(format!("unexpected response: {e}")))?;

        if let Some(err) = response.error {
            return Err(AppError::geocode(format!(
                "service error {}: {}",
                err.code, err.message
            )));
        }
        Ok(response.candidates)
    }
}

#[async_trait]
impl Geocoder for ArcGisGeocoder {
    async fn geocode(&self, address: &str) -> Result<Vec<Candidate>> {
        let max_locations = self.max_candidates.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("SingleLine", address),
                ("f", "json"),
                ("outFields", "Match_addr"),
                ("maxLocations", max_locations.as_str()),
            ])
            .send()
            .await
            .map_err(AppError::geocode)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::geocode(format!("HTTP status {status}")));
        }

        let body = response.text().await.map_err(AppError::geocode)?;
        Self::parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_candidates() {
        let body = r#"{
            "spatialReference": {"wkid": 4326, "latestWkid": 4326},
            "candidates": [
                {
                    "address": "Langstrasse 1, 8004 Zürich",
                    "location": {"x": 8.5284, "y": 47.3769},
                    "score": 100,
                    "attributes": {}
                }
            ]
        }"#;

        let candidates = ArcGisGeocoder::parse_response(body).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].location, Coordinates { x: 8.5284, y: 47.3769 });
        assert_eq!(candidates[0].score, 100.0);
    }

    #[test]
    fn test_parse_no_candidates() {
        let candidates = ArcGisGeocoder::parse_response(r#"{"candidates": []}"#).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_parse_service_error() {
        let body = r#"{"error": {"code": 498, "message": "Invalid token.", "details": []}}"#;
        assert!(matches!(
            ArcGisGeocoder::parse_response(body),
            Err(AppError::Geocode(_))
        ));
    }
}
