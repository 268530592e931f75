//! Listing data structures.

use serde::{Deserialize, Serialize};

/// URL uniquely identifying one listing; equality is exact string equality.
pub type ListingRef = String;

/// Planar coordinates returned by the geocoder (x = longitude, y = latitude).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

/// Structured attributes of one listing.
///
/// Field names match the persisted cache format; changing them invalidates
/// every cached detail set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingRecord {
    /// Detail page URL, the join key with the link set
    pub url: ListingRef,

    /// Location (city) text
    #[serde(rename = "loc")]
    pub location: String,

    /// Street address text
    pub address: String,

    /// Monthly price text as shown on the page
    pub price: String,

    /// `None` marks a degraded record whose address could not be geocoded
    pub coords: Option<Coordinates>,
}

impl ListingRecord {
    /// Free-text address handed to the geocoder.
    pub fn geocode_query(address: &str, location: &str) -> String {
        format!("{address}, {location}")
    }

    pub fn is_degraded(&self) -> bool {
        self.coords.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_with_short_location_key() {
        let record = ListingRecord {
            url: "https://example.com/ad/1".to_string(),
            location: "Zürich".to_string(),
            address: "Langstrasse 1".to_string(),
            price: "900".to_string(),
            coords: Some(Coordinates { x: 8.52, y: 47.37 }),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["loc"], "Zürich");
        assert_eq!(json["coords"]["x"], 8.52);
        assert!(!record.is_degraded());
    }

    #[test]
    fn test_geocode_query() {
        assert_eq!(
            ListingRecord::geocode_query("Langstrasse 1", "8004 Zürich"),
            "Langstrasse 1, 8004 Zürich"
        );
    }
}
