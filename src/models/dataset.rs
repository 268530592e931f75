//! Exported dataset structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Coordinates, ListingRecord};

/// The consolidated dataset of all regions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    pub places: Vec<Place>,
}

/// One exported listing.
///
/// `id` is positional and only stable within a single export.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Place {
    pub id: usize,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub url: String,
    pub loc: String,
    pub address: String,
    pub price: String,
    pub coords: Option<Coordinates>,
}

impl Dataset {
    /// Build a dataset, numbering records in iteration order.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ListingRecord>) -> Self {
        let places = records
            .into_iter()
            .enumerate()
            .map(|(id, record)| Place {
                id,
                longitude: record.coords.map(|c| c.x),
                latitude: record.coords.map(|c| c.y),
                url: record.url.clone(),
                loc: record.location.clone(),
                address: record.address.clone(),
                price: record.price.clone(),
                coords: record.coords,
            })
            .collect();

        Self { places }
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }
}

/// Marker written next to the dataset on every export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportStamp {
    pub updated_at: DateTime<Utc>,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, coords: Option<Coordinates>) -> ListingRecord {
        ListingRecord {
            url: url.to_string(),
            location: "Bern".to_string(),
            address: "Marktgasse 2".to_string(),
            price: "750".to_string(),
            coords,
        }
    }

    #[test]
    fn test_ids_are_positional() {
        let records = vec![
            record("https://example.com/a", Some(Coordinates { x: 7.44, y: 46.95 })),
            record("https://example.com/b", None),
        ];

        let dataset = Dataset::from_records(&records);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.places[0].id, 0);
        assert_eq!(dataset.places[1].id, 1);
        assert_eq!(dataset.places[0].longitude, Some(7.44));
        assert_eq!(dataset.places[0].latitude, Some(46.95));
    }

    #[test]
    fn test_degraded_record_exports_nulls() {
        let records = vec![record("https://example.com/b", None)];
        let json = serde_json::to_value(Dataset::from_records(&records)).unwrap();

        let place = &json["places"][0];
        assert!(place["longitude"].is_null());
        assert!(place["coords"].is_null());
        assert_eq!(place["loc"], "Bern");
    }
}
