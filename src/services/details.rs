// src/services/details.rs

//! Listing detail extraction.
//!
//! Turns one listing URL into a [`ListingRecord`]: fetch the detail page,
//! read the labeled price and address paragraphs, geocode the address.
//! Every failure carries the listing URL so the caller can log and drop it.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{Config, DetailsConfig, ListingRecord};
use crate::services::Geocoder;
use crate::utils::http::{create_client, fetch_text};
use crate::utils::{normalize_whitespace, parse_selector};

/// Produces a record for a listing URL.
#[async_trait]
pub trait ListingExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<ListingRecord>;
}

/// Labeled values read from a detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDetail {
    pub price: String,
    pub address: String,
    pub location: String,
}

/// Reads the price and address blocks of a detail page.
pub struct DetailParser {
    price_block: Selector,
    address_block: Selector,
    paragraph: Selector,
    label: Selector,
    config: DetailsConfig,
}

impl DetailParser {
    pub fn new(config: &DetailsConfig) -> Result<Self> {
        Ok(Self {
            price_block: parse_selector(&config.price_block_selector)?,
            address_block: parse_selector(&config.address_block_selector)?,
            paragraph: parse_selector("p")?,
            label: parse_selector("strong")?,
            config: config.clone(),
        })
    }

    /// Parse a detail page; `url` is only used for error context.
    pub fn parse(&self, url: &str, html: &str) -> Result<ParsedDetail> {
        let document = Html::parse_document(html);

        let price_block = document
            .select(&self.price_block)
            .next()
            .ok_or_else(|| AppError::extraction(url, "price block not found"))?;
        let address_block = document
            .select(&self.address_block)
            .next()
            .ok_or_else(|| AppError::extraction(url, "address block not found"))?;

        let price = self.labeled(url, price_block, &self.config.price_label)?;
        let address = self.labeled(url, address_block, &self.config.address_label)?;
        let location = self.labeled(url, address_block, &self.config.location_label)?;

        if self.config.reject_agency && price.contains(&self.config.agency_marker) {
            return Err(AppError::extraction(
                url,
                format!("offered by an agency ('{price}')"),
            ));
        }

        Ok(ParsedDetail {
            price,
            address,
            location,
        })
    }

    fn labeled(&self, url: &str, block: ElementRef<'_>, label: &str) -> Result<String> {
        self.labeled_value(block, label).ok_or_else(|| {
            AppError::extraction(url, format!("label '{label}' not found"))
        })
    }

    /// Text following the `<strong>` label of the first paragraph whose label ends with `label`.
    fn labeled_value(&self, block: ElementRef<'_>, label: &str) -> Option<String> {
        block.select(&self.paragraph).find_map(|p| {
            let strong = p.select(&self.label).next()?;
            let label_text = normalize_whitespace(&strong.text().collect::<String>());
            if !label_text.trim_end_matches(':').trim_end().ends_with(label) {
                return None;
            }

            let value: String = strong
                .next_siblings()
                .filter_map(|node| match node.value().as_text() {
                    Some(text) => Some(String::from(&**text)),
                    None => ElementRef::wrap(node).map(|el| el.text().collect::<String>()),
                })
                .collect();
            Some(normalize_whitespace(&value))
        })
    }
}

/// Fetches detail pages over plain HTTP and geocodes them.
pub struct HttpListingExtractor<G> {
    client: reqwest::Client,
    parser: DetailParser,
    geocoder: G,
}

impl<G: Geocoder> HttpListingExtractor<G> {
    pub fn new(config: &Config, geocoder: G) -> Result<Self> {
        Ok(Self {
            client: create_client(&config.crawler)?,
            parser: DetailParser::new(&config.details)?,
            geocoder,
        })
    }

    /// Build a record from already fetched markup.
    pub async fn extract_from_html(&self, url: &str, html: &str) -> Result<ListingRecord> {
        let detail = self.parser.parse(url, html)?;
        let query = ListingRecord::geocode_query(&detail.address, &detail.location);

        let coords = match self.geocoder.geocode(&query).await {
            Ok(candidates) => match candidates.first() {
                Some(candidate) => Some(candidate.location),
                None => {
                    return Err(AppError::extraction(
                        url,
                        format!("no geocoding candidate for '{query}'"),
                    ));
                }
            },
            Err(e) => {
                log::warn!(
                    "Geocoding '{}' for {} failed: {}; keeping listing without coordinates",
                    query,
                    url,
                    e
                );
                None
            }
        };

        Ok(ListingRecord {
            url: url.to_string(),
            location: detail.location,
            address: detail.address,
            price: detail.price,
            coords,
        })
    }
}

#[async_trait]
impl<G: Geocoder> ListingExtractor for HttpListingExtractor<G> {
    async fn extract(&self, url: &str) -> Result<ListingRecord> {
        let html = fetch_text(&self.client, url).await?;
        self.extract_from_html(url, &html).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coordinates;
    use crate::services::Candidate;

    const URL: &str = "https://www.example.com/en/wgzimmer/rooms/zurich/1.html";

    const DETAIL_PAGE: &str = r#"
        <html><body>
          <div class="wrap col-wrap date-cost">
            <p><strong>Ab dem</strong> 1.11.2026</p>
            <p><strong>Miete / Monat</strong>
               sFr. 950.- </p>
          </div>
          <div class="wrap col-wrap adress-region">
            <p><strong>Region</strong> Zürich Stadt</p>
            <p><strong>Adresse</strong> Langstrasse 1</p>
            <p><strong>Ort</strong> 8004 <em>Zürich</em></p>
          </div>
        </body></html>
    "#;

    struct FixedGeocoder(Result<Vec<Candidate>>);

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn geocode(&self, _address: &str) -> Result<Vec<Candidate>> {
            match &self.0 {
                Ok(candidates) => Ok(candidates.clone()),
                Err(e) => Err(AppError::geocode(e)),
            }
        }
    }

    fn candidate(x: f64, y: f64) -> Candidate {
        Candidate {
            address: String::new(),
            location: Coordinates { x, y },
            score: 100.0,
        }
    }

    fn extractor(geocoder: FixedGeocoder) -> HttpListingExtractor<FixedGeocoder> {
        HttpListingExtractor::new(&Config::default(), geocoder).unwrap()
    }

    fn parser() -> DetailParser {
        DetailParser::new(&DetailsConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_detail_page() {
        let detail = parser().parse(URL, DETAIL_PAGE).unwrap();
        assert_eq!(
            detail,
            ParsedDetail {
                price: "sFr. 950.-".to_string(),
                address: "Langstrasse 1".to_string(),
                location: "8004 Zürich".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_block_is_extraction_failure() {
        let html = r#"<div class="wrap col-wrap date-cost"><p><strong>Miete / Monat</strong> 900</p></div>"#;
        let err = parser().parse(URL, html).unwrap_err();
        assert!(matches!(err, AppError::Extraction { ref url, .. } if url == URL));
    }

    #[test]
    fn test_missing_label_is_extraction_failure() {
        let html = DETAIL_PAGE.replace("<strong>Ort</strong>", "<strong>Stadt</strong>");
        assert!(matches!(
            parser().parse(URL, &html),
            Err(AppError::Extraction { .. })
        ));
    }

    #[test]
    fn test_agency_listing_rejected_by_default() {
        let html = DETAIL_PAGE.replace("sFr. 950.-", "sFr. 950.- (Agentur)");
        assert!(parser().parse(URL, &html).is_err());

        let config = DetailsConfig {
            reject_agency: false,
            ..DetailsConfig::default()
        };
        let detail = DetailParser::new(&config).unwrap().parse(URL, &html).unwrap();
        assert_eq!(detail.price, "sFr. 950.- (Agentur)");
    }

    #[tokio::test]
    async fn test_extract_geocodes_address() {
        let extractor = extractor(FixedGeocoder(Ok(vec![
            candidate(8.52, 47.37),
            candidate(0.0, 0.0),
        ])));

        let record = extractor.extract_from_html(URL, DETAIL_PAGE).await.unwrap();
        assert_eq!(record.url, URL);
        assert_eq!(record.location, "8004 Zürich");
        assert_eq!(record.coords, Some(Coordinates { x: 8.52, y: 47.37 }));
    }

    #[tokio::test]
    async fn test_no_candidate_is_extraction_failure() {
        let extractor = extractor(FixedGeocoder(Ok(Vec::new())));
        assert!(matches!(
            extractor.extract_from_html(URL, DETAIL_PAGE).await,
            Err(AppError::Extraction { .. })
        ));
    }

    #[tokio::test]
    async fn test_geocoder_outage_keeps_degraded_record() {
        let extractor = extractor(FixedGeocoder(Err(AppError::geocode("connection reset"))));

        let record = extractor.extract_from_html(URL, DETAIL_PAGE).await.unwrap();
        assert!(record.is_degraded());
        assert_eq!(record.price, "sFr. 950.-");
    }
}
