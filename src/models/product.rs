//! Scrape target model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health classification of a product URL.
///
/// `Unchecked` covers both never-scraped targets and targets that failed
/// for a reason worth retrying (soft block, temporary unavailability).
/// `Invalid` is permanent: the page is gone or no longer a product page.
/// `Error` means no body could be fetched at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlStatus {
    Unchecked,
    Valid,
    Invalid,
    Error,
}

impl UrlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unchecked => "unchecked",
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unchecked" => Some(Self::Unchecked),
            "valid" => Some(Self::Valid),
            "invalid" => Some(Self::Invalid),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// A product being tracked: one product id + URL pair eligible for scraping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// External product identifier (unique).
    pub product_id: String,
    /// Product page URL.
    pub url: String,
    /// Last successfully scraped name, if any.
    pub name: Option<String>,
    /// Last observed price.
    pub price: Option<f64>,
    /// Last observed list price (UVP / MSRP).
    pub uvp: Option<f64>,
    /// Last scraped product image URL.
    pub image_url: Option<String>,
    /// Retail site label, used for batch filtering.
    pub site: Option<String>,
    /// Raw availability text from the last scrape.
    pub site_status: Option<String>,
    /// URL health classification.
    pub url_status: UrlStatus,
    /// Consecutive scrapes that yielded no data, for retry heuristics.
    pub consecutive_failed_scrapes: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Create a new, never-scraped product.
    pub fn new(product_id: String, url: String) -> Self {
        let now = Utc::now();
        Self {
            product_id,
            url,
            name: None,
            price: None,
            uvp: None,
            image_url: None,
            site: None,
            site_status: None,
            url_status: UrlStatus::Unchecked,
            consecutive_failed_scrapes: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a product with a site label.
    pub fn with_site(product_id: String, url: String, site: Option<String>) -> Self {
        Self {
            site,
            ..Self::new(product_id, url)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_status_round_trip() {
        for status in [
            UrlStatus::Unchecked,
            UrlStatus::Valid,
            UrlStatus::Invalid,
            UrlStatus::Error,
        ] {
            assert_eq!(UrlStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(UrlStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_new_product_defaults() {
        let product = Product::new("199529-60".into(), "https://example.com/p".into());
        assert_eq!(product.url_status, UrlStatus::Unchecked);
        assert_eq!(product.consecutive_failed_scrapes, 0);
        assert!(product.price.is_none());
    }
}
