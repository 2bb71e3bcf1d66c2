//! Price history models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical availability classification derived from raw site text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    InStock,
    OutOfStock,
    Limited,
    #[default]
    Unknown,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InStock => "in_stock",
            Self::OutOfStock => "out_of_stock",
            Self::Limited => "limited",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in_stock" => Some(Self::InStock),
            "out_of_stock" => Some(Self::OutOfStock),
            "limited" => Some(Self::Limited),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// One observed price point for a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceEntry {
    pub product_id: String,
    pub price: f64,
    /// List price (UVP / MSRP), if the site publishes one.
    pub uvp: Option<f64>,
    pub currency: String,
    pub seller: Option<String>,
    /// Raw availability text as scraped.
    pub site_status: Option<String>,
    pub availability: Availability,
    pub fetched_at: DateTime<Utc>,
}

impl PriceEntry {
    pub fn new(product_id: String, price: f64, currency: String) -> Self {
        Self {
            product_id,
            price,
            uvp: None,
            currency,
            seller: None,
            site_status: None,
            availability: Availability::Unknown,
            fetched_at: Utc::now(),
        }
    }
}
