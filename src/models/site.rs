//! Per-site selector configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Locator dialect for a site's selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorDialect {
    /// Full CSS selectors, passed straight to the query engine.
    #[default]
    Css,
    /// Reduced form: `tag`, `.class`, `#id`, or `tag.class` only.
    Simple,
}

impl SelectorDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Css => "css",
            Self::Simple => "simple",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "css" => Some(Self::Css),
            "simple" => Some(Self::Simple),
            _ => None,
        }
    }
}

/// Field selectors for one retail site, keyed by hostname.
///
/// Immutable during a run; looked up once per fetch. An unset selector
/// means the field is not extracted for this site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub hostname: String,
    pub dialect: SelectorDialect,
    pub price_selector: Option<String>,
    pub uvp_selector: Option<String>,
    pub seller_selector: Option<String>,
    pub availability_selector: Option<String>,
    pub name_selector: Option<String>,
    pub image_selector: Option<String>,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SiteConfig {
    /// Create a config with no selectors set.
    pub fn new(hostname: String) -> Self {
        let now = Utc::now();
        Self {
            hostname,
            dialect: SelectorDialect::Css,
            price_selector: None,
            uvp_selector: None,
            seller_selector: None,
            availability_selector: None,
            name_selector: None,
            image_selector: None,
            currency: "EUR".to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}
