//! URL health classification.
//!
//! After every scrape the product URL is re-classified from what the
//! page yielded. The rules run in order; the first match wins:
//!
//! 1. no body at all: `Error`, failure counter untouched
//! 2. a price or a name was extracted: `Valid`, counter reset
//! 3. the page is a 404 page: `Invalid`, counter reset
//! 4. full-size page with neither price nor seller: `Invalid`, counter reset
//! 5. suspiciously small page: `Unchecked`, counter incremented (likely
//!    a soft block, worth retrying)
//! 6. out-of-stock or limited availability: `Unchecked`, counter reset
//! 7. anything else: `Unchecked`, counter incremented

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use super::extract::Extraction;
use super::fetch::FetchOutcome;
use crate::config::Settings;
use crate::models::{Availability, UrlStatus};

/// Classification result for one scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub status: UrlStatus,
    pub consecutive_failures: u32,
}

/// How many leading body bytes are searched for 404 phrases.
const BODY_SCAN_BYTES: usize = 2048;

pub fn classify(
    outcome: &FetchOutcome,
    extraction: &Extraction,
    previous_failures: u32,
    settings: &Settings,
) -> Verdict {
    let Some(body) = outcome.body.as_deref() else {
        return Verdict {
            status: UrlStatus::Error,
            consecutive_failures: previous_failures,
        };
    };

    let verdict = classify_body(body, extraction, previous_failures, settings);
    debug!(
        status = verdict.status.as_str(),
        failures = verdict.consecutive_failures,
        "url classified"
    );
    verdict
}

fn classify_body(
    body: &str,
    extraction: &Extraction,
    previous_failures: u32,
    settings: &Settings,
) -> Verdict {
    if extraction.price.is_some() || extraction.name.is_some() {
        return Verdict {
            status: UrlStatus::Valid,
            consecutive_failures: 0,
        };
    }

    if is_404_page(body, &settings.not_found_markers) {
        return Verdict {
            status: UrlStatus::Invalid,
            consecutive_failures: 0,
        };
    }

    let full_size = body.len() >= settings.soft_block_threshold;
    if full_size && extraction.seller.is_none() {
        // A complete page that yields nothing is no longer a product page
        return Verdict {
            status: UrlStatus::Invalid,
            consecutive_failures: 0,
        };
    }

    if !full_size {
        return Verdict {
            status: UrlStatus::Unchecked,
            consecutive_failures: previous_failures + 1,
        };
    }

    if matches!(
        extraction.availability,
        Availability::OutOfStock | Availability::Limited
    ) {
        return Verdict {
            status: UrlStatus::Unchecked,
            consecutive_failures: 0,
        };
    }

    Verdict {
        status: UrlStatus::Unchecked,
        consecutive_failures: previous_failures + 1,
    }
}

/// Detect 404 pages by phrase: the `<title>` is checked in full, the
/// body only in its first couple of kilobytes where error pages state
/// their purpose. Phrases must sit on a word boundary so that e.g. a
/// product id containing "404" does not match.
pub fn is_404_page(body: &str, markers: &[String]) -> bool {
    let lower = body.to_lowercase();

    let title = title_regex()
        .captures(&lower)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let head = safe_prefix(&lower, BODY_SCAN_BYTES);

    for marker in markers {
        let marker = marker.to_lowercase();
        let Ok(bounded) = Regex::new(&format!(
            r"(^|[>\s]){}($|[<\s.,!])",
            regex::escape(&marker)
        )) else {
            continue;
        };
        if bounded.is_match(&title) || bounded.is_match(head) {
            return true;
        }
    }
    false
}

fn title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<title[^>]*>([^<]*)</title>").expect("valid title regex"))
}

/// Byte prefix truncated back to a char boundary.
fn safe_prefix(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(body: &str) -> FetchOutcome {
        FetchOutcome {
            body: Some(body.to_string()),
            tier: Some(super::super::FetchTier::Http),
            challenged: false,
            soft_blocked: false,
        }
    }

    fn settings() -> Settings {
        Settings::default()
    }

    #[test]
    fn test_no_body_is_error() {
        let outcome = FetchOutcome {
            body: None,
            tier: None,
            challenged: true,
            soft_blocked: false,
        };
        let verdict = classify(&outcome, &Extraction::default(), 3, &settings());
        assert_eq!(verdict.status, UrlStatus::Error);
        assert_eq!(verdict.consecutive_failures, 3);
    }

    #[test]
    fn test_price_means_valid() {
        let extraction = Extraction {
            price: Some(19.99),
            ..Extraction::default()
        };
        let body = "x".repeat(60_000);
        let verdict = classify(&outcome(&body), &extraction, 5, &settings());
        assert_eq!(verdict.status, UrlStatus::Valid);
        assert_eq!(verdict.consecutive_failures, 0);
    }

    #[test]
    fn test_name_alone_means_valid() {
        let extraction = Extraction {
            name: Some("Widget".into()),
            ..Extraction::default()
        };
        let verdict = classify(&outcome("<html></html>"), &extraction, 2, &settings());
        assert_eq!(verdict.status, UrlStatus::Valid);
    }

    #[test]
    fn test_404_title_means_invalid() {
        let body = format!(
            "<html><head><title>Page not found</title></head><body>{}</body></html>",
            "x".repeat(60_000)
        );
        let verdict = classify(&outcome(&body), &Extraction::default(), 2, &settings());
        assert_eq!(verdict.status, UrlStatus::Invalid);
        assert_eq!(verdict.consecutive_failures, 0);
    }

    #[test]
    fn test_full_page_without_data_is_invalid() {
        let body = format!("<html><body>{}</body></html>", "x".repeat(60_000));
        let verdict = classify(&outcome(&body), &Extraction::default(), 0, &settings());
        assert_eq!(verdict.status, UrlStatus::Invalid);
    }

    #[test]
    fn test_small_page_increments_failures() {
        let body = "<html><body>checking your browser</body></html>";
        let verdict = classify(&outcome(body), &Extraction::default(), 2, &settings());
        assert_eq!(verdict.status, UrlStatus::Unchecked);
        assert_eq!(verdict.consecutive_failures, 3);
    }

    #[test]
    fn test_out_of_stock_resets_failures() {
        let extraction = Extraction {
            seller: Some("MegaShop".into()),
            availability: Availability::OutOfStock,
            ..Extraction::default()
        };
        let body = "x".repeat(60_000);
        let verdict = classify(&outcome(&body), &extraction, 4, &settings());
        assert_eq!(verdict.status, UrlStatus::Unchecked);
        assert_eq!(verdict.consecutive_failures, 0);
    }

    #[test]
    fn test_404_marker_needs_word_boundary() {
        // "404" embedded in an identifier must not match
        let body = format!(
            "<html><body>sku-404-deluxe {}</body></html>",
            "x".repeat(60_000)
        );
        let extraction = Extraction {
            seller: Some("MegaShop".into()),
            ..Extraction::default()
        };
        let verdict = classify(&outcome(&body), &extraction, 0, &settings());
        assert_ne!(verdict.status, UrlStatus::Invalid);
    }

    #[test]
    fn test_404_marker_in_body_prefix_only() {
        // Phrase far beyond the scanned prefix is ignored
        let body = format!(
            "<html><body>{} page not found</body></html>",
            "x".repeat(60_000)
        );
        assert!(!is_404_page(&body, &settings().not_found_markers));

        let early = format!(
            "<html><body>Error 404 {}</body></html>",
            "x".repeat(60_000)
        );
        assert!(is_404_page(&early, &settings().not_found_markers));
    }

    #[test]
    fn test_safe_prefix_respects_char_boundaries() {
        let s = "\u{20ac}".repeat(1000);
        let prefix = safe_prefix(&s, 100);
        assert!(prefix.len() <= 100);
        assert!(s.starts_with(prefix));
    }
}
