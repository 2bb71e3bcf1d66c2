//! Field extraction from product pages.

use scraper::{Html, Selector};
use tracing::debug;

use super::normalize::{clean_price, map_availability};
use crate::models::{Availability, SelectorDialect, SiteConfig};

/// Fields pulled out of one product page.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub price_raw: Option<String>,
    pub price: Option<f64>,
    pub uvp_raw: Option<String>,
    pub uvp: Option<f64>,
    pub seller: Option<String>,
    /// Raw availability text.
    pub site_status: Option<String>,
    pub availability: Availability,
    pub name: Option<String>,
    pub image_url: Option<String>,
}

/// Extract all configured fields from a page.
pub fn extract(html: &str, config: &SiteConfig) -> Extraction {
    let document = Html::parse_document(html);

    let price_raw = select_text(&document, config, config.price_selector.as_deref());
    let uvp_raw = select_text(&document, config, config.uvp_selector.as_deref());
    let site_status = select_text(&document, config, config.availability_selector.as_deref());

    let extraction = Extraction {
        price: price_raw.as_deref().and_then(clean_price),
        uvp: uvp_raw.as_deref().and_then(clean_price),
        price_raw,
        uvp_raw,
        seller: select_text(&document, config, config.seller_selector.as_deref()),
        availability: site_status
            .as_deref()
            .map(map_availability)
            .unwrap_or(Availability::Unknown),
        site_status,
        name: select_text(&document, config, config.name_selector.as_deref()),
        image_url: select_image(&document, config, config.image_selector.as_deref()),
    };

    debug!(
        hostname = %config.hostname,
        price = ?extraction.price,
        name = ?extraction.name,
        "extraction finished"
    );
    extraction
}

/// Trimmed text of the first element matching the selector.
fn select_text(document: &Html, config: &SiteConfig, selector: Option<&str>) -> Option<String> {
    let selector = compile(config, selector?)?;
    let element = document.select(&selector).next()?;
    let text: String = element.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

/// Image URL: prefer the src/content attribute, fall back to text.
fn select_image(document: &Html, config: &SiteConfig, selector: Option<&str>) -> Option<String> {
    let selector = compile(config, selector?)?;
    let element = document.select(&selector).next()?;
    for attr in ["src", "content", "data-src", "href"] {
        if let Some(value) = element.value().attr(attr) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    let text: String = element.text().collect::<String>().trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn compile(config: &SiteConfig, raw: &str) -> Option<Selector> {
    let css = match config.dialect {
        SelectorDialect::Css => raw.to_string(),
        SelectorDialect::Simple => simple_to_css(raw)?,
    };
    // The parse error borrows `css`; log it inside map_err so nothing
    // borrowed outlives the local
    Selector::parse(&css)
        .map_err(|e| debug!(selector = raw, error = %e, "invalid selector, field skipped"))
        .ok()
}

/// Translate the reduced selector dialect to CSS. Supported forms are
/// `tag`, `.class`, `#id`, and `tag.class`; anything else yields `None`.
fn simple_to_css(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.contains(char::is_whitespace) {
        return None;
    }

    let valid_ident =
        |s: &str| !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_');

    if let Some(class) = raw.strip_prefix('.') {
        return valid_ident(class).then(|| format!(".{class}"));
    }
    if let Some(id) = raw.strip_prefix('#') {
        return valid_ident(id).then(|| format!("#{id}"));
    }
    if let Some((tag, class)) = raw.split_once('.') {
        return (valid_ident(tag) && valid_ident(class)).then(|| format!("{tag}.{class}"));
    }
    valid_ident(raw).then(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><head><title>Widget Deluxe</title></head><body>
            <h1 class="product-title">Widget Deluxe 3000</h1>
            <div class="price"><span class="price__amount">1.234,56 &euro;</span></div>
            <del class="price__uvp">1.599,00 &euro;</del>
            <div class="seller">Sold by <a>MegaShop GmbH</a></div>
            <span class="stock">In stock, ships tomorrow</span>
            <img id="main-image" src="https://cdn.example.com/widget.jpg">
        </body></html>
    "#;

    fn config() -> SiteConfig {
        let mut config = SiteConfig::new("shop.example.com".into());
        config.price_selector = Some(".price__amount".into());
        config.uvp_selector = Some(".price__uvp".into());
        config.seller_selector = Some(".seller".into());
        config.availability_selector = Some(".stock".into());
        config.name_selector = Some("h1.product-title".into());
        config.image_selector = Some("#main-image".into());
        config
    }

    #[test]
    fn test_extracts_all_fields() {
        let extraction = extract(PAGE, &config());

        assert_eq!(extraction.price, Some(1234.56));
        assert_eq!(extraction.uvp, Some(1599.0));
        assert_eq!(extraction.seller.as_deref(), Some("Sold by MegaShop GmbH"));
        assert_eq!(extraction.availability, Availability::InStock);
        assert_eq!(extraction.name.as_deref(), Some("Widget Deluxe 3000"));
        assert_eq!(
            extraction.image_url.as_deref(),
            Some("https://cdn.example.com/widget.jpg")
        );
    }

    #[test]
    fn test_unset_selectors_yield_nothing() {
        let config = SiteConfig::new("shop.example.com".into());
        let extraction = extract(PAGE, &config);

        assert!(extraction.price.is_none());
        assert!(extraction.name.is_none());
        assert_eq!(extraction.availability, Availability::Unknown);
    }

    #[test]
    fn test_missing_element_yields_none() {
        let mut config = config();
        config.price_selector = Some(".does-not-exist".into());
        let extraction = extract(PAGE, &config);
        assert!(extraction.price.is_none());
    }

    #[test]
    fn test_simple_dialect() {
        let mut config = config();
        config.dialect = SelectorDialect::Simple;
        config.price_selector = Some(".price__amount".into());
        config.name_selector = Some("h1.product-title".into());
        config.image_selector = Some("#main-image".into());
        let extraction = extract(PAGE, &config);

        assert_eq!(extraction.price, Some(1234.56));
        assert_eq!(extraction.name.as_deref(), Some("Widget Deluxe 3000"));
        assert!(extraction.image_url.is_some());
    }

    #[test]
    fn test_simple_to_css_forms() {
        assert_eq!(simple_to_css("div"), Some("div".into()));
        assert_eq!(simple_to_css(".price"), Some(".price".into()));
        assert_eq!(simple_to_css("#main"), Some("#main".into()));
        assert_eq!(simple_to_css("span.amount"), Some("span.amount".into()));
        // Anything beyond the reduced forms is rejected
        assert_eq!(simple_to_css("div > span"), None);
        assert_eq!(simple_to_css("a[href]"), None);
        assert_eq!(simple_to_css(""), None);
    }

    #[test]
    fn test_invalid_css_selector_is_skipped() {
        let mut config = config();
        config.price_selector = Some(":::garbage".into());
        let extraction = extract(PAGE, &config);
        assert!(extraction.price.is_none());
    }
}
