//! Price and availability text normalization.

use crate::models::Availability;

/// Parse a scraped price string into a float.
///
/// Handles both decimal conventions: in `1.234,56 €` the dots are
/// thousands separators and the comma is the decimal mark; in
/// `1,299.00` it is the other way around. When both separators are
/// present, the one further right is the decimal mark.
pub fn clean_price(raw: &str) -> Option<f64> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if kept.is_empty() {
        return None;
    }

    let last_dot = kept.rfind('.');
    let last_comma = kept.rfind(',');
    let normalized = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if comma > dot => kept.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => kept.replace(',', ""),
        (None, Some(_)) if kept.matches(',').count() > 1 => kept.replace(',', ""),
        (None, Some(_)) => kept.replace(',', "."),
        // Several dots with no comma: all thousands separators
        (Some(_), None) if kept.matches('.').count() > 1 => kept.replace('.', ""),
        _ => kept,
    };

    normalized.parse::<f64>().ok().filter(|p| p.is_finite())
}

/// Map raw availability text to the canonical classification.
/// Rules are checked in order; the first substring match wins.
pub fn map_availability(raw: &str) -> Availability {
    let text = raw.to_lowercase();

    if text.contains("in stock") || text.contains("available") || text.contains("auf lager") {
        // "unavailable" contains "available"; out-of-stock wording wins
        if !text.contains("unavailable") && !text.contains("not available") {
            return Availability::InStock;
        }
    }
    if text.contains("out of stock")
        || text.contains("unavailable")
        || text.contains("not available")
        || text.contains("ausverkauft")
        || text.contains("nicht verf\u{fc}gbar")
    {
        return Availability::OutOfStock;
    }
    if text.contains("limited") || text.contains("only") || text.contains("wenige") {
        return Availability::Limited;
    }
    Availability::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_price_european() {
        assert_eq!(clean_price("1.234,56 \u{20ac}"), Some(1234.56));
        assert_eq!(clean_price("19,99"), Some(19.99));
        assert_eq!(clean_price("UVP: 1.599,00 \u{20ac}"), Some(1599.0));
    }

    #[test]
    fn test_clean_price_dot_decimal() {
        assert_eq!(clean_price("$29.99"), Some(29.99));
        assert_eq!(clean_price("USD 1,299.00"), Some(1299.0));
        assert_eq!(clean_price("5"), Some(5.0));
    }

    #[test]
    fn test_clean_price_multiple_dots() {
        // No comma, several dots: thousands separators only
        assert_eq!(clean_price("1.234.567"), Some(1_234_567.0));
    }

    #[test]
    fn test_clean_price_garbage() {
        assert_eq!(clean_price(""), None);
        assert_eq!(clean_price("call for price"), None);
        assert_eq!(clean_price("\u{20ac}"), None);
    }

    #[test]
    fn test_map_availability() {
        assert_eq!(map_availability("In Stock"), Availability::InStock);
        assert_eq!(
            map_availability("Available for immediate dispatch"),
            Availability::InStock
        );
        assert_eq!(map_availability("Out of stock"), Availability::OutOfStock);
        assert_eq!(
            map_availability("Currently unavailable"),
            Availability::OutOfStock
        );
        assert_eq!(
            map_availability("Limited stock remaining"),
            Availability::Limited
        );
        assert_eq!(map_availability("ships in 6 weeks"), Availability::Unknown);
    }

    #[test]
    fn test_map_availability_german() {
        assert_eq!(map_availability("Auf Lager"), Availability::InStock);
        assert_eq!(map_availability("Ausverkauft"), Availability::OutOfStock);
        assert_eq!(
            map_availability("Nur noch wenige St\u{fc}ck"),
            Availability::Limited
        );
    }
}
