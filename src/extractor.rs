//! Per-marketplace extraction.
//!
//! A pure `markup -> ProductRecord` step, modeled as composition rather
//! than per-country inheritance: `MarketplaceExtractor` is a trait with
//! default-method bodies implementing the shared contract, and
//! `GenericExtractor` is a unit struct used for every country until one
//! needs to diverge and override a step.

use crate::models::{ProductRecord, SellerType, StockStatus};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct ExtractError(pub String);

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ExtractError {}

static ASIN_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"/dp/([A-Z0-9]{10})").unwrap(),
        Regex::new(r"/gp/product/([A-Z0-9]{10})").unwrap(),
        Regex::new(r"/gp/aw/d/([A-Z0-9]{10})").unwrap(),
    ]
});

/// Recognize the ten-character product identifier in one of the four
/// URL shapes. Required for any extractor output.
pub fn extract_product_id(url: &str) -> Option<String> {
    for pattern in ASIN_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(url) {
            return Some(caps[1].to_string());
        }
    }

    if let Ok(parsed) = url::Url::parse(url) {
        for (key, value) in parsed.query_pairs() {
            if key.eq_ignore_ascii_case("ASIN") {
                return Some(value.to_string());
            }
        }
    }

    None
}

/// Collapse whitespace runs to a single space and trim. Empty input yields
/// `None` for an empty or all-whitespace result.
pub fn clean_text(text: &str) -> Option<String> {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

/// Strip everything but digits, `.`, `,`, then disambiguate thousands vs.
/// decimal separator the way `_extract_price_value` does: when both appear,
/// whichever comes first is the thousands separator; when only `,` appears,
/// it's a decimal point iff there is exactly one and its fractional group
/// is at most two digits long, otherwise it's a thousands separator.
pub fn parse_price(text: &str) -> Option<f64> {
    let stripped: String = text.chars().filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',').collect();
    if stripped.is_empty() {
        return None;
    }

    let normalized = if stripped.contains(',') && stripped.contains('.') {
        let comma_idx = stripped.find(',').unwrap();
        let dot_idx = stripped.find('.').unwrap();
        if comma_idx < dot_idx {
            stripped.replace(',', "")
        } else {
            stripped.replace('.', "").replace(',', ".")
        }
    } else if stripped.contains(',') {
        let comma_count = stripped.matches(',').count();
        let fractional_len = stripped.rsplit(',').next().map(|s| s.len()).unwrap_or(0);
        if comma_count == 1 && fractional_len <= 2 {
            stripped.replace(',', ".")
        } else {
            stripped.replace(',', "")
        }
    } else {
        stripped
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0)
}

/// First non-empty breadcrumb excluding the literal "back to results" is
/// the category; the last such breadcrumb is the subcategory, unless it
/// duplicates the second-to-last, in which case the second-to-last wins.
/// Falls back to `("General", "General")` when unresolvable.
pub fn breadcrumb_category(crumbs: &[String]) -> (String, String) {
    let filtered: Vec<&String> = crumbs
        .iter()
        .filter(|c| !c.trim().is_empty() && !c.trim().eq_ignore_ascii_case("back to results"))
        .collect();

    if filtered.is_empty() {
        return ("General".to_string(), "General".to_string());
    }

    let category = filtered[0].clone();
    let subcategory = if filtered.len() >= 2 && filtered[filtered.len() - 1] == filtered[filtered.len() - 2] {
        filtered[filtered.len() - 2].clone()
    } else {
        filtered[filtered.len() - 1].clone()
    };

    (category, subcategory)
}

pub fn stock_status(availability_text: &str) -> StockStatus {
    let lower = availability_text.to_lowercase();
    if lower.contains("out of stock") || lower.contains("unavailable") {
        StockStatus::OutOfStock
    } else {
        StockStatus::InStock
    }
}

pub fn seller_type(seller_text: &str) -> Option<SellerType> {
    let lower = seller_text.to_lowercase();
    if lower.contains("amazon") {
        Some(SellerType::MarketplaceFirstParty)
    } else if !lower.trim().is_empty() {
        Some(SellerType::ThirdParty)
    } else {
        None
    }
}

struct Selectors {
    title: Selector,
    brand: Selector,
    price: Selector,
    original_price: Selector,
    breadcrumb: Selector,
    image: Selector,
    rating: Selector,
    review_count: Selector,
    bullet: Selector,
    availability: Selector,
    seller: Selector,
    description: Selector,
}

fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|_| Selector::parse("none-match").unwrap())
}

fn selectors() -> Selectors {
    Selectors {
        title: sel("#productTitle, .product-title, h1[data-asin-title]"),
        brand: sel("#bylineInfo, .product-brand, a#brand"),
        price: sel(".a-price .a-offscreen, .priceblock_ourprice, .priceToPay .a-offscreen"),
        original_price: sel(".a-price.a-text-price .a-offscreen, .priceBlockStrikePriceString"),
        breadcrumb: sel("#wayfinding-breadcrumbs_feature_div li, .breadcrumb li"),
        image: sel("#imgTagWrapperId img, #altImages img, .product-image img"),
        rating: sel("#acrPopover, .a-icon-alt"),
        review_count: sel("#acrCustomerReviewText, .review-count"),
        bullet: sel("#feature-bullets li, .a-list-item"),
        availability: sel("#availability, .availability"),
        seller: sel("#sellerProfileTriggerId, .seller-name, #merchant-info"),
        description: sel("#productDescription, .product-description"),
    }
}

fn first_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector).next().map(|el| el.text().collect::<Vec<_>>().join(" "))
}

fn all_texts(doc: &Html, selector: &Selector) -> Vec<String> {
    doc.select(selector)
        .filter_map(|el| clean_text(&el.text().collect::<Vec<_>>().join(" ")))
        .collect()
}

/// Shared extraction contract with per-country override points.
/// The default methods implement the generic Amazon markup layout; a
/// country-specific implementor overrides only the steps its marketplace's
/// markup diverges on.
pub trait MarketplaceExtractor: Send + Sync {
    fn country_code(&self) -> &'static str;
    fn currency(&self) -> &'static str;
    fn currency_code(&self) -> &'static str;

    fn extract(&self, url: &str, markup: &str) -> Result<ProductRecord, ExtractError> {
        let product_id = extract_product_id(url)
            .ok_or_else(|| ExtractError("Invalid Amazon URL - ASIN not found".to_string()))?;

        let doc = Html::parse_document(markup);
        let s = selectors();

        let title = first_text(&doc, &s.title)
            .and_then(|t| clean_text(&t))
            .map(|t| truncate_chars(&t, 500))
            .unwrap_or_default();

        let brand = first_text(&doc, &s.brand)
            .and_then(|t| clean_text(&t))
            .map(|t| truncate_chars(&t, 100));

        let current_price = first_text(&doc, &s.price).and_then(|t| parse_price(&t));
        let original_price = first_text(&doc, &s.original_price).and_then(|t| parse_price(&t));

        let crumbs = all_texts(&doc, &s.breadcrumb);
        let (category, subcategory) = breadcrumb_category(&crumbs);
        let category = truncate_chars(&category, 100);
        let subcategory = truncate_chars(&subcategory, 100);

        let mut image_urls: Vec<String> = doc
            .select(&s.image)
            .filter_map(|el| el.value().attr("src").map(|s| s.to_string()))
            .take(10)
            .collect();
        let primary_image_url = if image_urls.is_empty() { None } else { Some(image_urls.remove(0)) };

        let rating = first_text(&doc, &s.rating).and_then(|t| {
            t.split_whitespace().next().and_then(|n| n.parse::<f64>().ok())
        });

        let review_count = first_text(&doc, &s.review_count)
            .map(|t| t.chars().filter(|c| c.is_ascii_digit()).collect::<String>())
            .and_then(|digits| digits.parse::<u32>().ok())
            .unwrap_or(0);

        let bullet_points: Vec<String> = all_texts(&doc, &s.bullet).into_iter().take(10).collect();

        let availability = first_text(&doc, &s.availability).unwrap_or_default();
        let stock = stock_status(&availability);

        let seller_text = first_text(&doc, &s.seller).unwrap_or_default();
        let seller_kind = seller_type(&seller_text);

        let description = first_text(&doc, &s.description)
            .and_then(|t| clean_text(&t))
            .map(|t| truncate_chars(&t, 2000))
            .unwrap_or_default();

        Ok(ProductRecord {
            product_id,
            merchant: "Amazon".to_string(),
            title,
            brand,
            category,
            subcategory,
            current_price,
            original_price,
            currency: self.currency().to_string(),
            currency_code: self.currency_code().to_string(),
            stock_status: stock,
            primary_image_url,
            image_urls,
            rating,
            review_count,
            bullet_points,
            variations: Vec::new(),
            delivery_eta: None,
            seller: if seller_text.trim().is_empty() {
                None
            } else {
                Some(crate::models::Seller {
                    name: seller_text,
                    fulfilled_by_marketplace: seller_kind == Some(SellerType::MarketplaceFirstParty),
                })
            },
            offers_count: None,
            buy_box_winner: None,
            seller_type: seller_kind,
            description,
            specifications: BTreeMap::new(),
        })
    }
}

/// The default extractor, used for every marketplace until one needs a
/// country-specific override.
pub struct GenericExtractor {
    pub country_code: &'static str,
    pub currency: &'static str,
    pub currency_code: &'static str,
}

impl MarketplaceExtractor for GenericExtractor {
    fn country_code(&self) -> &'static str {
        self.country_code
    }

    fn currency(&self) -> &'static str {
        self.currency
    }

    fn currency_code(&self) -> &'static str {
        self.currency_code
    }
}

/// Build the extractor for a country, by table lookup against the
/// configured marketplaces.
pub fn extractor_for(country_code: &str) -> Option<GenericExtractor> {
    crate::config::marketplace_by_code(country_code).map(|m| GenericExtractor {
        country_code: m.country_code,
        currency: m.currency,
        currency_code: m.currency_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_asin_from_dp_path() {
        assert_eq!(extract_product_id("https://www.amazon.com/Some-Title/dp/B0F83HTPM2/ref=x"), Some("B0F83HTPM2".to_string()));
    }

    #[test]
    fn extracts_asin_from_gp_product_path() {
        assert_eq!(extract_product_id("https://www.amazon.co.uk/gp/product/B0F83HTPM2"), Some("B0F83HTPM2".to_string()));
    }

    #[test]
    fn extracts_asin_from_mobile_path() {
        assert_eq!(extract_product_id("https://www.amazon.in/gp/aw/d/B0F83HTPM2"), Some("B0F83HTPM2".to_string()));
    }

    #[test]
    fn extracts_asin_from_query_param() {
        assert_eq!(extract_product_id("https://www.amazon.com/s?ASIN=B0F83HTPM2"), Some("B0F83HTPM2".to_string()));
    }

    #[test]
    fn no_asin_returns_none() {
        assert_eq!(extract_product_id("https://www.amazon.com/s?k=shoes"), None);
    }

    #[test]
    fn price_disambiguates_us_style_thousands() {
        assert_eq!(parse_price("$1,234.56"), Some(1234.56));
    }

    #[test]
    fn price_disambiguates_eu_style_decimal_comma() {
        assert_eq!(parse_price("1.234,56 €"), Some(1234.56));
    }

    #[test]
    fn price_disambiguates_comma_only_decimal() {
        assert_eq!(parse_price("19,99"), Some(19.99));
    }

    #[test]
    fn price_disambiguates_comma_only_thousands() {
        assert_eq!(parse_price("1,234"), Some(1234.0));
    }

    #[test]
    fn price_empty_returns_none() {
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  hello\n  world  "), Some("hello world".to_string()));
    }

    #[test]
    fn clean_text_empty_is_none() {
        assert_eq!(clean_text("   "), None);
    }

    #[test]
    fn breadcrumb_skips_back_to_results() {
        let crumbs = vec!["Back to results".to_string(), "Electronics".to_string(), "Computers".to_string()];
        assert_eq!(breadcrumb_category(&crumbs), ("Electronics".to_string(), "Computers".to_string()));
    }

    #[test]
    fn breadcrumb_collapses_duplicate_last() {
        let crumbs = vec!["Electronics".to_string(), "Computers".to_string(), "Computers".to_string()];
        assert_eq!(breadcrumb_category(&crumbs), ("Electronics".to_string(), "Computers".to_string()));
    }

    #[test]
    fn breadcrumb_falls_back_to_general() {
        let crumbs: Vec<String> = vec![];
        assert_eq!(breadcrumb_category(&crumbs), ("General".to_string(), "General".to_string()));
    }

    #[test]
    fn stock_status_detects_out_of_stock() {
        assert_eq!(stock_status("Currently unavailable"), StockStatus::OutOfStock);
        assert_eq!(stock_status("Temporarily out of stock"), StockStatus::OutOfStock);
        assert_eq!(stock_status("In Stock"), StockStatus::InStock);
    }

    #[test]
    fn seller_type_detects_marketplace_first_party() {
        assert_eq!(seller_type("Ships from and sold by Amazon.com"), Some(SellerType::MarketplaceFirstParty));
        assert_eq!(seller_type("Sold by ACME Traders"), Some(SellerType::ThirdParty));
        assert_eq!(seller_type(""), None);
    }
}
