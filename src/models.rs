//! Data model shared across the dispatcher, browser manager, extractors and
//! the HTTP surface.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// The cache / dedup key: a marketplace plus a product identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub country_code: String,
    pub product_id: String,
}

impl Fingerprint {
    pub fn new(country_code: impl Into<String>, product_id: impl Into<String>) -> Self {
        Self {
            country_code: country_code.into(),
            product_id: product_id.into(),
        }
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.country_code, self.product_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    OutOfStock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SellerType {
    MarketplaceFirstParty,
    ThirdParty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seller {
    pub name: String,
    pub fulfilled_by_marketplace: bool,
}

/// Normalized product record emitted by a successful scrape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_id: String,
    pub merchant: String,
    pub title: String,
    pub brand: Option<String>,
    pub category: String,
    pub subcategory: String,
    pub current_price: Option<f64>,
    pub original_price: Option<f64>,
    pub currency: String,
    pub currency_code: String,
    pub stock_status: StockStatus,
    pub primary_image_url: Option<String>,
    pub image_urls: Vec<String>,
    pub rating: Option<f64>,
    pub review_count: u32,
    pub bullet_points: Vec<String>,
    pub variations: Vec<String>,
    pub delivery_eta: Option<String>,
    pub seller: Option<Seller>,
    pub offers_count: Option<u32>,
    pub buy_box_winner: Option<bool>,
    pub seller_type: Option<SellerType>,
    pub description: String,
    pub specifications: BTreeMap<String, String>,
}

/// An inbound scrape request as parsed from the HTTP body.
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub url: String,
    pub headless: Option<bool>,
    pub proxy: Option<String>,
    pub api_key: String,
    pub client_ip: String,
}

/// Failure kinds for a scrape attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    Captcha,
    Timeout,
    RenderError,
    UpstreamError,
}

#[derive(Debug, Clone)]
pub struct ScrapeFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ScrapeFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

/// Cache entry: a value plus its absolute expiry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: ProductRecord,
    pub expires_at: Instant,
}

/// Outcome of running the pipeline for one task, as returned to the
/// dispatcher's caller.
#[derive(Debug, Clone)]
pub enum ScrapeOutcome {
    Success { record: ProductRecord, cached: bool },
    Failure(ScrapeFailure),
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let secs = 2u64.saturating_pow(attempt.saturating_sub(1) as u32);
        Duration::from_secs(secs).min(self.max_delay)
    }
}
