//! TTL cache with lazy purge and bounded eviction.
//!
//! A single lock guards both the purge and the operation it accompanies,
//! so a purge never races a concurrent read of the same key.

use crate::models::{CacheEntry, Fingerprint, ProductRecord};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub struct TtlCache {
    ttl: Duration,
    max_items: usize,
    store: Mutex<HashMap<Fingerprint, CacheEntry>>,
}

impl TtlCache {
    pub fn new(ttl: Duration, max_items: usize) -> Self {
        Self {
            ttl,
            max_items,
            store: Mutex::new(HashMap::new()),
        }
    }

    /// Drop expired entries, then evict oldest-by-expiry entries until at
    /// or below `max_items`. Caller must hold the lock.
    fn purge_locked(&self, store: &mut HashMap<Fingerprint, CacheEntry>) {
        let now = Instant::now();
        store.retain(|_, entry| entry.expires_at >= now);

        if store.len() > self.max_items {
            let mut by_expiry: Vec<(Fingerprint, Instant)> =
                store.iter().map(|(k, v)| (k.clone(), v.expires_at)).collect();
            by_expiry.sort_by_key(|(_, expiry)| *expiry);

            let overflow = store.len() - self.max_items;
            for (key, _) in by_expiry.into_iter().take(overflow) {
                store.remove(&key);
            }
        }
    }

    pub async fn get(&self, key: &Fingerprint) -> Option<ProductRecord> {
        let mut store = self.store.lock().await;
        self.purge_locked(&mut store);
        store.get(key).map(|entry| entry.value.clone())
    }

    pub async fn set(&self, key: Fingerprint, value: ProductRecord) {
        let mut store = self.store.lock().await;
        self.purge_locked(&mut store);
        store.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub async fn size(&self) -> usize {
        let mut store = self.store.lock().await;
        self.purge_locked(&mut store);
        store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SellerType, StockStatus};
    use std::collections::BTreeMap;

    fn sample_record(id: &str) -> ProductRecord {
        ProductRecord {
            product_id: id.to_string(),
            merchant: "Amazon".to_string(),
            title: "Test Product".to_string(),
            brand: None,
            category: "General".to_string(),
            subcategory: "General".to_string(),
            current_price: Some(9.99),
            original_price: None,
            currency: "$".to_string(),
            currency_code: "USD".to_string(),
            stock_status: StockStatus::InStock,
            primary_image_url: None,
            image_urls: Vec::new(),
            rating: None,
            review_count: 0,
            bullet_points: Vec::new(),
            variations: Vec::new(),
            delivery_eta: None,
            seller: None,
            offers_count: None,
            buy_box_winner: None,
            seller_type: Some(SellerType::ThirdParty),
            description: String::new(),
            specifications: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn set_then_get_within_ttl_returns_value() {
        let cache = TtlCache::new(Duration::from_secs(300), 1000);
        let key = Fingerprint::new("US", "B0F83HTPM2");
        cache.set(key.clone(), sample_record("B0F83HTPM2")).await;

        let got = cache.get(&key).await;
        assert!(got.is_some());
        assert_eq!(got.unwrap().product_id, "B0F83HTPM2");
    }

    #[tokio::test]
    async fn expired_entry_is_not_returned() {
        let cache = TtlCache::new(Duration::from_millis(10), 1000);
        let key = Fingerprint::new("US", "B0F83HTPM2");
        cache.set(key.clone(), sample_record("B0F83HTPM2")).await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn eviction_keeps_size_at_bound() {
        let cache = TtlCache::new(Duration::from_secs(300), 2);
        cache.set(Fingerprint::new("US", "AAAAAAAAAA"), sample_record("AAAAAAAAAA")).await;
        cache.set(Fingerprint::new("US", "BBBBBBBBBB"), sample_record("BBBBBBBBBB")).await;
        cache.set(Fingerprint::new("US", "CCCCCCCCCC"), sample_record("CCCCCCCCCC")).await;

        assert_eq!(cache.size().await, 2);
    }
}
