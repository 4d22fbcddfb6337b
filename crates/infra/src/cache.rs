//! Memoised price resolution.
//!
//! Keys carry the query time rounded down to the configured granularity, and
//! callers resolve at that rounded time, so a hit and a miss always agree.
//!
//! Each product carries a generation that every invalidation bumps. A reader
//! takes the generation before loading pricing data and passes it back on
//! insert; if a mutation landed in between, the stale result is not stored.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use merchledger_core::{ProductId, TenantId};
use merchledger_pricing::PriceBreakdown;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PriceCacheKey {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub member_level: Option<String>,
    pub bucket: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<PriceCacheKey, PriceBreakdown>,
    generations: HashMap<(TenantId, ProductId), u64>,
}

impl CacheState {
    fn generation(&self, tenant_id: TenantId, product_id: ProductId) -> u64 {
        self.generations.get(&(tenant_id, product_id)).copied().unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct PriceCache {
    /// Seconds per bucket; `0` disables caching.
    granularity_secs: i64,
    capacity: usize,
    state: RwLock<CacheState>,
}

impl PriceCache {
    pub fn new(granularity_secs: u64, capacity: usize) -> Self {
        Self {
            granularity_secs: i64::try_from(granularity_secs).unwrap_or(i64::MAX),
            capacity: capacity.max(1),
            state: RwLock::new(CacheState::default()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(0, 1)
    }

    pub fn is_enabled(&self) -> bool {
        self.granularity_secs > 0
    }

    /// Round `at` down to the start of its bucket (whole seconds when disabled).
    pub fn bucket(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        if !self.is_enabled() {
            return at;
        }
        let ts = at.timestamp();
        let floored = ts - ts.rem_euclid(self.granularity_secs);
        DateTime::from_timestamp(floored, 0).unwrap_or(at)
    }

    pub fn get(&self, key: &PriceCacheKey) -> Option<PriceBreakdown> {
        if !self.is_enabled() {
            return None;
        }
        let state = self.state.read().ok()?;
        state.entries.get(key).cloned()
    }

    /// Current generation of one product. Take it before reading pricing data.
    pub fn generation(&self, tenant_id: TenantId, product_id: ProductId) -> u64 {
        self.state
            .read()
            .map(|state| state.generation(tenant_id, product_id))
            .unwrap_or(0)
    }

    /// Insert a price resolved from data read at `generation`.
    ///
    /// Returns false when the product was invalidated since, or caching is off.
    /// A full cache is cleared first.
    pub fn insert(&self, key: PriceCacheKey, value: PriceBreakdown, generation: u64) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let Ok(mut state) = self.state.write() else {
            return false;
        };
        if state.generation(key.tenant_id, key.product_id) != generation {
            return false;
        }
        if state.entries.len() >= self.capacity {
            state.entries.clear();
        }
        state.entries.insert(key, value);
        true
    }

    /// Drop every entry of one product and bump its generation. Called on any
    /// rule or promotion change.
    pub fn invalidate_product(&self, tenant_id: TenantId, product_id: ProductId) {
        if let Ok(mut state) = self.state.write() {
            *state.generations.entry((tenant_id, product_id)).or_default() += 1;
            state
                .entries
                .retain(|k, _| !(k.tenant_id == tenant_id && k.product_id == product_id));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut state) = self.state.write() {
            state.entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|state| state.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn breakdown(product_id: ProductId, at: DateTime<Utc>) -> PriceBreakdown {
        PriceBreakdown {
            product_id,
            quantity: 1,
            member_level: None,
            at,
            currency: "USD".to_string(),
            base_price: Decimal::ONE_HUNDRED,
            effective_price: Decimal::ONE_HUNDRED,
            discount_amount: Decimal::ZERO,
            applied_rules: Vec::new(),
        }
    }

    fn key(tenant_id: TenantId, product_id: ProductId, bucket: DateTime<Utc>) -> PriceCacheKey {
        PriceCacheKey {
            tenant_id,
            product_id,
            quantity: 1,
            member_level: None,
            bucket,
        }
    }

    #[test]
    fn buckets_round_down() {
        let cache = PriceCache::new(60, 10);
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 10, 15, 42).unwrap();
        assert_eq!(cache.bucket(at), Utc.with_ymd_and_hms(2024, 1, 1, 10, 15, 0).unwrap());
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let cache = PriceCache::disabled();
        let (tenant, product) = (TenantId::new(), ProductId::new());
        let at = Utc::now();
        assert!(!cache.insert(key(tenant, product, at), breakdown(product, at), 0));
        assert!(cache.get(&key(tenant, product, at)).is_none());
        assert_eq!(cache.bucket(at), at);
    }

    #[test]
    fn invalidation_is_per_product() {
        let cache = PriceCache::new(60, 10);
        let tenant = TenantId::new();
        let (a, b) = (ProductId::new(), ProductId::new());
        let at = cache.bucket(Utc::now());
        cache.insert(key(tenant, a, at), breakdown(a, at), 0);
        cache.insert(key(tenant, b, at), breakdown(b, at), 0);

        cache.invalidate_product(tenant, a);
        assert!(cache.get(&key(tenant, a, at)).is_none());
        assert!(cache.get(&key(tenant, b, at)).is_some());
    }

    #[test]
    fn full_cache_is_cleared_before_insert() {
        let cache = PriceCache::new(60, 2);
        let tenant = TenantId::new();
        let at = cache.bucket(Utc::now());
        for _ in 0..3 {
            let p = ProductId::new();
            cache.insert(key(tenant, p, at), breakdown(p, at), 0);
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn insert_from_before_an_invalidation_is_dropped() {
        let cache = PriceCache::new(60, 10);
        let tenant = TenantId::new();
        let (a, b) = (ProductId::new(), ProductId::new());
        let at = cache.bucket(Utc::now());

        let read_at = cache.generation(tenant, a);
        let other_read_at = cache.generation(tenant, b);
        cache.invalidate_product(tenant, a);

        assert!(!cache.insert(key(tenant, a, at), breakdown(a, at), read_at));
        assert!(cache.get(&key(tenant, a, at)).is_none());
        assert!(cache.insert(key(tenant, b, at), breakdown(b, at), other_read_at));

        let fresh = cache.generation(tenant, a);
        assert_eq!(fresh, read_at + 1);
        assert!(cache.insert(key(tenant, a, at), breakdown(a, at), fresh));
        assert!(cache.get(&key(tenant, a, at)).is_some());
    }
}
