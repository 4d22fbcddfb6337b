use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use merchledger_core::{PricingRuleId, ProductId, PromotionId, ReservationId, TenantId};
use merchledger_inventory::{ProductInventory, Reservation, ReservationReference};
use merchledger_pricing::{PricingRule, PromotionalPrice, RightsRule};

use super::r#trait::{InventoryStore, PricingRepository, ReservationStore};
use crate::error::StoreError;

/// In-memory inventory rows.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    rows: RwLock<HashMap<(TenantId, ProductId), ProductInventory>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InventoryStore for InMemoryInventoryStore {
    fn insert(&self, row: &ProductInventory) -> Result<(), StoreError> {
        let mut rows = self.rows.write().map_err(|_| StoreError::Poisoned("inventory"))?;
        let key = (row.tenant_id(), row.product_id());
        if rows.contains_key(&key) {
            return Err(StoreError::Duplicate(format!("inventory for product {}", row.product_id())));
        }
        rows.insert(key, row.clone());
        Ok(())
    }

    fn get(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Option<ProductInventory>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::Poisoned("inventory"))?;
        Ok(rows.get(&(tenant_id, product_id)).cloned())
    }

    fn save(&self, row: &ProductInventory) -> Result<(), StoreError> {
        let mut rows = self.rows.write().map_err(|_| StoreError::Poisoned("inventory"))?;
        match rows.get_mut(&(row.tenant_id(), row.product_id())) {
            Some(existing) => {
                *existing = row.clone();
                Ok(())
            }
            None => Err(StoreError::Missing(format!("inventory for product {}", row.product_id()))),
        }
    }

    fn list(&self, tenant_id: TenantId) -> Result<Vec<ProductInventory>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::Poisoned("inventory"))?;
        Ok(rows
            .iter()
            .filter(|((t, _), _)| *t == tenant_id)
            .map(|(_, row)| row.clone())
            .collect())
    }
}

/// In-memory reservation records.
///
/// Scans are linear; fine for tests and modest single-process volumes.
#[derive(Debug, Default)]
pub struct InMemoryReservationStore {
    records: RwLock<HashMap<(TenantId, ReservationId), Reservation>>,
}

impl InMemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn scan<F>(&self, tenant_id: TenantId, keep: F) -> Result<Vec<Reservation>, StoreError>
    where
        F: Fn(&Reservation) -> bool,
    {
        let records = self.records.read().map_err(|_| StoreError::Poisoned("reservations"))?;
        let mut out: Vec<Reservation> = records
            .iter()
            .filter(|((t, _), r)| *t == tenant_id && keep(r))
            .map(|(_, r)| r.clone())
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }
}

impl ReservationStore for InMemoryReservationStore {
    fn insert(&self, reservation: &Reservation) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned("reservations"))?;
        let key = (reservation.tenant_id, reservation.id);
        if records.contains_key(&key) {
            return Err(StoreError::Duplicate(format!("reservation {}", reservation.id)));
        }
        records.insert(key, reservation.clone());
        Ok(())
    }

    fn update(&self, reservation: &Reservation) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned("reservations"))?;
        match records.get_mut(&(reservation.tenant_id, reservation.id)) {
            Some(existing) => {
                *existing = reservation.clone();
                Ok(())
            }
            None => Err(StoreError::Missing(format!("reservation {}", reservation.id))),
        }
    }

    fn get(&self, tenant_id: TenantId, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned("reservations"))?;
        Ok(records.get(&(tenant_id, id)).cloned())
    }

    fn delete(&self, tenant_id: TenantId, id: ReservationId) -> Result<bool, StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned("reservations"))?;
        Ok(records.remove(&(tenant_id, id)).is_some())
    }

    fn list(&self, tenant_id: TenantId) -> Result<Vec<Reservation>, StoreError> {
        self.scan(tenant_id, |_| true)
    }

    fn get_active_by_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Vec<Reservation>, StoreError> {
        self.scan(tenant_id, |r| r.product_id == product_id && r.is_active())
    }

    fn get_by_reference(
        &self,
        tenant_id: TenantId,
        reference: &ReservationReference,
    ) -> Result<Vec<Reservation>, StoreError> {
        self.scan(tenant_id, |r| &r.reference == reference)
    }

    fn get_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Reservation>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned("reservations"))?;
        let mut expired: Vec<Reservation> = records
            .values()
            .filter(|r| r.is_expired_at(now))
            .cloned()
            .collect();
        expired.sort_by(|a, b| a.expires_at.cmp(&b.expires_at).then(a.id.cmp(&b.id)));
        expired.truncate(limit);
        Ok(expired)
    }

    fn sum_active_reserved_quantity(&self, tenant_id: TenantId, product_id: ProductId) -> Result<i64, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned("reservations"))?;
        Ok(records
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.product_id == product_id && r.is_active() && r.holds_stock)
            .map(|r| r.reserved_quantity)
            .sum())
    }
}

/// In-memory pricing data.
#[derive(Debug, Default)]
pub struct InMemoryPricingRepository {
    rules: RwLock<HashMap<(TenantId, PricingRuleId), PricingRule>>,
    promotions: RwLock<HashMap<(TenantId, PromotionId), PromotionalPrice>>,
    rights_rules: RwLock<HashMap<(TenantId, ProductId), RightsRule>>,
}

impl InMemoryPricingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PricingRepository for InMemoryPricingRepository {
    fn insert_rule(&self, rule: &PricingRule) -> Result<(), StoreError> {
        let mut rules = self.rules.write().map_err(|_| StoreError::Poisoned("pricing rules"))?;
        let key = (rule.tenant_id, rule.id);
        if rules.contains_key(&key) {
            return Err(StoreError::Duplicate(format!("pricing rule {}", rule.id)));
        }
        rules.insert(key, rule.clone());
        Ok(())
    }

    fn update_rule(&self, rule: &PricingRule) -> Result<(), StoreError> {
        let mut rules = self.rules.write().map_err(|_| StoreError::Poisoned("pricing rules"))?;
        match rules.get_mut(&(rule.tenant_id, rule.id)) {
            Some(existing) => {
                *existing = rule.clone();
                Ok(())
            }
            None => Err(StoreError::Missing(format!("pricing rule {}", rule.id))),
        }
    }

    fn get_rule(&self, tenant_id: TenantId, id: PricingRuleId) -> Result<Option<PricingRule>, StoreError> {
        let rules = self.rules.read().map_err(|_| StoreError::Poisoned("pricing rules"))?;
        Ok(rules.get(&(tenant_id, id)).cloned())
    }

    fn delete_rule(&self, tenant_id: TenantId, id: PricingRuleId) -> Result<bool, StoreError> {
        let mut rules = self.rules.write().map_err(|_| StoreError::Poisoned("pricing rules"))?;
        Ok(rules.remove(&(tenant_id, id)).is_some())
    }

    fn list_rules(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Vec<PricingRule>, StoreError> {
        let rules = self.rules.read().map_err(|_| StoreError::Poisoned("pricing rules"))?;
        let mut out: Vec<PricingRule> = rules
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.product_id == product_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    fn list_expired_rules(&self, now: DateTime<Utc>) -> Result<Vec<PricingRule>, StoreError> {
        let rules = self.rules.read().map_err(|_| StoreError::Poisoned("pricing rules"))?;
        Ok(rules.values().filter(|r| r.is_expired_at(now)).cloned().collect())
    }

    fn insert_promotion(&self, promotion: &PromotionalPrice) -> Result<(), StoreError> {
        let mut promotions = self.promotions.write().map_err(|_| StoreError::Poisoned("promotions"))?;
        let key = (promotion.tenant_id, promotion.id);
        if promotions.contains_key(&key) {
            return Err(StoreError::Duplicate(format!("promotion {}", promotion.id)));
        }
        promotions.insert(key, promotion.clone());
        Ok(())
    }

    fn update_promotion(&self, promotion: &PromotionalPrice) -> Result<(), StoreError> {
        let mut promotions = self.promotions.write().map_err(|_| StoreError::Poisoned("promotions"))?;
        match promotions.get_mut(&(promotion.tenant_id, promotion.id)) {
            Some(existing) => {
                *existing = promotion.clone();
                Ok(())
            }
            None => Err(StoreError::Missing(format!("promotion {}", promotion.id))),
        }
    }

    fn get_promotion(&self, tenant_id: TenantId, id: PromotionId) -> Result<Option<PromotionalPrice>, StoreError> {
        let promotions = self.promotions.read().map_err(|_| StoreError::Poisoned("promotions"))?;
        Ok(promotions.get(&(tenant_id, id)).cloned())
    }

    fn list_promotions(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Vec<PromotionalPrice>, StoreError> {
        let promotions = self.promotions.read().map_err(|_| StoreError::Poisoned("promotions"))?;
        let mut out: Vec<PromotionalPrice> = promotions
            .values()
            .filter(|p| p.tenant_id == tenant_id && p.product_id == product_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.starts_at.cmp(&b.starts_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    fn put_rights_rule(&self, rule: &RightsRule) -> Result<(), StoreError> {
        let mut rights = self.rights_rules.write().map_err(|_| StoreError::Poisoned("rights rules"))?;
        rights.insert((rule.tenant_id, rule.product_id), rule.clone());
        Ok(())
    }

    fn get_rights_rule(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Option<RightsRule>, StoreError> {
        let rights = self.rights_rules.read().map_err(|_| StoreError::Poisoned("rights rules"))?;
        Ok(rights.get(&(tenant_id, product_id)).cloned())
    }

    fn delete_rights_rule(&self, tenant_id: TenantId, product_id: ProductId) -> Result<bool, StoreError> {
        let mut rights = self.rights_rules.write().map_err(|_| StoreError::Poisoned("rights rules"))?;
        Ok(rights.remove(&(tenant_id, product_id)).is_some())
    }
}
