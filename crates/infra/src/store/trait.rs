use std::sync::Arc;

use chrono::{DateTime, Utc};

use merchledger_core::{PricingRuleId, ProductId, PromotionId, ReservationId, TenantId};
use merchledger_inventory::{ProductInventory, Reservation, ReservationReference};
use merchledger_pricing::{PricingRule, PromotionalPrice, RightsRule};

use crate::error::StoreError;

/// Inventory rows, one per `(tenant, product)`.
///
/// Callers serialize writes per product; implementations only need to make
/// each call atomic.
pub trait InventoryStore: Send + Sync {
    /// Fails with `StoreError::Duplicate` if the row exists.
    fn insert(&self, row: &ProductInventory) -> Result<(), StoreError>;

    fn get(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Option<ProductInventory>, StoreError>;

    /// Overwrite an existing row.
    fn save(&self, row: &ProductInventory) -> Result<(), StoreError>;

    fn list(&self, tenant_id: TenantId) -> Result<Vec<ProductInventory>, StoreError>;
}

/// Reservation records scoped by tenant.
pub trait ReservationStore: Send + Sync {
    fn insert(&self, reservation: &Reservation) -> Result<(), StoreError>;

    fn update(&self, reservation: &Reservation) -> Result<(), StoreError>;

    fn get(&self, tenant_id: TenantId, id: ReservationId) -> Result<Option<Reservation>, StoreError>;

    /// Returns whether a record was removed.
    fn delete(&self, tenant_id: TenantId, id: ReservationId) -> Result<bool, StoreError>;

    fn list(&self, tenant_id: TenantId) -> Result<Vec<Reservation>, StoreError>;

    fn get_active_by_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Vec<Reservation>, StoreError>;

    fn get_by_reference(
        &self,
        tenant_id: TenantId,
        reference: &ReservationReference,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Active reservations with `expires_at <= now` across all tenants, oldest
    /// deadline first, at most `limit`.
    fn get_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Reservation>, StoreError>;

    /// Sum of `reserved_quantity` over active reservations that hold stock.
    fn sum_active_reserved_quantity(&self, tenant_id: TenantId, product_id: ProductId) -> Result<i64, StoreError>;
}

/// Pricing rules, promotional windows and rights rules.
pub trait PricingRepository: Send + Sync {
    fn insert_rule(&self, rule: &PricingRule) -> Result<(), StoreError>;

    fn update_rule(&self, rule: &PricingRule) -> Result<(), StoreError>;

    fn get_rule(&self, tenant_id: TenantId, id: PricingRuleId) -> Result<Option<PricingRule>, StoreError>;

    fn delete_rule(&self, tenant_id: TenantId, id: PricingRuleId) -> Result<bool, StoreError>;

    /// Every rule of the product, active or not.
    fn list_rules(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Vec<PricingRule>, StoreError>;

    /// Active rules across all tenants whose `valid_until <= now`.
    fn list_expired_rules(&self, now: DateTime<Utc>) -> Result<Vec<PricingRule>, StoreError>;

    fn insert_promotion(&self, promotion: &PromotionalPrice) -> Result<(), StoreError>;

    fn update_promotion(&self, promotion: &PromotionalPrice) -> Result<(), StoreError>;

    fn get_promotion(&self, tenant_id: TenantId, id: PromotionId) -> Result<Option<PromotionalPrice>, StoreError>;

    fn list_promotions(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Vec<PromotionalPrice>, StoreError>;

    /// Insert or replace the product's rights rule.
    fn put_rights_rule(&self, rule: &RightsRule) -> Result<(), StoreError>;

    fn get_rights_rule(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Option<RightsRule>, StoreError>;

    fn delete_rights_rule(&self, tenant_id: TenantId, product_id: ProductId) -> Result<bool, StoreError>;
}

impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    fn insert(&self, row: &ProductInventory) -> Result<(), StoreError> {
        (**self).insert(row)
    }

    fn get(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Option<ProductInventory>, StoreError> {
        (**self).get(tenant_id, product_id)
    }

    fn save(&self, row: &ProductInventory) -> Result<(), StoreError> {
        (**self).save(row)
    }

    fn list(&self, tenant_id: TenantId) -> Result<Vec<ProductInventory>, StoreError> {
        (**self).list(tenant_id)
    }
}

impl<S> ReservationStore for Arc<S>
where
    S: ReservationStore + ?Sized,
{
    fn insert(&self, reservation: &Reservation) -> Result<(), StoreError> {
        (**self).insert(reservation)
    }

    fn update(&self, reservation: &Reservation) -> Result<(), StoreError> {
        (**self).update(reservation)
    }

    fn get(&self, tenant_id: TenantId, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        (**self).get(tenant_id, id)
    }

    fn delete(&self, tenant_id: TenantId, id: ReservationId) -> Result<bool, StoreError> {
        (**self).delete(tenant_id, id)
    }

    fn list(&self, tenant_id: TenantId) -> Result<Vec<Reservation>, StoreError> {
        (**self).list(tenant_id)
    }

    fn get_active_by_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Vec<Reservation>, StoreError> {
        (**self).get_active_by_product(tenant_id, product_id)
    }

    fn get_by_reference(
        &self,
        tenant_id: TenantId,
        reference: &ReservationReference,
    ) -> Result<Vec<Reservation>, StoreError> {
        (**self).get_by_reference(tenant_id, reference)
    }

    fn get_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Reservation>, StoreError> {
        (**self).get_expired(now, limit)
    }

    fn sum_active_reserved_quantity(&self, tenant_id: TenantId, product_id: ProductId) -> Result<i64, StoreError> {
        (**self).sum_active_reserved_quantity(tenant_id, product_id)
    }
}

impl<S> PricingRepository for Arc<S>
where
    S: PricingRepository + ?Sized,
{
    fn insert_rule(&self, rule: &PricingRule) -> Result<(), StoreError> {
        (**self).insert_rule(rule)
    }

    fn update_rule(&self, rule: &PricingRule) -> Result<(), StoreError> {
        (**self).update_rule(rule)
    }

    fn get_rule(&self, tenant_id: TenantId, id: PricingRuleId) -> Result<Option<PricingRule>, StoreError> {
        (**self).get_rule(tenant_id, id)
    }

    fn delete_rule(&self, tenant_id: TenantId, id: PricingRuleId) -> Result<bool, StoreError> {
        (**self).delete_rule(tenant_id, id)
    }

    fn list_rules(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Vec<PricingRule>, StoreError> {
        (**self).list_rules(tenant_id, product_id)
    }

    fn list_expired_rules(&self, now: DateTime<Utc>) -> Result<Vec<PricingRule>, StoreError> {
        (**self).list_expired_rules(now)
    }

    fn insert_promotion(&self, promotion: &PromotionalPrice) -> Result<(), StoreError> {
        (**self).insert_promotion(promotion)
    }

    fn update_promotion(&self, promotion: &PromotionalPrice) -> Result<(), StoreError> {
        (**self).update_promotion(promotion)
    }

    fn get_promotion(&self, tenant_id: TenantId, id: PromotionId) -> Result<Option<PromotionalPrice>, StoreError> {
        (**self).get_promotion(tenant_id, id)
    }

    fn list_promotions(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Vec<PromotionalPrice>, StoreError> {
        (**self).list_promotions(tenant_id, product_id)
    }

    fn put_rights_rule(&self, rule: &RightsRule) -> Result<(), StoreError> {
        (**self).put_rights_rule(rule)
    }

    fn get_rights_rule(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Option<RightsRule>, StoreError> {
        (**self).get_rights_rule(tenant_id, product_id)
    }

    fn delete_rights_rule(&self, tenant_id: TenantId, product_id: ProductId) -> Result<bool, StoreError> {
        (**self).delete_rights_rule(tenant_id, product_id)
    }
}
