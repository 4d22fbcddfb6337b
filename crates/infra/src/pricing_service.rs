//! Rule administration and effective price calculation.
//!
//! Rule, promotion and rights mutations are serialized through one admin lock
//! so the conflict check and the write cannot interleave. Price calculation
//! takes no lock; it reads a snapshot of the product's pricing data.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use merchledger_core::{Clock, DomainError, PricingRuleId, ProductId, PromotionId, TenantId};
use merchledger_pricing::{
    MemberLevels, PriceBreakdown, PriceQuery, PricingRule, PricingRuleEngine, ProductPricing, PromotionalPrice,
    RightsRule, RuleConfig, RuleConflictDetector,
};

use crate::cache::{PriceCache, PriceCacheKey};
use crate::collaborators::ProductCatalog;
use crate::config::Settings;
use crate::error::{ServiceError, ServiceResult};
use crate::store::PricingRepository;

/// Admin input for creating or replacing a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub product_id: ProductId,
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    pub config: RuleConfig,
    pub valid_from: DateTime<Utc>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionDraft {
    pub product_id: ProductId,
    pub promotional_price: Decimal,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
}

pub struct PricingService<P, C> {
    repository: P,
    catalog: C,
    clock: Arc<dyn Clock>,
    engine: PricingRuleEngine,
    detector: RuleConflictDetector,
    member_levels: MemberLevels,
    cache: PriceCache,
    admin: Mutex<()>,
}

impl<P, C> PricingService<P, C>
where
    P: PricingRepository,
    C: ProductCatalog,
{
    pub fn new(repository: P, catalog: C, clock: Arc<dyn Clock>, settings: &Settings) -> Self {
        Self {
            repository,
            catalog,
            clock,
            engine: PricingRuleEngine::new(),
            detector: RuleConflictDetector::new(),
            member_levels: settings.member_levels(),
            cache: PriceCache::new(settings.price_cache_granularity_secs, settings.price_cache_capacity),
            admin: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &PriceCache {
        &self.cache
    }

    pub fn create_rule(&self, tenant_id: TenantId, draft: RuleDraft) -> ServiceResult<PricingRule> {
        let now = self.clock.now();
        let rule = PricingRule {
            id: PricingRuleId::new(),
            tenant_id,
            product_id: draft.product_id,
            name: draft.name,
            priority: draft.priority,
            config: draft.config,
            valid_from: draft.valid_from,
            valid_until: draft.valid_until,
            is_active: draft.is_active,
            created_at: now,
            updated_at: now,
        };
        rule.validate(&self.member_levels)?;

        {
            let _admin = self.admin.lock().unwrap_or_else(PoisonError::into_inner);
            self.ensure_no_conflict(&rule)?;
            self.repository.insert_rule(&rule)?;
        }
        self.cache.invalidate_product(tenant_id, rule.product_id);

        info!(
            tenant_id = %tenant_id,
            product_id = %rule.product_id,
            rule_id = %rule.id,
            rule_type = %rule.rule_type(),
            "pricing rule created"
        );
        Ok(rule)
    }

    /// Replace a rule's definition, keeping its id, product and creation time.
    pub fn update_rule(&self, tenant_id: TenantId, rule_id: PricingRuleId, draft: RuleDraft) -> ServiceResult<PricingRule> {
        let now = self.clock.now();
        let rule = {
            let _admin = self.admin.lock().unwrap_or_else(PoisonError::into_inner);
            let existing = self.load_rule(tenant_id, rule_id)?;
            if draft.product_id != existing.product_id {
                return Err(DomainError::validation("a rule cannot move to another product").into());
            }
            let rule = PricingRule {
                name: draft.name,
                priority: draft.priority,
                config: draft.config,
                valid_from: draft.valid_from,
                valid_until: draft.valid_until,
                is_active: draft.is_active,
                updated_at: now,
                ..existing
            };
            rule.validate(&self.member_levels)?;
            self.ensure_no_conflict(&rule)?;
            self.repository.update_rule(&rule)?;
            rule
        };
        self.cache.invalidate_product(tenant_id, rule.product_id);

        info!(tenant_id = %tenant_id, rule_id = %rule_id, "pricing rule updated");
        Ok(rule)
    }

    pub fn delete_rule(&self, tenant_id: TenantId, rule_id: PricingRuleId) -> ServiceResult<()> {
        let product_id = {
            let _admin = self.admin.lock().unwrap_or_else(PoisonError::into_inner);
            let existing = self.load_rule(tenant_id, rule_id)?;
            self.repository.delete_rule(tenant_id, rule_id)?;
            existing.product_id
        };
        self.cache.invalidate_product(tenant_id, product_id);

        info!(tenant_id = %tenant_id, rule_id = %rule_id, "pricing rule deleted");
        Ok(())
    }

    pub fn get_rule(&self, tenant_id: TenantId, rule_id: PricingRuleId) -> ServiceResult<PricingRule> {
        self.load_rule(tenant_id, rule_id)
    }

    pub fn list_rules(&self, tenant_id: TenantId, product_id: ProductId) -> ServiceResult<Vec<PricingRule>> {
        Ok(self.repository.list_rules(tenant_id, product_id)?)
    }

    /// Deactivate every active rule whose window closed at or before `now`.
    pub fn archive_expired_rules(&self, now: DateTime<Utc>) -> ServiceResult<usize> {
        let _admin = self.admin.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = self.repository.list_expired_rules(now)?;
        let mut archived = 0;
        for mut rule in expired {
            rule.is_active = false;
            rule.updated_at = now;
            match self.repository.update_rule(&rule) {
                Ok(()) => {
                    archived += 1;
                    self.cache.invalidate_product(rule.tenant_id, rule.product_id);
                    debug!(tenant_id = %rule.tenant_id, rule_id = %rule.id, "pricing rule archived");
                }
                Err(err) => warn!(
                    tenant_id = %rule.tenant_id,
                    rule_id = %rule.id,
                    error = %err,
                    "failed to archive pricing rule"
                ),
            }
        }
        if archived > 0 {
            info!(archived, "expired pricing rules archived");
        }
        Ok(archived)
    }

    pub fn create_promotion(&self, tenant_id: TenantId, draft: PromotionDraft) -> ServiceResult<PromotionalPrice> {
        let promotion = PromotionalPrice::new(
            tenant_id,
            draft.product_id,
            draft.promotional_price,
            draft.starts_at,
            draft.ends_at,
            self.clock.now(),
        )?;
        {
            let _admin = self.admin.lock().unwrap_or_else(PoisonError::into_inner);
            self.repository.insert_promotion(&promotion)?;
        }
        self.cache.invalidate_product(tenant_id, promotion.product_id);

        info!(
            tenant_id = %tenant_id,
            product_id = %promotion.product_id,
            promotion_id = %promotion.id,
            "promotion created"
        );
        Ok(promotion)
    }

    pub fn deactivate_promotion(&self, tenant_id: TenantId, promotion_id: PromotionId) -> ServiceResult<PromotionalPrice> {
        let promotion = {
            let _admin = self.admin.lock().unwrap_or_else(PoisonError::into_inner);
            let mut promotion = self
                .repository
                .get_promotion(tenant_id, promotion_id)?
                .ok_or_else(|| DomainError::not_found(format!("promotion {promotion_id}")))?;
            if promotion.is_active {
                promotion.is_active = false;
                self.repository.update_promotion(&promotion)?;
            }
            promotion
        };
        self.cache.invalidate_product(tenant_id, promotion.product_id);

        info!(tenant_id = %tenant_id, promotion_id = %promotion_id, "promotion deactivated");
        Ok(promotion)
    }

    pub fn list_promotions(&self, tenant_id: TenantId, product_id: ProductId) -> ServiceResult<Vec<PromotionalPrice>> {
        Ok(self.repository.list_promotions(tenant_id, product_id)?)
    }

    /// Insert or replace the product's rights rule.
    pub fn set_rights_rule(&self, rule: RightsRule) -> ServiceResult<RightsRule> {
        rule.validate()?;
        self.repository.put_rights_rule(&rule)?;
        info!(
            tenant_id = %rule.tenant_id,
            product_id = %rule.product_id,
            action = rule.insufficient_rights_action.as_str(),
            "rights rule set"
        );
        Ok(rule)
    }

    pub fn remove_rights_rule(&self, tenant_id: TenantId, product_id: ProductId) -> ServiceResult<bool> {
        let removed = self.repository.delete_rights_rule(tenant_id, product_id)?;
        if removed {
            info!(tenant_id = %tenant_id, product_id = %product_id, "rights rule removed");
        }
        Ok(removed)
    }

    pub fn get_rights_rule(&self, tenant_id: TenantId, product_id: ProductId) -> ServiceResult<Option<RightsRule>> {
        Ok(self.repository.get_rights_rule(tenant_id, product_id)?)
    }

    /// Resolve the effective unit price for `query`.
    ///
    /// With caching enabled the query time is rounded down to the cache
    /// granularity before resolution.
    pub fn calculate_effective_price(&self, tenant_id: TenantId, query: &PriceQuery) -> ServiceResult<PriceBreakdown> {
        let at = self.cache.bucket(query.at);
        let key = PriceCacheKey {
            tenant_id,
            product_id: query.product_id,
            quantity: query.quantity,
            member_level: query.member_level.clone(),
            bucket: at,
        };
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let generation = self.cache.generation(tenant_id, query.product_id);
        let pricing = self.load_pricing(tenant_id, query.product_id)?;
        let resolved_query = PriceQuery { at, ..query.clone() };
        let breakdown = self.engine.resolve(&resolved_query, &pricing)?;
        if !self.cache.insert(key, breakdown.clone(), generation) && self.cache.is_enabled() {
            debug!(
                tenant_id = %tenant_id,
                product_id = %query.product_id,
                "pricing changed during resolution, result not cached"
            );
        }

        debug!(
            tenant_id = %tenant_id,
            product_id = %query.product_id,
            quantity = query.quantity,
            effective_price = %breakdown.effective_price,
            "price resolved"
        );
        Ok(breakdown)
    }

    fn load_pricing(&self, tenant_id: TenantId, product_id: ProductId) -> ServiceResult<ProductPricing> {
        let entry = self
            .catalog
            .catalog_entry(tenant_id, product_id)?
            .ok_or_else(|| DomainError::not_found(format!("product {product_id}")))?;
        Ok(ProductPricing {
            tenant_id,
            product_id,
            list_price: entry.list_price,
            currency: entry.currency,
            rules: self.repository.list_rules(tenant_id, product_id)?,
            promotions: self.repository.list_promotions(tenant_id, product_id)?,
        })
    }

    fn load_rule(&self, tenant_id: TenantId, rule_id: PricingRuleId) -> ServiceResult<PricingRule> {
        self.repository
            .get_rule(tenant_id, rule_id)?
            .ok_or_else(|| ServiceError::from(DomainError::not_found(format!("pricing rule {rule_id}"))))
    }

    fn ensure_no_conflict(&self, candidate: &PricingRule) -> ServiceResult<()> {
        let existing = self.repository.list_rules(candidate.tenant_id, candidate.product_id)?;
        if let Err(err) = self.detector.ensure_no_conflict(candidate, &existing) {
            warn!(
                tenant_id = %candidate.tenant_id,
                product_id = %candidate.product_id,
                rule_type = %candidate.rule_type(),
                error = %err,
                "pricing rule rejected"
            );
            return Err(err.into());
        }
        Ok(())
    }
}
