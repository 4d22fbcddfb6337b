//! Effective price resolution.
//!
//! Pipeline, in order:
//! 1. base price: the active `base_price` rule valid at the query time, else the list price
//! 2. a covering promotion, which short-circuits everything below
//! 3. discount rules applied member, then volume, then time-based; each one that
//!    fires overwrites the running price
//!
//! Within a type, rules run in ascending `priority` (then `valid_from`, then id), so
//! the highest-priority rule of a type lands last. `priority` never orders types.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use merchledger_core::{DomainError, DomainResult, PricingRuleId, ProductId, PromotionId, TenantId};

use crate::promotion::{PromotionalPrice, best_promotion};
use crate::rule::{PricingRule, RuleConfig, RuleType};

/// Discount rule types in application order.
const DISCOUNT_ORDER: [RuleType; 3] = [
    RuleType::MemberDiscount,
    RuleType::VolumeDiscount,
    RuleType::TimeBasedDiscount,
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceQuery {
    pub product_id: ProductId,
    pub quantity: i64,
    pub member_level: Option<String>,
    pub at: DateTime<Utc>,
}

impl PriceQuery {
    pub fn new(product_id: ProductId, quantity: i64, at: DateTime<Utc>) -> Self {
        Self {
            product_id,
            quantity,
            member_level: None,
            at,
        }
    }

    pub fn with_member_level(mut self, level: impl Into<String>) -> Self {
        self.member_level = Some(level.into());
        self
    }
}

/// Everything resolution needs to know about one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPricing {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub list_price: Decimal,
    pub currency: String,
    pub rules: Vec<PricingRule>,
    pub promotions: Vec<PromotionalPrice>,
}

/// A rule that fired during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppliedRule {
    BasePrice {
        rule_id: PricingRuleId,
        name: String,
        price: Decimal,
    },
    Promotion {
        promotion_id: PromotionId,
        price: Decimal,
    },
    MemberDiscount {
        rule_id: PricingRuleId,
        name: String,
        member_level: String,
        price: Decimal,
    },
    VolumeDiscount {
        rule_id: PricingRuleId,
        name: String,
        min_qty: i64,
        price: Decimal,
    },
    TimeBasedDiscount {
        rule_id: PricingRuleId,
        name: String,
        price: Decimal,
    },
}

impl AppliedRule {
    pub fn name(&self) -> &str {
        match self {
            AppliedRule::Promotion { .. } => "promotion",
            AppliedRule::BasePrice { name, .. }
            | AppliedRule::MemberDiscount { name, .. }
            | AppliedRule::VolumeDiscount { name, .. }
            | AppliedRule::TimeBasedDiscount { name, .. } => name,
        }
    }

    pub fn price(&self) -> Decimal {
        match self {
            AppliedRule::BasePrice { price, .. }
            | AppliedRule::Promotion { price, .. }
            | AppliedRule::MemberDiscount { price, .. }
            | AppliedRule::VolumeDiscount { price, .. }
            | AppliedRule::TimeBasedDiscount { price, .. } => *price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub product_id: ProductId,
    pub quantity: i64,
    pub member_level: Option<String>,
    pub at: DateTime<Utc>,
    pub currency: String,
    /// Unit price before promotions and discounts.
    pub base_price: Decimal,
    /// Unit price the customer pays.
    pub effective_price: Decimal,
    /// `max(base_price - effective_price, 0)`, per unit.
    pub discount_amount: Decimal,
    /// In evaluation order.
    pub applied_rules: Vec<AppliedRule>,
}

impl PriceBreakdown {
    pub fn line_total(&self) -> Decimal {
        self.effective_price * Decimal::from(self.quantity)
    }

    pub fn is_promotional(&self) -> bool {
        self.applied_rules
            .iter()
            .any(|r| matches!(r, AppliedRule::Promotion { .. }))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PricingRuleEngine;

impl PricingRuleEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, query: &PriceQuery, pricing: &ProductPricing) -> DomainResult<PriceBreakdown> {
        if query.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if query.product_id != pricing.product_id {
            return Err(DomainError::validation(format!(
                "pricing data for product {} cannot price product {}",
                pricing.product_id, query.product_id
            )));
        }

        let at = query.at;
        let mut applied = Vec::new();

        let mut base_price = pricing.list_price;
        let mut currency = pricing.currency.clone();
        if let Some(rule) = rules_of_type(&pricing.rules, RuleType::BasePrice, at).last() {
            if let RuleConfig::BasePrice(cfg) = &rule.config {
                base_price = cfg.amount;
                currency = cfg.currency.clone();
                applied.push(AppliedRule::BasePrice {
                    rule_id: rule.id,
                    name: rule.name.clone(),
                    price: cfg.amount,
                });
            }
        }

        let mut effective_price = base_price;

        if let Some(promotion) = best_promotion(&pricing.promotions, at) {
            effective_price = promotion.promotional_price;
            applied.push(AppliedRule::Promotion {
                promotion_id: promotion.id,
                price: promotion.promotional_price,
            });
        } else {
            for rule_type in DISCOUNT_ORDER {
                for rule in rules_of_type(&pricing.rules, rule_type, at) {
                    if let Some(fired) = apply_discount(rule, query) {
                        effective_price = fired.price();
                        applied.push(fired);
                    }
                }
            }
        }

        let discount_amount = (base_price - effective_price).max(Decimal::ZERO);

        Ok(PriceBreakdown {
            product_id: query.product_id,
            quantity: query.quantity,
            member_level: query.member_level.clone(),
            at,
            currency,
            base_price,
            effective_price,
            discount_amount,
            applied_rules: applied,
        })
    }
}

/// Rules of one type valid at `at`, in application order.
fn rules_of_type(rules: &[PricingRule], rule_type: RuleType, at: DateTime<Utc>) -> Vec<&PricingRule> {
    let mut matching: Vec<&PricingRule> = rules
        .iter()
        .filter(|r| r.rule_type() == rule_type && r.is_valid_at(at))
        .collect();
    matching.sort_by(|a, b| application_order(a, b));
    matching
}

fn application_order(a: &PricingRule, b: &PricingRule) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then(a.valid_from.cmp(&b.valid_from))
        .then(a.id.cmp(&b.id))
}

fn apply_discount(rule: &PricingRule, query: &PriceQuery) -> Option<AppliedRule> {
    match &rule.config {
        RuleConfig::BasePrice(_) => None,
        RuleConfig::MemberDiscount(cfg) => {
            let level = query.member_level.as_deref()?;
            let price = cfg.price_for(level)?;
            Some(AppliedRule::MemberDiscount {
                rule_id: rule.id,
                name: rule.name.clone(),
                member_level: level.to_string(),
                price,
            })
        }
        RuleConfig::VolumeDiscount(cfg) => {
            let tier = cfg.tier_for(query.quantity)?;
            Some(AppliedRule::VolumeDiscount {
                rule_id: rule.id,
                name: rule.name.clone(),
                min_qty: tier.min_qty,
                price: tier.price,
            })
        }
        RuleConfig::TimeBasedDiscount(cfg) => {
            let slot = cfg.slot_at(query.at)?;
            Some(AppliedRule::TimeBasedDiscount {
                rule_id: rule.id,
                name: rule.name.clone(),
                price: slot.price,
            })
        }
    }
}
