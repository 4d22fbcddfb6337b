use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use merchledger_core::{DomainError, DomainResult, ProductId, PromotionId, TenantId};

/// A promotional price window. While it covers the query time it overrides every rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionalPrice {
    pub id: PromotionId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub promotional_price: Decimal,
    pub starts_at: DateTime<Utc>,
    /// `None` runs until deactivated.
    pub ends_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl PromotionalPrice {
    pub fn new(
        tenant_id: TenantId,
        product_id: ProductId,
        promotional_price: Decimal,
        starts_at: DateTime<Utc>,
        ends_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let promotion = Self {
            id: PromotionId::new(),
            tenant_id,
            product_id,
            promotional_price,
            starts_at,
            ends_at,
            is_active: true,
            created_at,
        };
        promotion.validate()?;
        Ok(promotion)
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.promotional_price.is_sign_negative() && !self.promotional_price.is_zero() {
            return Err(DomainError::validation("promotional price cannot be negative"));
        }
        if let Some(ends_at) = self.ends_at {
            if ends_at <= self.starts_at {
                return Err(DomainError::validation("promotion must end after it starts"));
            }
        }
        Ok(())
    }

    /// Active and `starts_at <= at < ends_at`.
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.is_active && self.starts_at <= at && self.ends_at.is_none_or(|end| at < end)
    }
}

/// Pick the promotion in force at `at`: lowest price, then earliest start, then id.
pub fn best_promotion(promotions: &[PromotionalPrice], at: DateTime<Utc>) -> Option<&PromotionalPrice> {
    promotions
        .iter()
        .filter(|p| p.covers(at))
        .min_by(|a, b| {
            a.promotional_price
                .cmp(&b.promotional_price)
                .then(a.starts_at.cmp(&b.starts_at))
                .then(a.id.cmp(&b.id))
        })
}
