//! Detection of rules that may not coexist.
//!
//! Two rules conflict when they belong to the same tenant and product, share a
//! rule type and are both active. A `base_price` pair conflicts regardless of
//! windows (at most one active base price per product). Discount pairs only
//! conflict when their validity windows overlap, with an open end treated as
//! infinite.

use merchledger_core::{DomainError, DomainResult};

use crate::rule::{PricingRule, RuleType};

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleConflictDetector;

impl RuleConflictDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn conflicts(&self, a: &PricingRule, b: &PricingRule) -> bool {
        if a.id == b.id || a.tenant_id != b.tenant_id || a.product_id != b.product_id {
            return false;
        }
        if a.rule_type() != b.rule_type() || !a.is_active || !b.is_active {
            return false;
        }
        match a.rule_type() {
            RuleType::BasePrice => true,
            RuleType::VolumeDiscount | RuleType::MemberDiscount | RuleType::TimeBasedDiscount => {
                a.window_overlaps(b)
            }
        }
    }

    /// First existing rule `candidate` conflicts with.
    pub fn find_conflict<'a>(
        &self,
        candidate: &PricingRule,
        existing: impl IntoIterator<Item = &'a PricingRule>,
    ) -> Option<&'a PricingRule> {
        existing.into_iter().find(|rule| self.conflicts(candidate, rule))
    }

    pub fn check_conflict<'a>(
        &self,
        candidate: &PricingRule,
        existing: impl IntoIterator<Item = &'a PricingRule>,
    ) -> bool {
        self.find_conflict(candidate, existing).is_some()
    }

    pub fn ensure_no_conflict<'a>(
        &self,
        candidate: &PricingRule,
        existing: impl IntoIterator<Item = &'a PricingRule>,
    ) -> DomainResult<()> {
        match self.find_conflict(candidate, existing) {
            Some(rule) => Err(DomainError::rule_conflict(candidate.rule_type().as_str(), rule.id)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{BasePriceConfig, RuleConfig, VolumeDiscountConfig, VolumeTier};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use merchledger_core::{PricingRuleId, ProductId, TenantId};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn base_config() -> RuleConfig {
        RuleConfig::BasePrice(BasePriceConfig {
            amount: dec!(100),
            currency: "USD".to_string(),
        })
    }

    fn volume_config() -> RuleConfig {
        RuleConfig::VolumeDiscount(VolumeDiscountConfig {
            tiers: vec![VolumeTier {
                min_qty: 5,
                max_qty: None,
                price: dec!(70),
            }],
        })
    }

    fn rule(
        tenant_id: TenantId,
        product_id: ProductId,
        config: RuleConfig,
        from_days: i64,
        until_days: Option<i64>,
    ) -> PricingRule {
        PricingRule {
            id: PricingRuleId::new(),
            tenant_id,
            product_id,
            name: "r".to_string(),
            priority: 0,
            config,
            valid_from: epoch() + Duration::days(from_days),
            valid_until: until_days.map(|d| epoch() + Duration::days(d)),
            is_active: true,
            created_at: epoch(),
            updated_at: epoch(),
        }
    }

    #[test]
    fn second_active_base_price_conflicts_even_with_disjoint_windows() {
        let (tenant, product) = (TenantId::new(), ProductId::new());
        let existing = rule(tenant, product, base_config(), 0, Some(10));
        let candidate = rule(tenant, product, base_config(), 20, None);

        let err = RuleConflictDetector::new()
            .ensure_no_conflict(&candidate, [&existing])
            .unwrap_err();
        assert_eq!(err, DomainError::rule_conflict("base_price", existing.id));
    }

    #[test]
    fn disjoint_discount_windows_do_not_conflict() {
        let (tenant, product) = (TenantId::new(), ProductId::new());
        let first = rule(tenant, product, volume_config(), 0, Some(10));
        let second = rule(tenant, product, volume_config(), 10, None);
        assert!(!RuleConflictDetector::new().check_conflict(&second, [&first]));
    }

    #[test]
    fn open_ended_discount_overlaps_later_window() {
        let (tenant, product) = (TenantId::new(), ProductId::new());
        let open = rule(tenant, product, volume_config(), 0, None);
        let later = rule(tenant, product, volume_config(), 100, Some(200));
        assert!(RuleConflictDetector::new().check_conflict(&later, [&open]));
    }

    #[test]
    fn other_types_products_and_inactive_rules_are_ignored() {
        let (tenant, product) = (TenantId::new(), ProductId::new());
        let base = rule(tenant, product, base_config(), 0, None);
        let volume = rule(tenant, product, volume_config(), 0, None);
        let other_product = rule(tenant, ProductId::new(), base_config(), 0, None);
        let other_tenant = rule(TenantId::new(), product, base_config(), 0, None);
        let mut inactive = rule(tenant, product, base_config(), 0, None);
        inactive.is_active = false;

        let detector = RuleConflictDetector::new();
        assert!(!detector.check_conflict(&base, [&volume, &other_product, &other_tenant, &inactive]));
    }

    #[test]
    fn updating_a_rule_does_not_conflict_with_itself() {
        let (tenant, product) = (TenantId::new(), ProductId::new());
        let stored = rule(tenant, product, base_config(), 0, None);
        let mut updated = stored.clone();
        updated.priority = 5;
        assert!(!RuleConflictDetector::new().check_conflict(&updated, [&stored]));
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

        #[test]
        fn conflict_is_symmetric(
            a_from in 0i64..50, a_len in proptest::option::of(1i64..50),
            b_from in 0i64..50, b_len in proptest::option::of(1i64..50),
            a_base in any::<bool>(), b_base in any::<bool>(),
        ) {
            let (tenant, product) = (TenantId::new(), ProductId::new());
            let cfg = |base: bool| if base { base_config() } else { volume_config() };
            let a = rule(tenant, product, cfg(a_base), a_from, a_len.map(|l| a_from + l));
            let b = rule(tenant, product, cfg(b_base), b_from, b_len.map(|l| b_from + l));

            let detector = RuleConflictDetector::new();
            prop_assert_eq!(detector.conflicts(&a, &b), detector.conflicts(&b, &a));
        }
    }
}
