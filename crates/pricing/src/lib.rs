//! Pricing domain: rule definitions, conflict detection, price resolution and
//! rights (loyalty point) cost derivation.
//!
//! Everything here is a pure function of its inputs. Loading rules, caching
//! and collaborator lookups happen in `merchledger-infra`.

pub mod conflict;
pub mod engine;
pub mod promotion;
pub mod rights;
pub mod rule;

pub use conflict::RuleConflictDetector;
pub use engine::{AppliedRule, PriceBreakdown, PriceQuery, PricingRuleEngine, ProductPricing};
pub use promotion::{PromotionalPrice, best_promotion};
pub use rights::{
    InsufficientRightsAction, RightsCharge, RightsConsumptionCalculator, RightsRule, RightsSettlement,
};
pub use rule::{
    BasePriceConfig, MemberDiscountConfig, MemberLevels, PricingRule, RuleConfig, RuleType,
    TimeBasedDiscountConfig, TimeSlot, VolumeDiscountConfig, VolumeTier,
};
