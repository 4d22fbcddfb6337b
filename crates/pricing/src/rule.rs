//! Pricing rules and their type-specific configuration.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use merchledger_core::{DomainError, DomainResult, PricingRuleId, ProductId, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    BasePrice,
    VolumeDiscount,
    MemberDiscount,
    TimeBasedDiscount,
}

impl RuleType {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleType::BasePrice => "base_price",
            RuleType::VolumeDiscount => "volume_discount",
            RuleType::MemberDiscount => "member_discount",
            RuleType::TimeBasedDiscount => "time_based_discount",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "base_price" => Ok(RuleType::BasePrice),
            "volume_discount" => Ok(RuleType::VolumeDiscount),
            "member_discount" => Ok(RuleType::MemberDiscount),
            "time_based_discount" => Ok(RuleType::TimeBasedDiscount),
            other => Err(DomainError::invalid_rule_config(format!("unknown rule_type '{other}'"))),
        }
    }
}

impl core::fmt::Display for RuleType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Member levels a tenant recognises (`member_discount` keys must be among them).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberLevels(BTreeSet<String>);

impl MemberLevels {
    pub fn new<I, S>(levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(levels.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, level: &str) -> bool {
        self.0.contains(level)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for MemberLevels {
    fn default() -> Self {
        Self::new(["regular", "silver", "gold", "platinum"])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasePriceConfig {
    pub amount: Decimal,
    /// ISO 4217 code.
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeTier {
    pub min_qty: i64,
    /// `None` is open-ended.
    pub max_qty: Option<i64>,
    pub price: Decimal,
}

impl VolumeTier {
    pub fn contains(&self, quantity: i64) -> bool {
        quantity >= self.min_qty && self.max_qty.is_none_or(|max| quantity <= max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDiscountConfig {
    pub tiers: Vec<VolumeTier>,
}

impl VolumeDiscountConfig {
    pub fn tier_for(&self, quantity: i64) -> Option<&VolumeTier> {
        self.tiers.iter().find(|t| t.contains(quantity))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDiscountConfig {
    pub levels: BTreeMap<String, Decimal>,
    pub default_price: Option<Decimal>,
}

impl MemberDiscountConfig {
    /// The level's own price, else the default price.
    pub fn price_for(&self, level: &str) -> Option<Decimal> {
        self.levels.get(level).copied().or(self.default_price)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// ISO weekday numbers, 1 = Monday .. 7 = Sunday.
    pub week_days: Vec<u8>,
    pub price: Decimal,
}

impl TimeSlot {
    /// Slots are evaluated in UTC: `start_time <= t < end_time` on a listed weekday.
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        let weekday = at.weekday().number_from_monday() as u8;
        let time = at.time();
        self.week_days.contains(&weekday) && self.start_time <= time && time < self.end_time
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBasedDiscountConfig {
    pub slots: Vec<TimeSlot>,
}

impl TimeBasedDiscountConfig {
    pub fn slot_at(&self, at: DateTime<Utc>) -> Option<&TimeSlot> {
        self.slots.iter().find(|s| s.covers(at))
    }
}

/// Type-specific rule payload, keyed by `rule_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule_type", content = "rule_config", rename_all = "snake_case")]
pub enum RuleConfig {
    BasePrice(BasePriceConfig),
    VolumeDiscount(VolumeDiscountConfig),
    MemberDiscount(MemberDiscountConfig),
    TimeBasedDiscount(TimeBasedDiscountConfig),
}

impl RuleConfig {
    pub fn rule_type(&self) -> RuleType {
        match self {
            RuleConfig::BasePrice(_) => RuleType::BasePrice,
            RuleConfig::VolumeDiscount(_) => RuleType::VolumeDiscount,
            RuleConfig::MemberDiscount(_) => RuleType::MemberDiscount,
            RuleConfig::TimeBasedDiscount(_) => RuleType::TimeBasedDiscount,
        }
    }

    /// Structural and semantic checks, run before anything is persisted.
    pub fn validate(&self, levels: &MemberLevels) -> DomainResult<()> {
        match self {
            RuleConfig::BasePrice(cfg) => validate_base_price(cfg),
            RuleConfig::VolumeDiscount(cfg) => validate_volume(cfg),
            RuleConfig::MemberDiscount(cfg) => validate_member(cfg, levels),
            RuleConfig::TimeBasedDiscount(cfg) => validate_time_based(cfg),
        }
    }
}

fn ensure_price(price: Decimal, what: &str) -> DomainResult<()> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(DomainError::invalid_rule_config(format!("{what} cannot be negative")));
    }
    Ok(())
}

fn validate_base_price(cfg: &BasePriceConfig) -> DomainResult<()> {
    ensure_price(cfg.amount, "base price amount")?;
    let valid_code = cfg.currency.len() == 3 && cfg.currency.chars().all(|c| c.is_ascii_uppercase());
    if !valid_code {
        return Err(DomainError::invalid_rule_config(format!(
            "currency '{}' is not an ISO 4217 code",
            cfg.currency
        )));
    }
    Ok(())
}

fn validate_volume(cfg: &VolumeDiscountConfig) -> DomainResult<()> {
    if cfg.tiers.is_empty() {
        return Err(DomainError::invalid_rule_config("volume discount needs at least one tier"));
    }

    let mut tiers: Vec<&VolumeTier> = cfg.tiers.iter().collect();
    tiers.sort_by_key(|t| t.min_qty);

    for tier in &tiers {
        if tier.min_qty < 1 {
            return Err(DomainError::invalid_rule_config("tier min_qty must be at least 1"));
        }
        if let Some(max) = tier.max_qty {
            if max < tier.min_qty {
                return Err(DomainError::invalid_rule_config(format!(
                    "tier max_qty {max} is below min_qty {}",
                    tier.min_qty
                )));
            }
        }
        ensure_price(tier.price, "tier price")?;
    }

    for pair in tiers.windows(2) {
        let (lower, upper) = (pair[0], pair[1]);
        match lower.max_qty {
            None => {
                return Err(DomainError::invalid_rule_config(format!(
                    "open-ended tier starting at {} overlaps tier starting at {}",
                    lower.min_qty, upper.min_qty
                )));
            }
            Some(max) if max >= upper.min_qty => {
                return Err(DomainError::invalid_rule_config(format!(
                    "tiers {}..={max} and {}.. overlap",
                    lower.min_qty, upper.min_qty
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn validate_member(cfg: &MemberDiscountConfig, levels: &MemberLevels) -> DomainResult<()> {
    if cfg.levels.is_empty() && cfg.default_price.is_none() {
        return Err(DomainError::invalid_rule_config(
            "member discount needs at least one level or a default price",
        ));
    }
    for (level, price) in &cfg.levels {
        if !levels.contains(level) {
            return Err(DomainError::invalid_rule_config(format!("unknown member level '{level}'")));
        }
        ensure_price(*price, "member price")?;
    }
    if let Some(default_price) = cfg.default_price {
        ensure_price(default_price, "default price")?;
    }
    Ok(())
}

fn validate_time_based(cfg: &TimeBasedDiscountConfig) -> DomainResult<()> {
    if cfg.slots.is_empty() {
        return Err(DomainError::invalid_rule_config("time-based discount needs at least one slot"));
    }
    for slot in &cfg.slots {
        if slot.start_time >= slot.end_time {
            return Err(DomainError::invalid_rule_config(format!(
                "slot start {} must be before end {}; split slots that cross midnight",
                slot.start_time, slot.end_time
            )));
        }
        if slot.week_days.is_empty() {
            return Err(DomainError::invalid_rule_config("slot needs at least one week day"));
        }
        let mut seen = BTreeSet::new();
        for day in &slot.week_days {
            if !(1..=7).contains(day) {
                return Err(DomainError::invalid_rule_config(format!(
                    "week day {day} is outside 1..=7"
                )));
            }
            if !seen.insert(*day) {
                return Err(DomainError::invalid_rule_config(format!("week day {day} is listed twice")));
            }
        }
        ensure_price(slot.price, "slot price")?;
    }
    Ok(())
}

/// A pricing rule attached to one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRule {
    pub id: PricingRuleId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub name: String,
    /// Orders rules of the same type only; never chooses between types.
    pub priority: i32,
    pub config: RuleConfig,
    pub valid_from: DateTime<Utc>,
    /// `None` is open-ended.
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PricingRule {
    pub fn rule_type(&self) -> RuleType {
        self.config.rule_type()
    }

    /// Active and inside `[valid_from, valid_until)`.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.is_active && self.valid_from <= at && self.valid_until.is_none_or(|until| at < until)
    }

    /// Active but its window has closed; due for archival.
    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        self.is_active && self.valid_until.is_some_and(|until| until <= at)
    }

    /// Half-open windows, `None` treated as +inf.
    pub fn window_overlaps(&self, other: &PricingRule) -> bool {
        let self_starts_before_other_ends = other.valid_until.is_none_or(|until| self.valid_from < until);
        let other_starts_before_self_ends = self.valid_until.is_none_or(|until| other.valid_from < until);
        self_starts_before_other_ends && other_starts_before_self_ends
    }

    pub fn validate(&self, levels: &MemberLevels) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("rule name cannot be empty"));
        }
        if let Some(until) = self.valid_until {
            if until <= self.valid_from {
                return Err(DomainError::invalid_rule_config("valid_until must be after valid_from"));
            }
        }
        self.config.validate(levels)
    }
}
