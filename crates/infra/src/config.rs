//! Runtime settings loaded from the environment.

use std::time::Duration as StdDuration;

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use merchledger_observability::LogFormat;
use merchledger_pricing::MemberLevels;

pub const RESERVATION_TTL_SECS: &str = "MERCH_RESERVATION_TTL_SECS";
pub const SWEEP_INTERVAL_SECS: &str = "MERCH_SWEEP_INTERVAL_SECS";
pub const SWEEP_BATCH_SIZE: &str = "MERCH_SWEEP_BATCH_SIZE";
pub const POINTS_PER_CURRENCY_UNIT: &str = "MERCH_POINTS_PER_CURRENCY_UNIT";
pub const PRICE_CACHE_GRANULARITY_SECS: &str = "MERCH_PRICE_CACHE_GRANULARITY_SECS";
pub const PRICE_CACHE_CAPACITY: &str = "MERCH_PRICE_CACHE_CAPACITY";
pub const MEMBER_LEVELS: &str = "MERCH_MEMBER_LEVELS";
pub const LOG_FORMAT: &str = "MERCH_LOG_FORMAT";
pub const DATABASE_URL: &str = "DATABASE_URL";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `0` means reservations never expire.
    pub reservation_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub sweep_batch_size: usize,
    pub points_per_currency_unit: Decimal,
    /// `0` disables the price cache.
    pub price_cache_granularity_secs: u64,
    pub price_cache_capacity: usize,
    pub member_levels: Vec<String>,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reservation_ttl_secs: 900,
            sweep_interval_secs: 60,
            sweep_batch_size: 500,
            points_per_currency_unit: Decimal::from(100),
            price_cache_granularity_secs: 60,
            price_cache_capacity: 10_000,
            member_levels: MemberLevels::default().iter().map(str::to_string).collect(),
            log_format: LogFormat::Json,
            database_url: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(v) = lookup(RESERVATION_TTL_SECS) {
            settings.reservation_ttl_secs = parse(RESERVATION_TTL_SECS, &v)?;
        }
        if let Some(v) = lookup(SWEEP_INTERVAL_SECS) {
            settings.sweep_interval_secs = parse_positive(SWEEP_INTERVAL_SECS, &v)?;
        }
        if let Some(v) = lookup(SWEEP_BATCH_SIZE) {
            settings.sweep_batch_size = parse_positive(SWEEP_BATCH_SIZE, &v)?;
        }
        if let Some(v) = lookup(POINTS_PER_CURRENCY_UNIT) {
            let rate: Decimal = parse(POINTS_PER_CURRENCY_UNIT, &v)?;
            if rate <= Decimal::ZERO {
                return Err(invalid(POINTS_PER_CURRENCY_UNIT, &v));
            }
            settings.points_per_currency_unit = rate;
        }
        if let Some(v) = lookup(PRICE_CACHE_GRANULARITY_SECS) {
            settings.price_cache_granularity_secs = parse(PRICE_CACHE_GRANULARITY_SECS, &v)?;
        }
        if let Some(v) = lookup(PRICE_CACHE_CAPACITY) {
            settings.price_cache_capacity = parse_positive(PRICE_CACHE_CAPACITY, &v)?;
        }
        if let Some(v) = lookup(MEMBER_LEVELS) {
            let levels: Vec<String> = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if levels.is_empty() {
                return Err(invalid(MEMBER_LEVELS, &v));
            }
            settings.member_levels = levels;
        }
        if let Some(v) = lookup(LOG_FORMAT) {
            settings.log_format = v.parse().map_err(|_| invalid(LOG_FORMAT, &v))?;
        }
        if let Some(v) = lookup(DATABASE_URL) {
            if !v.trim().is_empty() {
                settings.database_url = Some(v);
            }
        }

        Ok(settings)
    }

    pub fn reservation_ttl(&self) -> Option<chrono::Duration> {
        match self.reservation_ttl_secs {
            0 => None,
            secs => chrono::Duration::try_seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1_000)),
        }
    }

    pub fn sweep_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn member_levels(&self) -> MemberLevels {
        MemberLevels::new(self.member_levels.iter().cloned())
    }
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_positive<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let parsed: T = parse(key, value)?;
    if parsed <= T::default() {
        return Err(invalid(key, value));
    }
    Ok(parsed)
}
