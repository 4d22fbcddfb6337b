//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::id::{PricingRuleId, ProductId, ReservationId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only. Every variant carries enough context
/// (product, quantities, conflicting rule) for a caller to decide between
/// retrying and aborting. Persistence failures belong to the infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Reserve/Adjust would drive available stock negative.
    #[error(
        "insufficient inventory for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientInventory {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    /// A pricing rule overlaps an existing active rule of the same type.
    #[error("{rule_type} rule conflicts with existing rule {conflicting_rule_id}")]
    RuleConflict {
        rule_type: String,
        conflicting_rule_id: PricingRuleId,
    },

    /// A rule configuration failed structural or semantic validation.
    #[error("invalid rule config: {0}")]
    InvalidRuleConfig(String),

    #[error("reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// The reservation already reached a terminal state.
    #[error("reservation {reservation_id} is already {status}")]
    ReservationClosed {
        reservation_id: ReservationId,
        status: String,
    },

    /// The buyer's rights balance cannot cover the line and policy blocks it.
    #[error("insufficient rights: required {required}, available {available}")]
    RightsInsufficient { required: Decimal, available: Decimal },

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A record already exists or a state change collides with another.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A record was addressed through the wrong tenant.
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
}

impl DomainError {
    pub fn insufficient_inventory(product_id: ProductId, requested: i64, available: i64) -> Self {
        Self::InsufficientInventory {
            product_id,
            requested,
            available,
        }
    }

    pub fn rule_conflict(rule_type: impl Into<String>, conflicting_rule_id: PricingRuleId) -> Self {
        Self::RuleConflict {
            rule_type: rule_type.into(),
            conflicting_rule_id,
        }
    }

    pub fn invalid_rule_config(msg: impl Into<String>) -> Self {
        Self::InvalidRuleConfig(msg.into())
    }

    pub fn reservation_closed(reservation_id: ReservationId, status: impl Into<String>) -> Self {
        Self::ReservationClosed {
            reservation_id,
            status: status.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn tenant_isolation(msg: impl Into<String>) -> Self {
        Self::TenantIsolation(msg.into())
    }

    /// Whether a caller may reasonably retry (smaller quantity, later time).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::InsufficientInventory { .. })
    }
}
