use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use merchledger_core::{DomainError, DomainResult, ProductId, ReservationId, TenantId};

/// Reservation lifecycle.
///
/// `Active` is the only non-terminal state; every terminal state is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Active,
    Consumed,
    Released,
    Expired,
}

impl ReservationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ReservationStatus::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Consumed => "consumed",
            ReservationStatus::Released => "released",
            ReservationStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "active" => Ok(ReservationStatus::Active),
            "consumed" => Ok(ReservationStatus::Consumed),
            "released" => Ok(ReservationStatus::Released),
            "expired" => Ok(ReservationStatus::Expired),
            other => Err(DomainError::validation(format!("unknown reservation status '{other}'"))),
        }
    }
}

impl core::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a reservation backs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReferenceType {
    Order,
    Cart,
    Other(String),
}

impl ReferenceType {
    pub fn as_str(&self) -> &str {
        match self {
            ReferenceType::Order => "order",
            ReferenceType::Cart => "cart",
            ReferenceType::Other(s) => s,
        }
    }
}

impl From<String> for ReferenceType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "order" => ReferenceType::Order,
            "cart" => ReferenceType::Cart,
            _ => ReferenceType::Other(value),
        }
    }
}

impl From<&str> for ReferenceType {
    fn from(value: &str) -> Self {
        ReferenceType::from(value.to_string())
    }
}

impl From<ReferenceType> for String {
    fn from(value: ReferenceType) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationReference {
    pub reference_type: ReferenceType,
    pub reference_id: String,
}

impl ReservationReference {
    pub fn new(reference_type: impl Into<ReferenceType>, reference_id: impl Into<String>) -> Self {
        Self {
            reference_type: reference_type.into(),
            reference_id: reference_id.into(),
        }
    }

    pub fn order(reference_id: impl Into<String>) -> Self {
        Self::new(ReferenceType::Order, reference_id)
    }

    pub fn cart(reference_id: impl Into<String>) -> Self {
        Self::new(ReferenceType::Cart, reference_id)
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.reference_type.as_str().trim().is_empty() {
            return Err(DomainError::validation("reference_type cannot be empty"));
        }
        if self.reference_id.trim().is_empty() {
            return Err(DomainError::validation("reference_id cannot be empty"));
        }
        Ok(())
    }
}

/// A temporary hold on inventory backing a cart or order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub reserved_quantity: i64,
    #[serde(flatten)]
    pub reference: ReservationReference,
    pub status: ReservationStatus,
    /// False when the product was untracked at reserve time; counters were not touched.
    pub holds_stock: bool,
    pub created_at: DateTime<Utc>,
    /// `None` never expires.
    pub expires_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn open(
        tenant_id: TenantId,
        product_id: ProductId,
        reserved_quantity: i64,
        reference: ReservationReference,
        holds_stock: bool,
        created_at: DateTime<Utc>,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            tenant_id,
            product_id,
            reserved_quantity,
            reference,
            status: ReservationStatus::Active,
            holds_stock,
            created_at,
            expires_at: ttl.map(|ttl| created_at + ttl),
            closed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    /// Active and past its deadline.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at.is_some_and(|at| at <= now)
    }

    /// Move an active reservation into a terminal state.
    pub fn close(&mut self, status: ReservationStatus, at: DateTime<Utc>) -> DomainResult<()> {
        if !status.is_terminal() {
            return Err(DomainError::invariant("a reservation cannot be reopened"));
        }
        if self.status.is_terminal() {
            return Err(DomainError::reservation_closed(self.id, self.status.as_str()));
        }
        self.status = status;
        self.closed_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(ttl: Option<Duration>) -> Reservation {
        Reservation::open(
            TenantId::new(),
            ProductId::new(),
            3,
            ReservationReference::cart("cart-1"),
            true,
            Utc::now(),
            ttl,
        )
    }

    #[test]
    fn terminal_states_are_final() {
        let mut r = active(None);
        r.close(ReservationStatus::Released, Utc::now()).unwrap();

        let err = r.close(ReservationStatus::Consumed, Utc::now()).unwrap_err();
        assert_eq!(err, DomainError::reservation_closed(r.id, "released"));
        assert_eq!(r.status, ReservationStatus::Released);
    }

    #[test]
    fn cannot_close_into_active() {
        let mut r = active(None);
        assert!(r.close(ReservationStatus::Active, Utc::now()).is_err());
    }

    #[test]
    fn expiry_requires_a_deadline() {
        let forever = active(None);
        assert!(!forever.is_expired_at(Utc::now() + Duration::days(3650)));

        let short = active(Some(Duration::minutes(15)));
        assert!(!short.is_expired_at(short.created_at + Duration::minutes(14)));
        assert!(short.is_expired_at(short.created_at + Duration::minutes(15)));
    }

    #[test]
    fn reference_round_trips_as_plain_strings() {
        let r = active(None);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["reference_type"], "cart");
        assert_eq!(json["reference_id"], "cart-1");
        assert_eq!(json["status"], "active");

        let back: Reservation = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn unknown_reference_types_are_preserved() {
        assert_eq!(ReferenceType::from("quote"), ReferenceType::Other("quote".to_string()));
        assert_eq!(ReferenceType::from("order"), ReferenceType::Order);
    }
}
