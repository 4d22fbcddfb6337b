//! `merchledger-core`: shared domain primitives.
//!
//! Identifiers, the domain error taxonomy and the clock abstraction. Everything
//! here is pure; storage and locking live in `merchledger-infra`.

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{PricingRuleId, ProductId, PromotionId, ReservationId, TenantId, UserId};
