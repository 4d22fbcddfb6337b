//! Tenant-scoped persistence boundary for inventory rows, reservations and
//! pricing data.
//!
//! The traits make no storage assumptions; the in-memory implementations back
//! tests and single-process deployments.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::{InMemoryInventoryStore, InMemoryPricingRepository, InMemoryReservationStore};
pub use r#trait::{InventoryStore, PricingRepository, ReservationStore};
