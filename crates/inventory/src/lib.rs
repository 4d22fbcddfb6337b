//! Inventory domain: per-product stock counters and reservations.
//!
//! Pure, deterministic state transitions (no IO, no locking, no storage). The
//! infra crate serialises calls per product and persists the results.

pub mod info;
pub mod movement;
pub mod reservation;

pub use info::{InventoryInfo, ProductInventory};
pub use movement::StockMovement;
pub use reservation::{ReferenceType, Reservation, ReservationReference, ReservationStatus};
