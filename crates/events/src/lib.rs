//! Inventory audit events and the best-effort audit side channel.
//!
//! The ledger reports every state change here after the mutation is durable.
//! Sinks may fail; callers log the failure and carry on.

pub mod bus;
pub mod event;
pub mod in_memory;
pub mod sink;

pub use bus::{AuditBus, Subscription};
pub use event::{AuditEvent, Event, InventoryChangeKind, InventoryChanged, LowStockAlert};
pub use in_memory::InMemoryAuditLog;
pub use sink::{AuditError, AuditSink, NoopAuditSink, TracingAuditSink};
