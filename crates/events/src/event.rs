use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use merchledger_core::{ProductId, ReservationId, TenantId};

/// A fact emitted by the ledger.
///
/// Events are immutable, versioned and tenant-scoped.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "inventory.stock.reserved").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    fn tenant_id(&self) -> TenantId;

    fn occurred_at(&self) -> DateTime<Utc>;
}

/// Which ledger operation produced an inventory change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryChangeKind {
    Initialized,
    SettingsUpdated,
    Adjusted,
    Reserved,
    Released,
    Consumed,
    Expired,
    Reconciled,
}

/// Counter snapshot after a ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryChanged {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub reservation_id: Option<ReservationId>,
    pub kind: InventoryChangeKind,
    /// Quantity moved by the operation (signed for adjustments).
    pub quantity: i64,
    pub stock_after: i64,
    pub reserved_after: i64,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Available stock fell to or below the product's low-stock threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockAlert {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub available: i64,
    pub threshold: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    InventoryChanged(InventoryChanged),
    LowStockAlert(LowStockAlert),
}

impl Event for AuditEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AuditEvent::InventoryChanged(e) => match e.kind {
                InventoryChangeKind::Initialized => "inventory.stock.initialized",
                InventoryChangeKind::SettingsUpdated => "inventory.stock.settings_updated",
                InventoryChangeKind::Adjusted => "inventory.stock.adjusted",
                InventoryChangeKind::Reserved => "inventory.stock.reserved",
                InventoryChangeKind::Released => "inventory.stock.released",
                InventoryChangeKind::Consumed => "inventory.stock.consumed",
                InventoryChangeKind::Expired => "inventory.stock.expired",
                InventoryChangeKind::Reconciled => "inventory.stock.reconciled",
            },
            AuditEvent::LowStockAlert(_) => "inventory.alert.low_stock",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn tenant_id(&self) -> TenantId {
        match self {
            AuditEvent::InventoryChanged(e) => e.tenant_id,
            AuditEvent::LowStockAlert(e) => e.tenant_id,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AuditEvent::InventoryChanged(e) => e.occurred_at,
            AuditEvent::LowStockAlert(e) => e.occurred_at,
        }
    }
}

impl From<InventoryChanged> for AuditEvent {
    fn from(value: InventoryChanged) -> Self {
        AuditEvent::InventoryChanged(value)
    }
}

impl From<LowStockAlert> for AuditEvent {
    fn from(value: LowStockAlert) -> Self {
        AuditEvent::LowStockAlert(value)
    }
}
