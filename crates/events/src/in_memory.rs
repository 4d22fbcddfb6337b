//! In-memory audit log for tests/dev.

use std::sync::Mutex;

use merchledger_core::{ProductId, TenantId};

use crate::event::{AuditEvent, InventoryChangeKind, InventoryChanged, LowStockAlert};
use crate::sink::{AuditError, AuditSink};

/// Records every audit event in arrival order.
///
/// Can be switched into a failing mode to exercise best-effort handling.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    events: Mutex<Vec<AuditEvent>>,
    failing: Mutex<bool>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail with `AuditError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Inventory changes for one tenant/product, oldest first.
    pub fn changes_for(&self, tenant_id: TenantId, product_id: ProductId) -> Vec<InventoryChanged> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AuditEvent::InventoryChanged(c)
                    if c.tenant_id == tenant_id && c.product_id == product_id =>
                {
                    Some(c)
                }
                _ => None,
            })
            .collect()
    }

    pub fn count_kind(&self, kind: InventoryChangeKind) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, AuditEvent::InventoryChanged(c) if c.kind == kind))
            .count()
    }

    pub fn alerts(&self) -> Vec<LowStockAlert> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AuditEvent::LowStockAlert(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(AuditError::Unavailable("audit log is failing".to_string()));
        }
        self.events
            .lock()
            .map_err(|_| AuditError::Unavailable("lock poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}

impl AuditSink for InMemoryAuditLog {
    fn log_inventory_change(&self, change: &InventoryChanged) -> Result<(), AuditError> {
        self.record(AuditEvent::InventoryChanged(change.clone()))
    }

    fn log_alert_triggered(&self, alert: &LowStockAlert) -> Result<(), AuditError> {
        self.record(AuditEvent::LowStockAlert(alert.clone()))
    }
}
