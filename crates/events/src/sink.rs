//! Audit collaborator boundary.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::event::{AuditEvent, Event, InventoryChanged, LowStockAlert};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode audit event: {0}")]
    Encode(String),
}

/// Best-effort receiver of inventory audit events.
///
/// Delivery is at-least-once at best. A failing sink must never roll back the
/// ledger mutation that produced the event; callers log and continue.
pub trait AuditSink: Send + Sync {
    fn log_inventory_change(&self, change: &InventoryChanged) -> Result<(), AuditError>;

    fn log_alert_triggered(&self, alert: &LowStockAlert) -> Result<(), AuditError>;
}

impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    fn log_inventory_change(&self, change: &InventoryChanged) -> Result<(), AuditError> {
        (**self).log_inventory_change(change)
    }

    fn log_alert_triggered(&self, alert: &LowStockAlert) -> Result<(), AuditError> {
        (**self).log_alert_triggered(alert)
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn log_inventory_change(&self, _change: &InventoryChanged) -> Result<(), AuditError> {
        Ok(())
    }

    fn log_alert_triggered(&self, _alert: &LowStockAlert) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Writes each event as a JSON payload on the `audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    fn emit(&self, event: AuditEvent) -> Result<(), AuditError> {
        let payload =
            serde_json::to_string(&event).map_err(|e| AuditError::Encode(e.to_string()))?;
        info!(
            target: "audit",
            event_type = event.event_type(),
            tenant_id = %event.tenant_id(),
            payload = %payload,
            "audit event"
        );
        Ok(())
    }
}

impl AuditSink for TracingAuditSink {
    fn log_inventory_change(&self, change: &InventoryChanged) -> Result<(), AuditError> {
        self.emit(AuditEvent::InventoryChanged(change.clone()))
    }

    fn log_alert_triggered(&self, alert: &LowStockAlert) -> Result<(), AuditError> {
        self.emit(AuditEvent::LowStockAlert(alert.clone()))
    }
}
