//! Best-effort audit publication shared by the ledger backends.

use chrono::{DateTime, Utc};
use tracing::warn;

use merchledger_core::{ProductId, ReservationId, TenantId};
use merchledger_events::{AuditSink, InventoryChanged, LowStockAlert};
use merchledger_inventory::StockMovement;

/// Audit output of one committed transition, published once locks are released.
#[derive(Debug, Clone)]
pub(crate) struct PendingAudit {
    pub change: InventoryChanged,
    pub alert: Option<LowStockAlert>,
}

impl PendingAudit {
    pub fn from_movement(
        movement: &StockMovement,
        tenant_id: TenantId,
        product_id: ProductId,
        reservation_id: Option<ReservationId>,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            change: movement.to_change(tenant_id, product_id, reservation_id, reason, at),
            alert: movement
                .crossed_low_stock()
                .then(|| movement.to_alert(tenant_id, product_id, at)),
        }
    }
}

/// Hand the change (and alert, if any) to the sink. Failures are logged, never returned.
pub(crate) fn publish(sink: &dyn AuditSink, pending: PendingAudit) {
    if let Err(err) = sink.log_inventory_change(&pending.change) {
        warn!(
            tenant_id = %pending.change.tenant_id,
            product_id = %pending.change.product_id,
            error = %err,
            "audit sink rejected inventory change"
        );
    }
    if let Some(alert) = pending.alert {
        warn!(
            tenant_id = %alert.tenant_id,
            product_id = %alert.product_id,
            available = alert.available,
            threshold = alert.threshold,
            "low stock"
        );
        if let Err(err) = sink.log_alert_triggered(&alert) {
            warn!(
                tenant_id = %alert.tenant_id,
                product_id = %alert.product_id,
                error = %err,
                "audit sink rejected low stock alert"
            );
        }
    }
}
