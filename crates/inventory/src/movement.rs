use chrono::{DateTime, Utc};
use uuid::Uuid;

use merchledger_core::{ProductId, ReservationId, TenantId};
use merchledger_events::{InventoryChangeKind, InventoryChanged, LowStockAlert};

use crate::info::InventoryInfo;

/// Before/after snapshot of one ledger transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockMovement {
    pub kind: InventoryChangeKind,
    pub quantity: i64,
    pub before: InventoryInfo,
    pub after: InventoryInfo,
}

impl StockMovement {
    pub fn new(kind: InventoryChangeKind, quantity: i64, before: InventoryInfo, after: InventoryInfo) -> Self {
        Self {
            kind,
            quantity,
            before,
            after,
        }
    }

    /// True when this transition pushed a tracked product into low stock.
    pub fn crossed_low_stock(&self) -> bool {
        self.after.is_low_stock() && !self.before.is_low_stock()
    }

    pub fn to_change(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        reservation_id: Option<ReservationId>,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> InventoryChanged {
        InventoryChanged {
            event_id: Uuid::now_v7(),
            tenant_id,
            product_id,
            reservation_id,
            kind: self.kind,
            quantity: self.quantity,
            stock_after: self.after.stock_quantity,
            reserved_after: self.after.reserved_quantity,
            reason,
            occurred_at,
        }
    }

    pub fn to_alert(&self, tenant_id: TenantId, product_id: ProductId, occurred_at: DateTime<Utc>) -> LowStockAlert {
        LowStockAlert {
            event_id: Uuid::now_v7(),
            tenant_id,
            product_id,
            available: self.after.available(),
            threshold: self.after.low_stock_threshold,
            occurred_at,
        }
    }
}
