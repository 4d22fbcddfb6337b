use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use merchledger_core::{DomainError, DomainResult, ProductId, TenantId};
use merchledger_events::InventoryChangeKind;

use crate::movement::StockMovement;

/// Stock counters for one product.
///
/// Invariant: `0 <= reserved_quantity <= stock_quantity`, hence
/// `available() >= 0`. Only `ProductInventory` transitions mutate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryInfo {
    pub stock_quantity: i64,
    pub reserved_quantity: i64,
    pub low_stock_threshold: i64,
    pub track_inventory: bool,
}

impl InventoryInfo {
    /// Tracked inventory with nothing reserved.
    pub fn tracked(stock_quantity: i64, low_stock_threshold: i64) -> Self {
        Self {
            stock_quantity,
            reserved_quantity: 0,
            low_stock_threshold,
            track_inventory: true,
        }
    }

    /// Inventory that is never held by reservations (made-to-order, digital goods).
    pub fn untracked() -> Self {
        Self {
            stock_quantity: 0,
            reserved_quantity: 0,
            low_stock_threshold: 0,
            track_inventory: false,
        }
    }

    pub fn available(&self) -> i64 {
        self.stock_quantity - self.reserved_quantity
    }

    pub fn is_low_stock(&self) -> bool {
        self.track_inventory && self.available() <= self.low_stock_threshold
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.stock_quantity < 0 {
            return Err(DomainError::validation("stock_quantity cannot be negative"));
        }
        if self.reserved_quantity < 0 {
            return Err(DomainError::validation("reserved_quantity cannot be negative"));
        }
        if self.reserved_quantity > self.stock_quantity {
            return Err(DomainError::invariant(
                "reserved_quantity cannot exceed stock_quantity",
            ));
        }
        if self.low_stock_threshold < 0 {
            return Err(DomainError::validation("low_stock_threshold cannot be negative"));
        }
        Ok(())
    }
}

/// The inventory row of one product within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInventory {
    tenant_id: TenantId,
    product_id: ProductId,
    info: InventoryInfo,
    version: u64,
    updated_at: DateTime<Utc>,
}

impl ProductInventory {
    pub fn new(
        tenant_id: TenantId,
        product_id: ProductId,
        info: InventoryInfo,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        info.validate()?;
        Ok(Self {
            tenant_id,
            product_id,
            info,
            version: 1,
            updated_at: at,
        })
    }

    /// Rebuild a row loaded from storage without re-running creation checks.
    pub fn restore(
        tenant_id: TenantId,
        product_id: ProductId,
        info: InventoryInfo,
        version: u64,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id,
            product_id,
            info,
            version,
            updated_at,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn info(&self) -> InventoryInfo {
        self.info
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Apply a signed delta to `stock_quantity`.
    ///
    /// Stock may never drop below what is currently reserved.
    pub fn adjust(&mut self, delta: i64, at: DateTime<Utc>) -> DomainResult<StockMovement> {
        if delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }
        let new_stock = self
            .info
            .stock_quantity
            .checked_add(delta)
            .ok_or_else(|| DomainError::validation("stock quantity overflow"))?;
        if new_stock < self.info.reserved_quantity {
            return Err(DomainError::insufficient_inventory(
                self.product_id,
                -delta,
                self.info.available(),
            ));
        }

        let before = self.info;
        self.info.stock_quantity = new_stock;
        self.touch(at);
        Ok(StockMovement::new(InventoryChangeKind::Adjusted, delta, before, self.info))
    }

    /// Hold `quantity` units for a reservation.
    ///
    /// Returns whether stock is actually held: untracked products accept every
    /// reservation and leave the counters alone.
    pub fn reserve(&mut self, quantity: i64, at: DateTime<Utc>) -> DomainResult<(bool, StockMovement)> {
        if quantity <= 0 {
            return Err(DomainError::validation("reservation quantity must be positive"));
        }
        let before = self.info;
        if !self.info.track_inventory {
            return Ok((false, StockMovement::new(InventoryChangeKind::Reserved, quantity, before, before)));
        }

        let available = self.info.available();
        if available < quantity {
            return Err(DomainError::insufficient_inventory(self.product_id, quantity, available));
        }

        self.info.reserved_quantity += quantity;
        self.touch(at);
        Ok((true, StockMovement::new(InventoryChangeKind::Reserved, quantity, before, self.info)))
    }

    /// Return held units to availability (release or expiry).
    ///
    /// The counter is clamped at zero so a drifted counter cannot block
    /// reclamation; `StockMovement::quantity` reports what was actually freed.
    pub fn release_hold(
        &mut self,
        kind: InventoryChangeKind,
        quantity: i64,
        at: DateTime<Utc>,
    ) -> StockMovement {
        let before = self.info;
        let freed = quantity.clamp(0, self.info.reserved_quantity);
        self.info.reserved_quantity -= freed;
        self.touch(at);
        StockMovement::new(kind, freed, before, self.info)
    }

    /// Permanently remove held units from stock (fulfilment).
    pub fn consume_hold(&mut self, quantity: i64, at: DateTime<Utc>) -> DomainResult<StockMovement> {
        if quantity > self.info.reserved_quantity {
            return Err(DomainError::invariant(format!(
                "reserved counter ({}) is below the consumed quantity ({quantity}); reconcile required",
                self.info.reserved_quantity
            )));
        }
        let before = self.info;
        self.info.reserved_quantity -= quantity;
        self.info.stock_quantity -= quantity;
        self.touch(at);
        Ok(StockMovement::new(InventoryChangeKind::Consumed, quantity, before, self.info))
    }

    /// Overwrite the cached reserved counter with a value recomputed from
    /// active reservations.
    pub fn reconcile_reserved(&mut self, computed: i64, at: DateTime<Utc>) -> DomainResult<StockMovement> {
        if computed < 0 || computed > self.info.stock_quantity {
            return Err(DomainError::invariant(format!(
                "recomputed reserved quantity {computed} is outside 0..={}",
                self.info.stock_quantity
            )));
        }
        let before = self.info;
        self.info.reserved_quantity = computed;
        self.touch(at);
        Ok(StockMovement::new(
            InventoryChangeKind::Reconciled,
            computed - before.reserved_quantity,
            before,
            self.info,
        ))
    }

    pub fn update_settings(
        &mut self,
        low_stock_threshold: i64,
        track_inventory: bool,
        at: DateTime<Utc>,
    ) -> DomainResult<StockMovement> {
        if low_stock_threshold < 0 {
            return Err(DomainError::validation("low_stock_threshold cannot be negative"));
        }
        let before = self.info;
        self.info.low_stock_threshold = low_stock_threshold;
        self.info.track_inventory = track_inventory;
        self.touch(at);
        Ok(StockMovement::new(InventoryChangeKind::SettingsUpdated, 0, before, self.info))
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = at;
    }
}
