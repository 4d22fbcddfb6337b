//! Inventory ledger: the single writer of stock counters and reservations.
//!
//! Every mutation of one product runs under that product's exclusive lock, so
//! the availability check and the counter update form one atomic step. Locks
//! are per `(tenant, product)`; unrelated products never contend.
//!
//! Audit events are published after the lock is released. A failing audit
//! sink is logged and otherwise ignored; it never rolls back a mutation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use merchledger_core::{Clock, DomainError, ProductId, ReservationId, TenantId};
use merchledger_events::{AuditSink, InventoryChangeKind};
use merchledger_inventory::{
    InventoryInfo, ProductInventory, Reservation, ReservationReference, ReservationStatus, StockMovement,
};

use crate::audit::{self, PendingAudit};
use crate::config::Settings;
use crate::error::{ServiceError, ServiceResult};
use crate::store::{InventoryStore, ReservationStore};

const DEFAULT_RESERVATION_TTL_MINUTES: i64 = 15;
const DEFAULT_SWEEP_BATCH_SIZE: usize = 500;

#[derive(Debug, Default)]
struct ProductLocks {
    inner: Mutex<HashMap<(TenantId, ProductId), Arc<Mutex<()>>>>,
}

impl ProductLocks {
    fn handle(&self, tenant_id: TenantId, product_id: ProductId) -> Arc<Mutex<()>> {
        // The map and the per-product mutexes guard no data of their own, so a
        // poisoned lock is still usable.
        let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry((tenant_id, product_id)).or_default().clone()
    }

    /// Drop the map entry once no other caller holds or waits on it.
    fn retire(&self, tenant_id: TenantId, product_id: ProductId, handle: Arc<Mutex<()>>) {
        let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one in `handle`.
        if Arc::strong_count(&handle) == 2 {
            locks.remove(&(tenant_id, product_id));
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// One line of a batch adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub product_id: ProductId,
    pub delta: i64,
    pub reason: Option<String>,
}

#[derive(Debug)]
pub struct AdjustmentOutcome {
    pub product_id: ProductId,
    pub result: ServiceResult<ProductInventory>,
}

impl AdjustmentOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released(Reservation),
    /// The reservation was already consumed, released or expired; nothing changed.
    AlreadyClosed(Reservation),
    /// No such reservation for this tenant; nothing to release.
    Unknown(ReservationId),
}

impl ReleaseOutcome {
    pub fn reservation(&self) -> Option<&Reservation> {
        match self {
            ReleaseOutcome::Released(r) | ReleaseOutcome::AlreadyClosed(r) => Some(r),
            ReleaseOutcome::Unknown(_) => None,
        }
    }

    pub fn was_released(&self) -> bool {
        matches!(self, ReleaseOutcome::Released(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Candidates returned by the store.
    pub examined: usize,
    pub expired: usize,
    /// Closed by someone else between listing and locking.
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub product_id: ProductId,
    pub previous_reserved: i64,
    pub recomputed_reserved: i64,
}

impl ReconcileReport {
    /// Positive when the cached counter was too low.
    pub fn drift(&self) -> i64 {
        self.recomputed_reserved - self.previous_reserved
    }
}

pub struct InventoryLedger<I, R> {
    inventory: I,
    reservations: R,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    reservation_ttl: Option<Duration>,
    sweep_batch_size: usize,
    locks: ProductLocks,
}

impl<I, R> InventoryLedger<I, R>
where
    I: InventoryStore,
    R: ReservationStore,
{
    pub fn new(inventory: I, reservations: R, audit: Arc<dyn AuditSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inventory,
            reservations,
            audit,
            clock,
            reservation_ttl: Some(Duration::minutes(DEFAULT_RESERVATION_TTL_MINUTES)),
            sweep_batch_size: DEFAULT_SWEEP_BATCH_SIZE,
            locks: ProductLocks::default(),
        }
    }

    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.reservation_ttl = settings.reservation_ttl();
        self.sweep_batch_size = settings.sweep_batch_size.max(1);
        self
    }

    /// `None` makes new reservations permanent until released or consumed.
    pub fn with_reservation_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.reservation_ttl = ttl;
        self
    }

    pub fn reservation_store(&self) -> &R {
        &self.reservations
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn initialize(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        info: InventoryInfo,
    ) -> ServiceResult<ProductInventory> {
        let now = self.clock.now();
        let (row, pending) = self.with_product_lock(tenant_id, product_id, || {
            if self.inventory.get(tenant_id, product_id)?.is_some() {
                return Err(DomainError::conflict(format!(
                    "inventory for product {product_id} is already initialized"
                ))
                .into());
            }
            let row = ProductInventory::new(tenant_id, product_id, info, now)?;
            self.inventory.insert(&row)?;
            let movement = StockMovement::new(InventoryChangeKind::Initialized, info.stock_quantity, info, info);
            Ok((row, PendingAudit::from_movement(&movement, tenant_id, product_id, None, None, now)))
        })?;

        info!(
            tenant_id = %tenant_id,
            product_id = %product_id,
            stock_quantity = info.stock_quantity,
            track_inventory = info.track_inventory,
            "inventory initialized"
        );
        self.publish(pending);
        Ok(row)
    }

    pub fn get(&self, tenant_id: TenantId, product_id: ProductId) -> ServiceResult<ProductInventory> {
        self.load_row(tenant_id, product_id)
    }

    pub fn update_settings(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        low_stock_threshold: i64,
        track_inventory: bool,
    ) -> ServiceResult<ProductInventory> {
        let now = self.clock.now();
        let (row, pending) = self.with_product_lock(tenant_id, product_id, || {
            let mut row = self.load_row(tenant_id, product_id)?;
            let movement = row.update_settings(low_stock_threshold, track_inventory, now)?;
            self.inventory.save(&row)?;
            Ok((row, PendingAudit::from_movement(&movement, tenant_id, product_id, None, None, now)))
        })?;

        info!(
            tenant_id = %tenant_id,
            product_id = %product_id,
            low_stock_threshold,
            track_inventory,
            "inventory settings updated"
        );
        self.publish(pending);
        Ok(row)
    }

    /// Apply a signed stock delta. Fails with `InsufficientInventory` if stock
    /// would drop below the reserved quantity.
    pub fn adjust(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        delta: i64,
        reason: Option<String>,
    ) -> ServiceResult<ProductInventory> {
        let now = self.clock.now();
        let result = self.with_product_lock(tenant_id, product_id, || {
            let mut row = self.load_row(tenant_id, product_id)?;
            let movement = row.adjust(delta, now)?;
            self.inventory.save(&row)?;
            Ok((row, PendingAudit::from_movement(&movement, tenant_id, product_id, None, reason, now)))
        });

        match result {
            Ok((row, pending)) => {
                info!(
                    tenant_id = %tenant_id,
                    product_id = %product_id,
                    delta,
                    stock_quantity = row.info().stock_quantity,
                    "inventory adjusted"
                );
                self.publish(pending);
                Ok(row)
            }
            Err(err) => {
                debug!(tenant_id = %tenant_id, product_id = %product_id, delta, error = %err, "adjust rejected");
                Err(err)
            }
        }
    }

    /// Adjust several products; each line commits or fails on its own.
    pub fn batch_adjust(&self, tenant_id: TenantId, items: &[StockAdjustment]) -> Vec<AdjustmentOutcome> {
        let outcomes: Vec<AdjustmentOutcome> = items
            .iter()
            .map(|item| AdjustmentOutcome {
                product_id: item.product_id,
                result: self.adjust(tenant_id, item.product_id, item.delta, item.reason.clone()),
            })
            .collect();

        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        if failed > 0 {
            warn!(tenant_id = %tenant_id, total = outcomes.len(), failed, "batch adjust partially failed");
        }
        outcomes
    }

    /// Hold `quantity` units for a cart or order line.
    pub fn reserve(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        quantity: i64,
        reference: ReservationReference,
    ) -> ServiceResult<Reservation> {
        reference.validate()?;
        let now = self.clock.now();
        let result = self.with_product_lock(tenant_id, product_id, || {
            let mut row = self.load_row(tenant_id, product_id)?;
            let previous = row.clone();
            let (holds_stock, movement) = row.reserve(quantity, now)?;
            let reservation = Reservation::open(
                tenant_id,
                product_id,
                quantity,
                reference,
                holds_stock,
                now,
                self.reservation_ttl,
            );

            if holds_stock {
                self.inventory.save(&row)?;
            }
            if let Err(err) = self.reservations.insert(&reservation) {
                if holds_stock {
                    self.restore_row(&previous);
                }
                return Err(err.into());
            }
            let pending = PendingAudit::from_movement(&movement, tenant_id, product_id, Some(reservation.id), None, now);
            Ok((reservation, pending))
        });

        match result {
            Ok((reservation, pending)) => {
                info!(
                    tenant_id = %tenant_id,
                    product_id = %product_id,
                    reservation_id = %reservation.id,
                    quantity,
                    holds_stock = reservation.holds_stock,
                    "inventory reserved"
                );
                self.publish(pending);
                Ok(reservation)
            }
            Err(err) => {
                if let Some(DomainError::InsufficientInventory { requested, available, .. }) = err.as_domain() {
                    info!(
                        tenant_id = %tenant_id,
                        product_id = %product_id,
                        requested,
                        available,
                        "reservation rejected: insufficient inventory"
                    );
                }
                Err(err)
            }
        }
    }

    /// Return a reservation's units to availability. Idempotent: a closed
    /// reservation comes back as `AlreadyClosed`, an unknown id as `Unknown`.
    pub fn release(&self, tenant_id: TenantId, reservation_id: ReservationId) -> ServiceResult<ReleaseOutcome> {
        let Some(existing) = self.reservations.get(tenant_id, reservation_id)? else {
            debug!(tenant_id = %tenant_id, reservation_id = %reservation_id, "release ignored: unknown reservation");
            return Ok(ReleaseOutcome::Unknown(reservation_id));
        };
        let product_id = existing.product_id;
        let now = self.clock.now();

        let (outcome, pending) = self.with_product_lock(tenant_id, product_id, || {
            let mut reservation = self.find_reservation(tenant_id, reservation_id)?;
            if reservation.status.is_terminal() {
                return Ok((ReleaseOutcome::AlreadyClosed(reservation), None));
            }
            let pending = self.close_and_free(&mut reservation, ReservationStatus::Released, now)?;
            Ok((ReleaseOutcome::Released(reservation), Some(pending)))
        })?;

        match (&outcome, pending) {
            (ReleaseOutcome::Released(reservation), Some(pending)) => {
                info!(
                    tenant_id = %tenant_id,
                    product_id = %product_id,
                    reservation_id = %reservation_id,
                    quantity = reservation.reserved_quantity,
                    "reservation released"
                );
                self.publish(pending);
            }
            _ => debug!(
                tenant_id = %tenant_id,
                reservation_id = %reservation_id,
                "release ignored: reservation already closed"
            ),
        }
        Ok(outcome)
    }

    /// Fulfil a reservation: its units leave stock for good.
    ///
    /// Consuming an already consumed reservation returns it unchanged; a
    /// released or expired one fails with `ReservationClosed`.
    pub fn consume(&self, tenant_id: TenantId, reservation_id: ReservationId) -> ServiceResult<Reservation> {
        let product_id = self.find_reservation(tenant_id, reservation_id)?.product_id;
        let now = self.clock.now();

        let (reservation, pending) = self.with_product_lock(tenant_id, product_id, || {
            let mut reservation = self.find_reservation(tenant_id, reservation_id)?;
            match reservation.status {
                ReservationStatus::Consumed => return Ok((reservation, None)),
                ReservationStatus::Released | ReservationStatus::Expired => {
                    return Err(DomainError::reservation_closed(reservation.id, reservation.status.as_str()).into());
                }
                ReservationStatus::Active => {}
            }

            let mut row = self.load_row(tenant_id, product_id)?;
            let previous = row.clone();
            reservation.close(ReservationStatus::Consumed, now)?;
            let movement = if reservation.holds_stock {
                let movement = row.consume_hold(reservation.reserved_quantity, now)?;
                self.inventory.save(&row)?;
                movement
            } else {
                StockMovement::new(InventoryChangeKind::Consumed, reservation.reserved_quantity, row.info(), row.info())
            };
            if let Err(err) = self.reservations.update(&reservation) {
                if reservation.holds_stock {
                    self.restore_row(&previous);
                }
                return Err(err.into());
            }
            let pending = PendingAudit::from_movement(&movement, tenant_id, product_id, Some(reservation.id), None, now);
            Ok((reservation, Some(pending)))
        })?;

        if let Some(pending) = pending {
            info!(
                tenant_id = %tenant_id,
                product_id = %product_id,
                reservation_id = %reservation_id,
                quantity = reservation.reserved_quantity,
                "reservation consumed"
            );
            self.publish(pending);
        }
        Ok(reservation)
    }

    /// Expire active reservations whose deadline is at or before `now`,
    /// returning their units. Each reservation is expired at most once even
    /// when sweeps overlap.
    pub fn expire_sweep(&self, now: DateTime<Utc>) -> ServiceResult<SweepReport> {
        let candidates = self.reservations.get_expired(now, self.sweep_batch_size)?;
        let mut report = SweepReport {
            examined: candidates.len(),
            ..SweepReport::default()
        };

        for candidate in candidates {
            match self.expire_one(candidate.tenant_id, candidate.product_id, candidate.id, now) {
                Ok(true) => report.expired += 1,
                Ok(false) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    error!(
                        tenant_id = %candidate.tenant_id,
                        reservation_id = %candidate.id,
                        error = %err,
                        "failed to expire reservation"
                    );
                }
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                "expire sweep finished"
            );
        }
        Ok(report)
    }

    /// Recompute the cached reserved counter from the active reservations
    /// that hold stock, repairing drift.
    pub fn reconcile(&self, tenant_id: TenantId, product_id: ProductId) -> ServiceResult<ReconcileReport> {
        let now = self.clock.now();
        let (report, pending) = self.with_product_lock(tenant_id, product_id, || {
            let mut row = self.load_row(tenant_id, product_id)?;
            let computed = self.reservations.sum_active_reserved_quantity(tenant_id, product_id)?;
            let report = ReconcileReport {
                product_id,
                previous_reserved: row.info().reserved_quantity,
                recomputed_reserved: computed,
            };
            if report.drift() == 0 {
                return Ok((report, None));
            }
            let movement = row.reconcile_reserved(computed, now)?;
            self.inventory.save(&row)?;
            let reason = Some(format!("reserved counter drifted by {}", report.drift()));
            Ok((report, Some(PendingAudit::from_movement(&movement, tenant_id, product_id, None, reason, now))))
        })?;

        if let Some(pending) = pending {
            warn!(
                tenant_id = %tenant_id,
                product_id = %product_id,
                previous_reserved = report.previous_reserved,
                recomputed_reserved = report.recomputed_reserved,
                "reserved counter repaired"
            );
            self.publish(pending);
        }
        Ok(report)
    }

    pub fn get_reservation(&self, tenant_id: TenantId, reservation_id: ReservationId) -> ServiceResult<Reservation> {
        self.find_reservation(tenant_id, reservation_id)
    }

    pub fn reservations_by_reference(
        &self,
        tenant_id: TenantId,
        reference: &ReservationReference,
    ) -> ServiceResult<Vec<Reservation>> {
        Ok(self.reservations.get_by_reference(tenant_id, reference)?)
    }

    pub fn active_reservations(&self, tenant_id: TenantId, product_id: ProductId) -> ServiceResult<Vec<Reservation>> {
        Ok(self.reservations.get_active_by_product(tenant_id, product_id)?)
    }

    fn expire_one(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        reservation_id: ReservationId,
        now: DateTime<Utc>,
    ) -> ServiceResult<bool> {
        let pending = self.with_product_lock(tenant_id, product_id, || {
            let mut reservation = self.find_reservation(tenant_id, reservation_id)?;
            if !reservation.is_expired_at(now) {
                return Ok(None);
            }
            self.close_and_free(&mut reservation, ReservationStatus::Expired, now).map(Some)
        })?;

        match pending {
            Some(pending) => {
                debug!(tenant_id = %tenant_id, reservation_id = %reservation_id, "reservation expired");
                self.publish(pending);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Close an active reservation as released or expired and return its held
    /// units. Caller holds the product lock.
    fn close_and_free(
        &self,
        reservation: &mut Reservation,
        status: ReservationStatus,
        now: DateTime<Utc>,
    ) -> ServiceResult<PendingAudit> {
        let kind = match status {
            ReservationStatus::Expired => InventoryChangeKind::Expired,
            _ => InventoryChangeKind::Released,
        };
        let (tenant_id, product_id) = (reservation.tenant_id, reservation.product_id);
        let mut row = self.load_row(tenant_id, product_id)?;
        let previous = row.clone();

        reservation.close(status, now)?;
        let movement = if reservation.holds_stock {
            let movement = row.release_hold(kind, reservation.reserved_quantity, now);
            if movement.quantity != reservation.reserved_quantity {
                warn!(
                    tenant_id = %tenant_id,
                    product_id = %product_id,
                    reservation_id = %reservation.id,
                    expected = reservation.reserved_quantity,
                    freed = movement.quantity,
                    "reserved counter below reservation quantity; reconcile recommended"
                );
            }
            self.inventory.save(&row)?;
            movement
        } else {
            StockMovement::new(kind, reservation.reserved_quantity, row.info(), row.info())
        };

        if let Err(err) = self.reservations.update(reservation) {
            if reservation.holds_stock {
                self.restore_row(&previous);
            }
            return Err(err.into());
        }
        Ok(PendingAudit::from_movement(&movement, tenant_id, product_id, Some(reservation.id), None, now))
    }

    fn with_product_lock<T, F>(&self, tenant_id: TenantId, product_id: ProductId, f: F) -> ServiceResult<T>
    where
        F: FnOnce() -> ServiceResult<T>,
    {
        let lock = self.locks.handle(tenant_id, product_id);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        self.locks.retire(tenant_id, product_id, lock);
        result
    }

    fn load_row(&self, tenant_id: TenantId, product_id: ProductId) -> ServiceResult<ProductInventory> {
        self.inventory
            .get(tenant_id, product_id)?
            .ok_or_else(|| DomainError::not_found(format!("inventory for product {product_id}")).into())
    }

    fn find_reservation(&self, tenant_id: TenantId, reservation_id: ReservationId) -> ServiceResult<Reservation> {
        self.reservations
            .get(tenant_id, reservation_id)?
            .ok_or_else(|| ServiceError::from(DomainError::ReservationNotFound(reservation_id)))
    }

    /// Undo a counter write whose companion reservation write failed.
    fn restore_row(&self, previous: &ProductInventory) {
        if let Err(err) = self.inventory.save(previous) {
            error!(
                tenant_id = %previous.tenant_id(),
                product_id = %previous.product_id(),
                error = %err,
                "failed to restore inventory row; reconcile required"
            );
        }
    }

    fn publish(&self, pending: PendingAudit) {
        audit::publish(self.audit.as_ref(), pending);
    }
}
