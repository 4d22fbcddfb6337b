//! Postgres-backed inventory ledger.
//!
//! Each mutation runs in one transaction that takes a row lock on the
//! product's inventory row (`SELECT ... FOR UPDATE`) before touching any
//! reservation of that product. The counter update and the reservation write
//! therefore commit or roll back together, so the cached reserved counter
//! cannot drift. Lock order is always inventory row, then reservation.
//!
//! ## Error Mapping
//!
//! | PostgreSQL error code | StoreError |
//! |-----------------------|------------|
//! | `23505` unique violation | `Duplicate` |
//! | anything else | `Backend` |
//!
//! Audit events are published after commit. A dropped transaction rolls back.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use merchledger_core::{Clock, DomainError, ProductId, ReservationId, TenantId};
use merchledger_events::{AuditSink, InventoryChangeKind};
use merchledger_inventory::{
    InventoryInfo, ProductInventory, Reservation, ReservationReference, ReservationStatus, StockMovement,
};

use crate::audit::{self, PendingAudit};
use crate::config::Settings;
use crate::error::{ServiceResult, StoreError};
use crate::ledger::{ReconcileReport, ReleaseOutcome, SweepReport};

const DEFAULT_RESERVATION_TTL_MINUTES: i64 = 15;
const DEFAULT_SWEEP_BATCH_SIZE: i64 = 500;

const INVENTORY_COLUMNS: &str =
    "tenant_id, product_id, stock_quantity, reserved_quantity, low_stock_threshold, track_inventory, version, updated_at";
const RESERVATION_COLUMNS: &str = "id, tenant_id, product_id, reserved_quantity, reference_type, reference_id, \
     status, holds_stock, created_at, expires_at, closed_at";

/// Schema of the two ledger tables. Safe to run repeatedly.
pub const MIGRATION: &str = include_str!("../migrations/0001_inventory_ledger.sql");

type Tx = Transaction<'static, Postgres>;

pub struct PostgresLedger {
    pool: PgPool,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    reservation_ttl: Option<Duration>,
    sweep_batch_size: i64,
}

impl PostgresLedger {
    pub fn new(pool: PgPool, audit: Arc<dyn AuditSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            audit,
            clock,
            reservation_ttl: Some(Duration::minutes(DEFAULT_RESERVATION_TTL_MINUTES)),
            sweep_batch_size: DEFAULT_SWEEP_BATCH_SIZE,
        }
    }

    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.reservation_ttl = settings.reservation_ttl();
        self.sweep_batch_size = i64::try_from(settings.sweep_batch_size.max(1)).unwrap_or(DEFAULT_SWEEP_BATCH_SIZE);
        self
    }

    /// Create the ledger tables if they do not exist.
    pub async fn migrate(&self) -> ServiceResult<()> {
        sqlx::raw_sql(MIGRATION)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    #[instrument(skip(self, info), fields(tenant_id = %tenant_id, product_id = %product_id), err)]
    pub async fn initialize(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        info: InventoryInfo,
    ) -> ServiceResult<ProductInventory> {
        let now = self.clock.now();
        let row = ProductInventory::new(tenant_id, product_id, info, now)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO product_inventory (
                tenant_id, product_id, stock_quantity, reserved_quantity,
                low_stock_threshold, track_inventory, version, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (tenant_id, product_id) DO NOTHING
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(product_id.as_uuid())
        .bind(info.stock_quantity)
        .bind(info.reserved_quantity)
        .bind(info.low_stock_threshold)
        .bind(info.track_inventory)
        .bind(version_to_db(row.version()))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("initialize", e))?
        .rows_affected();

        if inserted == 0 {
            return Err(DomainError::conflict(format!("inventory for product {product_id} is already initialized")).into());
        }

        info!(stock_quantity = info.stock_quantity, track_inventory = info.track_inventory, "inventory initialized");
        let movement = StockMovement::new(InventoryChangeKind::Initialized, info.stock_quantity, info, info);
        self.publish(PendingAudit::from_movement(&movement, tenant_id, product_id, None, None, now));
        Ok(row)
    }

    pub async fn get(&self, tenant_id: TenantId, product_id: ProductId) -> ServiceResult<ProductInventory> {
        let row = sqlx::query(&format!(
            "SELECT {INVENTORY_COLUMNS} FROM product_inventory WHERE tenant_id = $1 AND product_id = $2"
        ))
        .bind(tenant_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_inventory", e))?;

        match row {
            Some(row) => Ok(inventory_from_row(&row)?),
            None => Err(DomainError::not_found(format!("inventory for product {product_id}")).into()),
        }
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, product_id = %product_id), err)]
    pub async fn update_settings(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        low_stock_threshold: i64,
        track_inventory: bool,
    ) -> ServiceResult<ProductInventory> {
        let now = self.clock.now();
        let mut tx = self.begin().await?;
        let mut row = lock_inventory(&mut tx, tenant_id, product_id).await?;
        let movement = row.update_settings(low_stock_threshold, track_inventory, now)?;
        save_inventory(&mut tx, &row).await?;
        commit(tx).await?;

        self.publish(PendingAudit::from_movement(&movement, tenant_id, product_id, None, None, now));
        Ok(row)
    }

    #[instrument(skip(self, reason), fields(tenant_id = %tenant_id, product_id = %product_id), err)]
    pub async fn adjust(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        delta: i64,
        reason: Option<String>,
    ) -> ServiceResult<ProductInventory> {
        let now = self.clock.now();
        let mut tx = self.begin().await?;
        let mut row = lock_inventory(&mut tx, tenant_id, product_id).await?;
        let movement = row.adjust(delta, now)?;
        save_inventory(&mut tx, &row).await?;
        commit(tx).await?;

        info!(delta, stock_quantity = row.info().stock_quantity, "inventory adjusted");
        self.publish(PendingAudit::from_movement(&movement, tenant_id, product_id, None, reason, now));
        Ok(row)
    }

    #[instrument(skip(self, reference), fields(tenant_id = %tenant_id, product_id = %product_id), err)]
    pub async fn reserve(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        quantity: i64,
        reference: ReservationReference,
    ) -> ServiceResult<Reservation> {
        reference.validate()?;
        let now = self.clock.now();
        let mut tx = self.begin().await?;
        let mut row = lock_inventory(&mut tx, tenant_id, product_id).await?;
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
            save_inventory(&mut tx, &row).await?;
        }
        insert_reservation(&mut tx, &reservation).await?;
        commit(tx).await?;

        info!(reservation_id = %reservation.id, quantity, holds_stock, "inventory reserved");
        self.publish(PendingAudit::from_movement(
            &movement,
            tenant_id,
            product_id,
            Some(reservation.id),
            None,
            now,
        ));
        Ok(reservation)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, reservation_id = %reservation_id), err)]
    pub async fn release(&self, tenant_id: TenantId, reservation_id: ReservationId) -> ServiceResult<ReleaseOutcome> {
        let product_id = match self.get_reservation(tenant_id, reservation_id).await {
            Ok(existing) => existing.product_id,
            Err(err) if matches!(err.as_domain(), Some(DomainError::ReservationNotFound(_))) => {
                debug!("release ignored: unknown reservation");
                return Ok(ReleaseOutcome::Unknown(reservation_id));
            }
            Err(err) => return Err(err),
        };
        let now = self.clock.now();
        let mut tx = self.begin().await?;
        let mut row = lock_inventory(&mut tx, tenant_id, product_id).await?;
        let mut reservation = lock_reservation(&mut tx, tenant_id, reservation_id).await?;
        if reservation.status.is_terminal() {
            debug!(status = %reservation.status, "release ignored: reservation already closed");
            return Ok(ReleaseOutcome::AlreadyClosed(reservation));
        }

        let movement = close_and_free(&mut tx, &mut row, &mut reservation, ReservationStatus::Released, now).await?;
        commit(tx).await?;

        info!(quantity = reservation.reserved_quantity, "reservation released");
        self.publish(PendingAudit::from_movement(
            &movement,
            tenant_id,
            product_id,
            Some(reservation_id),
            None,
            now,
        ));
        Ok(ReleaseOutcome::Released(reservation))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, reservation_id = %reservation_id), err)]
    pub async fn consume(&self, tenant_id: TenantId, reservation_id: ReservationId) -> ServiceResult<Reservation> {
        let product_id = self.get_reservation(tenant_id, reservation_id).await?.product_id;
        let now = self.clock.now();
        let mut tx = self.begin().await?;
        let mut row = lock_inventory(&mut tx, tenant_id, product_id).await?;
        let mut reservation = lock_reservation(&mut tx, tenant_id, reservation_id).await?;
        match reservation.status {
            ReservationStatus::Consumed => return Ok(reservation),
            ReservationStatus::Released | ReservationStatus::Expired => {
                return Err(DomainError::reservation_closed(reservation.id, reservation.status.as_str()).into());
            }
            ReservationStatus::Active => {}
        }

        reservation.close(ReservationStatus::Consumed, now)?;
        let movement = if reservation.holds_stock {
            let movement = row.consume_hold(reservation.reserved_quantity, now)?;
            save_inventory(&mut tx, &row).await?;
            movement
        } else {
            StockMovement::new(InventoryChangeKind::Consumed, reservation.reserved_quantity, row.info(), row.info())
        };
        update_reservation(&mut tx, &reservation).await?;
        commit(tx).await?;

        info!(quantity = reservation.reserved_quantity, "reservation consumed");
        self.publish(PendingAudit::from_movement(
            &movement,
            tenant_id,
            product_id,
            Some(reservation_id),
            None,
            now,
        ));
        Ok(reservation)
    }

    /// Expire overdue reservations, one transaction each. Candidates are
    /// listed without locks and re-checked under lock, so overlapping sweeps
    /// (including sweeps from other processes) expire each reservation once.
    #[instrument(skip(self), err)]
    pub async fn expire_sweep(&self, now: DateTime<Utc>) -> ServiceResult<SweepReport> {
        let candidates = sqlx::query(
            r#"
            SELECT id, tenant_id, product_id
            FROM inventory_reservations
            WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at <= $1
            ORDER BY expires_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(self.sweep_batch_size)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_expired", e))?;

        let mut report = SweepReport {
            examined: candidates.len(),
            ..SweepReport::default()
        };
        for candidate in candidates {
            let (id, tenant_id, product_id) = (
                ReservationId::from_uuid(column(&candidate, "id")?),
                TenantId::from_uuid(column(&candidate, "tenant_id")?),
                ProductId::from_uuid(column(&candidate, "product_id")?),
            );
            match self.expire_one(tenant_id, product_id, id, now).await {
                Ok(true) => report.expired += 1,
                Ok(false) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    error!(tenant_id = %tenant_id, reservation_id = %id, error = %err, "failed to expire reservation");
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

    #[instrument(skip(self), fields(tenant_id = %tenant_id, product_id = %product_id), err)]
    pub async fn reconcile(&self, tenant_id: TenantId, product_id: ProductId) -> ServiceResult<ReconcileReport> {
        let now = self.clock.now();
        let mut tx = self.begin().await?;
        let mut row = lock_inventory(&mut tx, tenant_id, product_id).await?;
        let computed: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(reserved_quantity), 0)::BIGINT
            FROM inventory_reservations
            WHERE tenant_id = $1 AND product_id = $2 AND status = 'active' AND holds_stock
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("sum_active_reserved", e))?;

        let report = ReconcileReport {
            product_id,
            previous_reserved: row.info().reserved_quantity,
            recomputed_reserved: computed,
        };
        if report.drift() == 0 {
            return Ok(report);
        }

        let movement = row.reconcile_reserved(computed, now)?;
        save_inventory(&mut tx, &row).await?;
        commit(tx).await?;

        warn!(
            previous_reserved = report.previous_reserved,
            recomputed_reserved = report.recomputed_reserved,
            "reserved counter repaired"
        );
        let reason = Some(format!("reserved counter drifted by {}", report.drift()));
        self.publish(PendingAudit::from_movement(&movement, tenant_id, product_id, None, reason, now));
        Ok(report)
    }

    pub async fn get_reservation(&self, tenant_id: TenantId, reservation_id: ReservationId) -> ServiceResult<Reservation> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM inventory_reservations WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id.as_uuid())
        .bind(reservation_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_reservation", e))?;

        match row {
            Some(row) => reservation_from_row(&row),
            None => Err(DomainError::ReservationNotFound(reservation_id).into()),
        }
    }

    pub async fn reservations_by_reference(
        &self,
        tenant_id: TenantId,
        reference: &ReservationReference,
    ) -> ServiceResult<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM inventory_reservations \
             WHERE tenant_id = $1 AND reference_type = $2 AND reference_id = $3 \
             ORDER BY created_at ASC"
        ))
        .bind(tenant_id.as_uuid())
        .bind(reference.reference_type.as_str())
        .bind(&reference.reference_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("reservations_by_reference", e))?;

        rows.iter().map(reservation_from_row).collect()
    }

    pub async fn active_reservations(&self, tenant_id: TenantId, product_id: ProductId) -> ServiceResult<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM inventory_reservations \
             WHERE tenant_id = $1 AND product_id = $2 AND status = 'active' \
             ORDER BY created_at ASC"
        ))
        .bind(tenant_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("active_reservations", e))?;

        rows.iter().map(reservation_from_row).collect()
    }

    async fn expire_one(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        reservation_id: ReservationId,
        now: DateTime<Utc>,
    ) -> ServiceResult<bool> {
        let mut tx = self.begin().await?;
        let mut row = lock_inventory(&mut tx, tenant_id, product_id).await?;
        let mut reservation = lock_reservation(&mut tx, tenant_id, reservation_id).await?;
        if !reservation.is_expired_at(now) {
            return Ok(false);
        }

        let movement = close_and_free(&mut tx, &mut row, &mut reservation, ReservationStatus::Expired, now).await?;
        commit(tx).await?;

        debug!(tenant_id = %tenant_id, reservation_id = %reservation_id, "reservation expired");
        self.publish(PendingAudit::from_movement(
            &movement,
            tenant_id,
            product_id,
            Some(reservation_id),
            None,
            now,
        ));
        Ok(true)
    }

    async fn begin(&self) -> ServiceResult<Tx> {
        Ok(self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?)
    }

    fn publish(&self, pending: PendingAudit) {
        audit::publish(self.audit.as_ref(), pending);
    }
}

async fn commit(tx: Tx) -> ServiceResult<()> {
    tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
    Ok(())
}

async fn lock_inventory(tx: &mut Tx, tenant_id: TenantId, product_id: ProductId) -> ServiceResult<ProductInventory> {
    let row = sqlx::query(&format!(
        "SELECT {INVENTORY_COLUMNS} FROM product_inventory \
         WHERE tenant_id = $1 AND product_id = $2 FOR UPDATE"
    ))
    .bind(tenant_id.as_uuid())
    .bind(product_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_inventory", e))?;

    match row {
        Some(row) => Ok(inventory_from_row(&row)?),
        None => Err(DomainError::not_found(format!("inventory for product {product_id}")).into()),
    }
}

async fn lock_reservation(tx: &mut Tx, tenant_id: TenantId, reservation_id: ReservationId) -> ServiceResult<Reservation> {
    let row = sqlx::query(&format!(
        "SELECT {RESERVATION_COLUMNS} FROM inventory_reservations \
         WHERE tenant_id = $1 AND id = $2 FOR UPDATE"
    ))
    .bind(tenant_id.as_uuid())
    .bind(reservation_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_reservation", e))?;

    match row {
        Some(row) => reservation_from_row(&row),
        None => Err(DomainError::ReservationNotFound(reservation_id).into()),
    }
}

async fn save_inventory(tx: &mut Tx, row: &ProductInventory) -> Result<(), StoreError> {
    let info = row.info();
    sqlx::query(
        r#"
        UPDATE product_inventory
        SET stock_quantity = $3,
            reserved_quantity = $4,
            low_stock_threshold = $5,
            track_inventory = $6,
            version = $7,
            updated_at = $8
        WHERE tenant_id = $1 AND product_id = $2
        "#,
    )
    .bind(row.tenant_id().as_uuid())
    .bind(row.product_id().as_uuid())
    .bind(info.stock_quantity)
    .bind(info.reserved_quantity)
    .bind(info.low_stock_threshold)
    .bind(info.track_inventory)
    .bind(version_to_db(row.version()))
    .bind(row.updated_at())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("save_inventory", e))?;
    Ok(())
}

async fn insert_reservation(tx: &mut Tx, reservation: &Reservation) -> Result<(), StoreError> {
    sqlx::query(&format!(
        "INSERT INTO inventory_reservations ({RESERVATION_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
    ))
    .bind(reservation.id.as_uuid())
    .bind(reservation.tenant_id.as_uuid())
    .bind(reservation.product_id.as_uuid())
    .bind(reservation.reserved_quantity)
    .bind(reservation.reference.reference_type.as_str())
    .bind(&reservation.reference.reference_id)
    .bind(reservation.status.as_str())
    .bind(reservation.holds_stock)
    .bind(reservation.created_at)
    .bind(reservation.expires_at)
    .bind(reservation.closed_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_reservation", e))?;
    Ok(())
}

async fn update_reservation(tx: &mut Tx, reservation: &Reservation) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE inventory_reservations
        SET status = $3, closed_at = $4
        WHERE tenant_id = $1 AND id = $2
        "#,
    )
    .bind(reservation.tenant_id.as_uuid())
    .bind(reservation.id.as_uuid())
    .bind(reservation.status.as_str())
    .bind(reservation.closed_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_reservation", e))?;
    Ok(())
}

/// Close an active reservation as released or expired and return its units.
/// Both rows are already locked by `tx`.
async fn close_and_free(
    tx: &mut Tx,
    row: &mut ProductInventory,
    reservation: &mut Reservation,
    status: ReservationStatus,
    now: DateTime<Utc>,
) -> ServiceResult<StockMovement> {
    let kind = match status {
        ReservationStatus::Expired => InventoryChangeKind::Expired,
        _ => InventoryChangeKind::Released,
    };
    reservation.close(status, now)?;
    let movement = if reservation.holds_stock {
        let movement = row.release_hold(kind, reservation.reserved_quantity, now);
        if movement.quantity != reservation.reserved_quantity {
            warn!(
                reservation_id = %reservation.id,
                expected = reservation.reserved_quantity,
                freed = movement.quantity,
                "reserved counter below reservation quantity; reconcile recommended"
            );
        }
        save_inventory(tx, row).await?;
        movement
    } else {
        StockMovement::new(kind, reservation.reserved_quantity, row.info(), row.info())
    };
    update_reservation(tx, reservation).await?;
    Ok(movement)
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Backend(format!("failed to decode column {name}: {e}")))
}

fn inventory_from_row(row: &PgRow) -> Result<ProductInventory, StoreError> {
    let info = InventoryInfo {
        stock_quantity: column(row, "stock_quantity")?,
        reserved_quantity: column(row, "reserved_quantity")?,
        low_stock_threshold: column(row, "low_stock_threshold")?,
        track_inventory: column(row, "track_inventory")?,
    };
    let version: i64 = column(row, "version")?;
    Ok(ProductInventory::restore(
        TenantId::from_uuid(column::<Uuid>(row, "tenant_id")?),
        ProductId::from_uuid(column::<Uuid>(row, "product_id")?),
        info,
        u64::try_from(version).unwrap_or_default(),
        column(row, "updated_at")?,
    ))
}

fn reservation_from_row(row: &PgRow) -> ServiceResult<Reservation> {
    let status: String = column(row, "status")?;
    let reference_type: String = column(row, "reference_type")?;
    Ok(Reservation {
        id: ReservationId::from_uuid(column(row, "id")?),
        tenant_id: TenantId::from_uuid(column(row, "tenant_id")?),
        product_id: ProductId::from_uuid(column(row, "product_id")?),
        reserved_quantity: column(row, "reserved_quantity")?,
        reference: ReservationReference::new(reference_type, column::<String>(row, "reference_id")?),
        status: ReservationStatus::parse(&status)?,
        holds_stock: column(row, "holds_stock")?,
        created_at: column(row, "created_at")?,
        expires_at: column(row, "expires_at")?,
        closed_at: column(row, "closed_at")?,
    })
}

fn version_to_db(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
