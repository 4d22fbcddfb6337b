//! Background maintenance: reservation expiry and rule archival on a fixed tick.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use merchledger_core::Clock;

use crate::collaborators::ProductCatalog;
use crate::error::ServiceResult;
use crate::ledger::InventoryLedger;
use crate::pricing_service::PricingService;
use crate::store::{InventoryStore, PricingRepository, ReservationStore};

/// A periodic job. Must be safe to run concurrently with regular traffic and
/// with another instance of itself.
pub trait MaintenanceTask: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns how many records the run touched.
    fn run(&self, now: DateTime<Utc>) -> ServiceResult<usize>;
}

/// Expires overdue reservations.
pub struct ExpireReservations<I, R> {
    ledger: Arc<InventoryLedger<I, R>>,
}

impl<I, R> ExpireReservations<I, R> {
    pub fn new(ledger: Arc<InventoryLedger<I, R>>) -> Self {
        Self { ledger }
    }
}

impl<I, R> MaintenanceTask for ExpireReservations<I, R>
where
    I: InventoryStore + 'static,
    R: ReservationStore + 'static,
{
    fn name(&self) -> &'static str {
        "expire_reservations"
    }

    fn run(&self, now: DateTime<Utc>) -> ServiceResult<usize> {
        Ok(self.ledger.expire_sweep(now)?.expired)
    }
}

/// Deactivates pricing rules whose validity window has closed.
pub struct ArchiveExpiredRules<P, C> {
    pricing: Arc<PricingService<P, C>>,
}

impl<P, C> ArchiveExpiredRules<P, C> {
    pub fn new(pricing: Arc<PricingService<P, C>>) -> Self {
        Self { pricing }
    }
}

impl<P, C> MaintenanceTask for ArchiveExpiredRules<P, C>
where
    P: PricingRepository + 'static,
    C: ProductCatalog + 'static,
{
    fn name(&self) -> &'static str {
        "archive_expired_rules"
    }

    fn run(&self, now: DateTime<Utc>) -> ServiceResult<usize> {
        self.pricing.archive_expired_rules(now)
    }
}

/// Handle to stop and join the worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the current tick to finish.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

pub struct MaintenanceWorker;

impl MaintenanceWorker {
    /// Spawn a named thread that runs every task once per `interval`.
    pub fn spawn(
        name: &'static str,
        interval: Duration,
        clock: Arc<dyn Clock>,
        tasks: Vec<Box<dyn MaintenanceTask>>,
    ) -> io::Result<WorkerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, interval, shutdown_rx, clock.as_ref(), &tasks))?;

        info!(worker = name, interval_ms = interval.as_millis() as u64, "maintenance worker started");
        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }

    /// Run every task once at `now`. A failing task does not stop the others.
    pub fn run_once(tasks: &[Box<dyn MaintenanceTask>], now: DateTime<Utc>) -> usize {
        let mut touched = 0;
        for task in tasks {
            match task.run(now) {
                Ok(n) => {
                    touched += n;
                    debug!(task = task.name(), touched = n, "maintenance task finished");
                }
                Err(err) => warn!(task = task.name(), error = %err, "maintenance task failed"),
            }
        }
        touched
    }
}

fn worker_loop(
    name: &'static str,
    interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
    clock: &dyn Clock,
    tasks: &[Box<dyn MaintenanceTask>],
) {
    loop {
        match shutdown_rx.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                MaintenanceWorker::run_once(tasks, clock.now());
            }
        }
    }
    info!(worker = name, "maintenance worker stopped");
}
