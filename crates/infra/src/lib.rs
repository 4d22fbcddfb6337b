//! Infrastructure layer: stores, the inventory ledger, pricing and checkout
//! services, background maintenance and configuration.

mod audit;

pub mod cache;
pub mod checkout;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod ledger;
pub mod pricing_service;
pub mod store;
pub mod worker;

/// Postgres-backed ledger (transactional row locks instead of in-process locks).
#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(test)]
mod integration_tests;

pub use cache::{PriceCache, PriceCacheKey};
pub use checkout::{CheckoutService, LineQuote, LineRequest, ReservedLine};
pub use collaborators::{
    CatalogEntry, InMemoryProductCatalog, InMemoryRightsBalances, ProductCatalog, RightsBalanceProvider,
};
pub use config::{ConfigError, Settings};
pub use error::{CollaboratorError, ServiceError, ServiceResult, StoreError};
pub use ledger::{
    AdjustmentOutcome, InventoryLedger, ReconcileReport, ReleaseOutcome, StockAdjustment, SweepReport,
};
pub use pricing_service::{PricingService, PromotionDraft, RuleDraft};
pub use worker::{ArchiveExpiredRules, ExpireReservations, MaintenanceTask, MaintenanceWorker, WorkerHandle};
