//! External collaborators consulted during pricing and checkout.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use merchledger_core::{ProductId, TenantId, UserId};

use crate::error::CollaboratorError;

/// A product's intrinsic list price as the catalog knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub product_id: ProductId,
    pub list_price: Decimal,
    pub currency: String,
}

pub trait ProductCatalog: Send + Sync {
    /// `None` when the product is unknown to the catalog.
    fn catalog_entry(&self, tenant_id: TenantId, product_id: ProductId)
    -> Result<Option<CatalogEntry>, CollaboratorError>;
}

/// Source of a user's spendable rights (loyalty points).
pub trait RightsBalanceProvider: Send + Sync {
    fn available_rights(&self, tenant_id: TenantId, user_id: UserId) -> Result<Decimal, CollaboratorError>;
}

impl<S> ProductCatalog for Arc<S>
where
    S: ProductCatalog + ?Sized,
{
    fn catalog_entry(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Option<CatalogEntry>, CollaboratorError> {
        (**self).catalog_entry(tenant_id, product_id)
    }
}

impl<S> RightsBalanceProvider for Arc<S>
where
    S: RightsBalanceProvider + ?Sized,
{
    fn available_rights(&self, tenant_id: TenantId, user_id: UserId) -> Result<Decimal, CollaboratorError> {
        (**self).available_rights(tenant_id, user_id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProductCatalog {
    entries: RwLock<HashMap<(TenantId, ProductId), CatalogEntry>>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, tenant_id: TenantId, entry: CatalogEntry) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert((tenant_id, entry.product_id), entry);
        }
    }
}

impl ProductCatalog for InMemoryProductCatalog {
    fn catalog_entry(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Option<CatalogEntry>, CollaboratorError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| CollaboratorError::new("product catalog", "lock poisoned"))?;
        Ok(entries.get(&(tenant_id, product_id)).cloned())
    }
}

/// Balances keyed by user; unknown users hold zero.
#[derive(Debug, Default)]
pub struct InMemoryRightsBalances {
    balances: RwLock<HashMap<(TenantId, UserId), Decimal>>,
}

impl InMemoryRightsBalances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, tenant_id: TenantId, user_id: UserId, balance: Decimal) {
        if let Ok(mut balances) = self.balances.write() {
            balances.insert((tenant_id, user_id), balance);
        }
    }
}

impl RightsBalanceProvider for InMemoryRightsBalances {
    fn available_rights(&self, tenant_id: TenantId, user_id: UserId) -> Result<Decimal, CollaboratorError> {
        let balances = self
            .balances
            .read()
            .map_err(|_| CollaboratorError::new("rights balances", "lock poisoned"))?;
        Ok(balances.get(&(tenant_id, user_id)).copied().unwrap_or(Decimal::ZERO))
    }
}
