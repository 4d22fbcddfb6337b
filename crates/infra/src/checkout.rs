//! Line pricing and reservation: product price, then rights cost, then stock hold.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use merchledger_core::{Clock, ProductId, TenantId, UserId};
use merchledger_inventory::{Reservation, ReservationReference};
use merchledger_pricing::{PriceBreakdown, PriceQuery, RightsCharge, RightsConsumptionCalculator};

use crate::collaborators::{ProductCatalog, RightsBalanceProvider};
use crate::error::ServiceResult;
use crate::ledger::InventoryLedger;
use crate::pricing_service::PricingService;
use crate::store::{InventoryStore, PricingRepository, ReservationStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineQuote {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub price: PriceBreakdown,
    pub line_total: Decimal,
    pub rights: RightsCharge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservedLine {
    pub quote: LineQuote,
    pub reservation: Reservation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRequest {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub member_level: Option<String>,
}

pub struct CheckoutService<P, C, I, R> {
    pricing: Arc<PricingService<P, C>>,
    ledger: Arc<InventoryLedger<I, R>>,
    balances: Arc<dyn RightsBalanceProvider>,
    calculator: RightsConsumptionCalculator,
    clock: Arc<dyn Clock>,
}

impl<P, C, I, R> CheckoutService<P, C, I, R>
where
    P: PricingRepository,
    C: ProductCatalog,
    I: InventoryStore,
    R: ReservationStore,
{
    pub fn new(
        pricing: Arc<PricingService<P, C>>,
        ledger: Arc<InventoryLedger<I, R>>,
        balances: Arc<dyn RightsBalanceProvider>,
        calculator: RightsConsumptionCalculator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pricing,
            ledger,
            balances,
            calculator,
            clock,
        }
    }

    /// Price one line and derive its rights cost. A product without a rights
    /// rule consumes no rights and never consults the balance provider.
    pub fn quote_line(&self, tenant_id: TenantId, line: &LineRequest, at: DateTime<Utc>) -> ServiceResult<LineQuote> {
        let mut query = PriceQuery::new(line.product_id, line.quantity, at);
        query.member_level = line.member_level.clone();
        let price = self.pricing.calculate_effective_price(tenant_id, &query)?;

        let rights = match self.pricing.get_rights_rule(tenant_id, line.product_id)? {
            Some(rule) => {
                let available = self.balances.available_rights(tenant_id, line.user_id)?;
                self.calculator
                    .calculate(price.effective_price, line.quantity, &rule, available)?
            }
            None => RightsCharge::none(),
        };

        Ok(LineQuote {
            user_id: line.user_id,
            product_id: line.product_id,
            quantity: line.quantity,
            line_total: price.line_total(),
            price,
            rights,
        })
    }

    /// Quote the line at the current time, then hold its stock. Nothing is
    /// reserved when pricing or the rights policy rejects the line.
    pub fn price_and_reserve(
        &self,
        tenant_id: TenantId,
        line: &LineRequest,
        reference: ReservationReference,
    ) -> ServiceResult<ReservedLine> {
        let quote = self.quote_line(tenant_id, line, self.clock.now())?;
        let reservation = self.ledger.reserve(tenant_id, line.product_id, line.quantity, reference)?;

        info!(
            tenant_id = %tenant_id,
            product_id = %line.product_id,
            reservation_id = %reservation.id,
            line_total = %quote.line_total,
            consumed_rights = %quote.rights.consumed_rights,
            "line priced and reserved"
        );
        Ok(ReservedLine { quote, reservation })
    }
}
