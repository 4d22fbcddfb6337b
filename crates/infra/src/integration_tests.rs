//! End-to-end flows across pricing, rights, the ledger and maintenance.
//!
//! Verifies:
//! - a checkout line is priced, charged in rights and reserved in one call
//! - rights rejection never leaves a reservation behind
//! - concurrent reservations never oversell
//! - overlapping sweeps expire each reservation once

use std::sync::Arc;
use std::thread;

use chrono::{Duration, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use merchledger_core::{Clock, DomainError, ManualClock, ProductId, TenantId, UserId};
use merchledger_events::{AuditBus, Event, InMemoryAuditLog, InventoryChangeKind};
use merchledger_inventory::{InventoryInfo, ReservationReference, ReservationStatus};
use merchledger_pricing::{
    AppliedRule, BasePriceConfig, InsufficientRightsAction, MemberDiscountConfig, PriceQuery, RightsConsumptionCalculator,
    RightsRule, RightsSettlement, RuleConfig, TimeBasedDiscountConfig, TimeSlot, VolumeDiscountConfig, VolumeTier,
};

use crate::checkout::{CheckoutService, LineRequest};
use crate::collaborators::{CatalogEntry, InMemoryProductCatalog, InMemoryRightsBalances, RightsBalanceProvider};
use crate::config::Settings;
use crate::error::{CollaboratorError, ServiceError};
use crate::ledger::InventoryLedger;
use crate::pricing_service::{PricingService, RuleDraft};
use crate::store::{InMemoryInventoryStore, InMemoryPricingRepository, InMemoryReservationStore};
use crate::worker::{ArchiveExpiredRules, ExpireReservations, MaintenanceTask, MaintenanceWorker};

type Ledger = InventoryLedger<Arc<InMemoryInventoryStore>, Arc<InMemoryReservationStore>>;
type Pricing = PricingService<Arc<InMemoryPricingRepository>, Arc<InMemoryProductCatalog>>;
type Checkout = CheckoutService<
    Arc<InMemoryPricingRepository>,
    Arc<InMemoryProductCatalog>,
    Arc<InMemoryInventoryStore>,
    Arc<InMemoryReservationStore>,
>;

struct Shop {
    tenant_id: TenantId,
    product_id: ProductId,
    user_id: UserId,
    clock: Arc<ManualClock>,
    audit: Arc<InMemoryAuditLog>,
    balances: Arc<InMemoryRightsBalances>,
    ledger: Arc<Ledger>,
    pricing: Arc<Pricing>,
    checkout: Checkout,
}

/// Monday 2024-05-06 10:00:30 UTC, list price 120, ten units on hand.
fn shop() -> Shop {
    shop_with_balances(None)
}

fn shop_with_balances(balances_override: Option<Arc<dyn RightsBalanceProvider>>) -> Shop {
    let tenant_id = TenantId::new();
    let product_id = ProductId::new();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 6, 10, 0, 30).unwrap()));
    let audit = Arc::new(InMemoryAuditLog::new());
    let settings = Settings::default();

    let catalog = Arc::new(InMemoryProductCatalog::new());
    catalog.upsert(
        tenant_id,
        CatalogEntry {
            product_id,
            list_price: dec!(120),
            currency: "USD".to_string(),
        },
    );
    let pricing = Arc::new(PricingService::new(
        Arc::new(InMemoryPricingRepository::new()),
        catalog,
        clock.clone(),
        &settings,
    ));
    let ledger = Arc::new(
        InventoryLedger::new(
            Arc::new(InMemoryInventoryStore::new()),
            Arc::new(InMemoryReservationStore::new()),
            audit.clone(),
            clock.clone(),
        )
        .with_settings(&settings),
    );
    ledger
        .initialize(tenant_id, product_id, InventoryInfo::tracked(10, 2))
        .unwrap();

    let balances = Arc::new(InMemoryRightsBalances::new());
    let provider: Arc<dyn RightsBalanceProvider> = match balances_override {
        Some(provider) => provider,
        None => balances.clone() as Arc<dyn RightsBalanceProvider>,
    };
    let checkout = CheckoutService::new(
        pricing.clone(),
        ledger.clone(),
        provider,
        RightsConsumptionCalculator::new(settings.points_per_currency_unit).unwrap(),
        clock.clone(),
    );

    Shop {
        tenant_id,
        product_id,
        user_id: UserId::new(),
        clock,
        audit,
        balances,
        ledger,
        pricing,
        checkout,
    }
}

fn draft(s: &Shop, name: &str, config: RuleConfig) -> RuleDraft {
    RuleDraft {
        product_id: s.product_id,
        name: name.to_string(),
        priority: 0,
        config,
        valid_from: s.clock.now() - Duration::days(1),
        valid_until: None,
        is_active: true,
    }
}

fn base_price(amount: Decimal) -> RuleConfig {
    RuleConfig::BasePrice(BasePriceConfig {
        amount,
        currency: "USD".to_string(),
    })
}

fn gold_price(price: Decimal) -> RuleConfig {
    RuleConfig::MemberDiscount(MemberDiscountConfig {
        levels: [("gold".to_string(), price)].into_iter().collect(),
        default_price: None,
    })
}

fn bulk_price(min_qty: i64, price: Decimal) -> RuleConfig {
    RuleConfig::VolumeDiscount(VolumeDiscountConfig {
        tiers: vec![VolumeTier {
            min_qty,
            max_qty: None,
            price,
        }],
    })
}

fn monday_morning_price(price: Decimal) -> RuleConfig {
    RuleConfig::TimeBasedDiscount(TimeBasedDiscountConfig {
        slots: vec![TimeSlot {
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            week_days: vec![1],
            price,
        }],
    })
}

fn rights_rule(s: &Shop, action: InsufficientRightsAction) -> RightsRule {
    RightsRule {
        tenant_id: s.tenant_id,
        product_id: s.product_id,
        consumption_rate: dec!(10),
        insufficient_rights_action: action,
    }
}

fn gold_line(s: &Shop, quantity: i64) -> LineRequest {
    LineRequest {
        user_id: s.user_id,
        product_id: s.product_id,
        quantity,
        member_level: Some("gold".to_string()),
    }
}

fn available(s: &Shop) -> i64 {
    s.ledger.get(s.tenant_id, s.product_id).unwrap().info().available()
}

#[test]
fn checkout_prices_charges_rights_and_reserves() {
    let s = shop();
    s.pricing.create_rule(s.tenant_id, draft(&s, "base", base_price(dec!(100)))).unwrap();
    s.pricing.create_rule(s.tenant_id, draft(&s, "gold", gold_price(dec!(80)))).unwrap();
    s.pricing
        .set_rights_rule(rights_rule(&s, InsufficientRightsAction::BlockPurchase))
        .unwrap();
    s.balances.set_balance(s.tenant_id, s.user_id, dec!(5000));

    let line = s
        .checkout
        .price_and_reserve(s.tenant_id, &gold_line(&s, 2), ReservationReference::order("order-1"))
        .unwrap();

    assert_eq!(line.quote.price.base_price, dec!(100));
    assert_eq!(line.quote.price.effective_price, dec!(80));
    assert_eq!(line.quote.price.discount_amount, dec!(20));
    assert_eq!(line.quote.line_total, dec!(160));
    assert_eq!(line.quote.rights.required_rights, dec!(1600));
    assert_eq!(line.quote.rights.consumed_rights, dec!(1600));
    assert_eq!(line.quote.rights.action, RightsSettlement::Rights);
    assert_eq!(line.reservation.reserved_quantity, 2);
    assert_eq!(available(&s), 8);

    let consumed = s.ledger.consume(s.tenant_id, line.reservation.id).unwrap();
    assert_eq!(consumed.status, ReservationStatus::Consumed);
    let info = s.ledger.get(s.tenant_id, s.product_id).unwrap().info();
    assert_eq!((info.stock_quantity, info.reserved_quantity), (8, 0));
    assert_eq!(s.audit.count_kind(InventoryChangeKind::Reserved), 1);
    assert_eq!(s.audit.count_kind(InventoryChangeKind::Consumed), 1);
}

#[test]
fn blocked_rights_leave_no_reservation() {
    let s = shop();
    s.pricing.create_rule(s.tenant_id, draft(&s, "gold", gold_price(dec!(80)))).unwrap();
    s.pricing
        .set_rights_rule(rights_rule(&s, InsufficientRightsAction::BlockPurchase))
        .unwrap();
    s.balances.set_balance(s.tenant_id, s.user_id, dec!(100));

    let err = s
        .checkout
        .price_and_reserve(s.tenant_id, &gold_line(&s, 2), ReservationReference::order("order-2"))
        .unwrap_err();

    assert_eq!(
        err.as_domain(),
        Some(&DomainError::RightsInsufficient {
            required: dec!(1600),
            available: dec!(100),
        })
    );
    assert_eq!(available(&s), 10);
    assert!(s.ledger.active_reservations(s.tenant_id, s.product_id).unwrap().is_empty());
    assert_eq!(s.audit.count_kind(InventoryChangeKind::Reserved), 0);
}

#[test]
fn partial_payment_converts_the_shortfall_to_cash() {
    let s = shop();
    s.pricing.create_rule(s.tenant_id, draft(&s, "gold", gold_price(dec!(80)))).unwrap();
    s.pricing
        .set_rights_rule(rights_rule(&s, InsufficientRightsAction::PartialPayment))
        .unwrap();
    s.balances.set_balance(s.tenant_id, s.user_id, dec!(600));

    let line = s
        .checkout
        .price_and_reserve(s.tenant_id, &gold_line(&s, 2), ReservationReference::cart("cart-9"))
        .unwrap();

    assert_eq!(line.quote.rights.consumed_rights, dec!(600));
    assert_eq!(line.quote.rights.cash_payment, dec!(10.00));
    assert_eq!(line.quote.rights.action, RightsSettlement::PartialPayment);
    assert_eq!(available(&s), 8);
}

#[test]
fn cash_payment_charges_the_whole_line_in_cash() {
    let s = shop();
    s.pricing
        .set_rights_rule(rights_rule(&s, InsufficientRightsAction::CashPayment))
        .unwrap();

    let quote = s
        .checkout
        .quote_line(s.tenant_id, &gold_line(&s, 3), s.clock.now())
        .unwrap();

    assert_eq!(quote.price.effective_price, dec!(120));
    assert_eq!(quote.rights.consumed_rights, Decimal::ZERO);
    assert_eq!(quote.rights.cash_payment, dec!(360.00));
    assert_eq!(quote.rights.action, RightsSettlement::CashPayment);
}

struct UnreachableBalances;

impl RightsBalanceProvider for UnreachableBalances {
    fn available_rights(&self, _tenant_id: TenantId, _user_id: UserId) -> Result<Decimal, CollaboratorError> {
        Err(CollaboratorError::new("rights balances", "connection refused"))
    }
}

#[test]
fn products_without_rights_rule_skip_the_balance_lookup() {
    let s = shop_with_balances(Some(Arc::new(UnreachableBalances)));

    let quote = s
        .checkout
        .quote_line(s.tenant_id, &gold_line(&s, 1), s.clock.now())
        .unwrap();
    assert_eq!(quote.rights.consumed_rights, Decimal::ZERO);

    s.pricing
        .set_rights_rule(rights_rule(&s, InsufficientRightsAction::CashPayment))
        .unwrap();
    let err = s
        .checkout
        .quote_line(s.tenant_id, &gold_line(&s, 1), s.clock.now())
        .unwrap_err();
    assert!(matches!(err, ServiceError::Collaborator(_)));
}

#[test]
fn discounts_apply_in_fixed_order_and_the_last_match_wins() {
    let s = shop();
    s.pricing.create_rule(s.tenant_id, draft(&s, "base", base_price(dec!(100)))).unwrap();
    s.pricing.create_rule(s.tenant_id, draft(&s, "gold", gold_price(dec!(80)))).unwrap();
    s.pricing.create_rule(s.tenant_id, draft(&s, "bulk", bulk_price(5, dec!(70)))).unwrap();
    s.pricing
        .create_rule(s.tenant_id, draft(&s, "morning", monday_morning_price(dec!(90))))
        .unwrap();

    let query = PriceQuery::new(s.product_id, 5, s.clock.now()).with_member_level("gold");
    let price = s.pricing.calculate_effective_price(s.tenant_id, &query).unwrap();

    // The time-based price overrides the cheaper volume price because it is evaluated last.
    assert_eq!(price.effective_price, dec!(90));
    assert_eq!(price.discount_amount, dec!(10));
    let kinds: Vec<&str> = price.applied_rules.iter().map(AppliedRule::name).collect();
    assert_eq!(kinds, vec!["base", "gold", "bulk", "morning"]);

    s.clock.advance(Duration::hours(3));
    let afternoon = PriceQuery::new(s.product_id, 5, s.clock.now()).with_member_level("gold");
    let price = s.pricing.calculate_effective_price(s.tenant_id, &afternoon).unwrap();
    assert_eq!(price.effective_price, dec!(70));
}

#[test]
fn concurrent_reservations_never_oversell() {
    let s = shop();
    s.ledger.adjust(s.tenant_id, s.product_id, 40, None).unwrap();

    let (tenant_id, product_id) = (s.tenant_id, s.product_id);
    let outcomes: Vec<(usize, usize)> = thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|worker| {
                let ledger = s.ledger.clone();
                scope.spawn(move || {
                    let (mut won, mut lost) = (0usize, 0usize);
                    for attempt in 0..10 {
                        let reference = ReservationReference::cart(format!("cart-{worker}-{attempt}"));
                        match ledger.reserve(tenant_id, product_id, 1, reference) {
                            Ok(_) => won += 1,
                            Err(err) => {
                                assert!(matches!(
                                    err.as_domain(),
                                    Some(DomainError::InsufficientInventory { .. })
                                ));
                                lost += 1;
                            }
                        }
                    }
                    (won, lost)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let won: usize = outcomes.iter().map(|(w, _)| w).sum();
    let lost: usize = outcomes.iter().map(|(_, l)| l).sum();
    assert_eq!(won, 50);
    assert_eq!(lost, 110);
    assert_eq!(available(&s), 0);

    let active = s.ledger.active_reservations(tenant_id, product_id).unwrap();
    assert_eq!(active.iter().map(|r| r.reserved_quantity).sum::<i64>(), 50);
    assert_eq!(s.ledger.reconcile(tenant_id, product_id).unwrap().drift(), 0);
}

#[test]
fn overlapping_sweeps_expire_each_reservation_once() {
    let s = shop();
    s.ledger.adjust(s.tenant_id, s.product_id, 10, None).unwrap();
    for i in 0..20 {
        s.ledger
            .reserve(s.tenant_id, s.product_id, 1, ReservationReference::cart(format!("cart-{i}")))
            .unwrap();
    }
    assert_eq!(available(&s), 0);

    s.clock.advance(Duration::minutes(16));
    let now = s.clock.now();
    let expired: usize = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ledger = s.ledger.clone();
                scope.spawn(move || ledger.expire_sweep(now).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap().expired).sum()
    });

    assert_eq!(expired, 20);
    assert_eq!(s.audit.count_kind(InventoryChangeKind::Expired), 20);
    assert_eq!(available(&s), 20);
    assert!(s.ledger.active_reservations(s.tenant_id, s.product_id).unwrap().is_empty());
}

#[test]
fn maintenance_tick_expires_reservations_and_archives_rules() {
    let s = shop();
    let mut bulk = draft(&s, "bulk", bulk_price(2, dec!(60)));
    bulk.valid_until = Some(s.clock.now() + Duration::minutes(5));
    s.pricing.create_rule(s.tenant_id, bulk).unwrap();
    s.ledger
        .reserve(s.tenant_id, s.product_id, 4, ReservationReference::order("order-7"))
        .unwrap();

    let tasks: Vec<Box<dyn MaintenanceTask>> = vec![
        Box::new(ExpireReservations::new(s.ledger.clone())),
        Box::new(ArchiveExpiredRules::new(s.pricing.clone())),
    ];

    assert_eq!(MaintenanceWorker::run_once(&tasks, s.clock.now()), 0);

    s.clock.advance(Duration::minutes(20));
    assert_eq!(MaintenanceWorker::run_once(&tasks, s.clock.now()), 2);
    assert_eq!(available(&s), 10);
    let rules = s.pricing.list_rules(s.tenant_id, s.product_id).unwrap();
    assert!(rules.iter().all(|r| !r.is_active));

    assert_eq!(MaintenanceWorker::run_once(&tasks, s.clock.now()), 0);
}

#[test]
fn tenants_never_see_each_other() {
    let s = shop();
    let other = TenantId::new();
    let reservation = s
        .ledger
        .reserve(s.tenant_id, s.product_id, 1, ReservationReference::order("order-1"))
        .unwrap();

    let err = s.ledger.get_reservation(other, reservation.id).unwrap_err();
    assert_eq!(err.as_domain(), Some(&DomainError::ReservationNotFound(reservation.id)));
    assert!(s.ledger.get(other, s.product_id).is_err());

    let query = PriceQuery::new(s.product_id, 1, s.clock.now());
    assert!(s.pricing.calculate_effective_price(other, &query).is_err());
}

#[test]
fn second_reservation_fails_until_the_first_is_released() {
    let s = shop();
    let first = s
        .ledger
        .reserve(s.tenant_id, s.product_id, 7, ReservationReference::order("order-1"))
        .unwrap();
    assert_eq!(available(&s), 3);

    let err = s
        .ledger
        .reserve(s.tenant_id, s.product_id, 5, ReservationReference::order("order-2"))
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(
        err.as_domain(),
        Some(&DomainError::insufficient_inventory(s.product_id, 5, 3))
    );

    s.ledger.release(s.tenant_id, first.id).unwrap();
    assert_eq!(available(&s), 10);
}

#[test]
fn audit_bus_forwards_ledger_changes_to_tenant_subscribers() {
    let bus = Arc::new(AuditBus::new());
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap()));
    let ledger = InventoryLedger::new(
        Arc::new(InMemoryInventoryStore::new()),
        Arc::new(InMemoryReservationStore::new()),
        bus.clone(),
        clock,
    );
    let (tenant_id, product_id) = (TenantId::new(), ProductId::new());
    let subscription = bus.subscribe_tenant(tenant_id);
    let elsewhere = bus.subscribe_tenant(TenantId::new());

    ledger
        .initialize(tenant_id, product_id, InventoryInfo::tracked(3, 1))
        .unwrap();
    ledger
        .reserve(tenant_id, product_id, 2, ReservationReference::cart("cart-1"))
        .unwrap();

    let received: Vec<&str> = std::iter::from_fn(|| subscription.try_recv().ok())
        .map(|event| event.event_type())
        .collect();
    assert_eq!(
        received,
        vec!["inventory.stock.initialized", "inventory.stock.reserved", "inventory.alert.low_stock"]
    );
    assert!(elsewhere.try_recv().is_err());
}
