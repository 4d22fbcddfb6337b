use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use merchledger_core::{ManualClock, PricingRuleId, ProductId, TenantId};
use merchledger_events::NoopAuditSink;
use merchledger_infra::config::Settings;
use merchledger_infra::ledger::InventoryLedger;
use merchledger_infra::store::{InMemoryInventoryStore, InMemoryReservationStore};
use merchledger_inventory::{InventoryInfo, ReservationReference};
use merchledger_pricing::{
    BasePriceConfig, MemberDiscountConfig, PriceQuery, PricingRule, PricingRuleEngine, ProductPricing, RuleConfig,
    VolumeDiscountConfig, VolumeTier,
};

type Ledger = InventoryLedger<Arc<InMemoryInventoryStore>, Arc<InMemoryReservationStore>>;

fn rule(tenant_id: TenantId, product_id: ProductId, priority: i32, config: RuleConfig) -> PricingRule {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    PricingRule {
        id: PricingRuleId::new(),
        tenant_id,
        product_id,
        name: format!("rule-{priority}"),
        priority,
        config,
        valid_from: now,
        valid_until: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

/// One base price, one member rule and `volume_rules` volume rules.
fn pricing(volume_rules: usize) -> ProductPricing {
    let tenant_id = TenantId::new();
    let product_id = ProductId::new();
    let mut rules = vec![
        rule(
            tenant_id,
            product_id,
            0,
            RuleConfig::BasePrice(BasePriceConfig {
                amount: Decimal::from(100),
                currency: "USD".to_string(),
            }),
        ),
        rule(
            tenant_id,
            product_id,
            0,
            RuleConfig::MemberDiscount(MemberDiscountConfig {
                levels: [("gold".to_string(), Decimal::from(80))].into_iter().collect(),
                default_price: None,
            }),
        ),
    ];
    for i in 0..volume_rules {
        rules.push(rule(
            tenant_id,
            product_id,
            i as i32,
            RuleConfig::VolumeDiscount(VolumeDiscountConfig {
                tiers: vec![
                    VolumeTier {
                        min_qty: 1,
                        max_qty: Some(9),
                        price: Decimal::from(95),
                    },
                    VolumeTier {
                        min_qty: 10,
                        max_qty: None,
                        price: Decimal::from(90 - (i % 10) as i64),
                    },
                ],
            }),
        ));
    }
    ProductPricing {
        tenant_id,
        product_id,
        list_price: Decimal::from(120),
        currency: "USD".to_string(),
        rules,
        promotions: Vec::new(),
    }
}

fn seeded_ledger(stock: i64) -> (Ledger, TenantId, ProductId) {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
    let ledger = InventoryLedger::new(
        Arc::new(InMemoryInventoryStore::new()),
        Arc::new(InMemoryReservationStore::new()),
        Arc::new(NoopAuditSink),
        clock,
    )
    .with_settings(&Settings::default());
    let (tenant_id, product_id) = (TenantId::new(), ProductId::new());
    ledger
        .initialize(tenant_id, product_id, InventoryInfo::tracked(stock, 0))
        .unwrap();
    (ledger, tenant_id, product_id)
}

fn bench_price_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("price_resolution");
    let engine = PricingRuleEngine::new();

    for volume_rules in [1usize, 10, 100].iter() {
        let pricing = pricing(*volume_rules);
        let query = PriceQuery::new(pricing.product_id, 12, Utc::now()).with_member_level("gold");
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(volume_rules), &query, |b, query| {
            b.iter(|| engine.resolve(black_box(query), black_box(&pricing)).unwrap());
        });
    }
    group.finish();
}

fn bench_reserve_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger");

    group.bench_function("reserve_then_release", |b| {
        let (ledger, tenant_id, product_id) = seeded_ledger(1_000);
        b.iter(|| {
            let reservation = ledger
                .reserve(tenant_id, product_id, 1, ReservationReference::cart("bench"))
                .unwrap();
            ledger.release(tenant_id, reservation.id).unwrap();
        });
    });

    for open in [10usize, 1_000].iter() {
        group.bench_with_input(BenchmarkId::new("expire_sweep", open), open, |b, &open| {
            b.iter_batched(
                || {
                    let (ledger, tenant_id, product_id) = seeded_ledger(open as i64);
                    for i in 0..open {
                        ledger
                            .reserve(tenant_id, product_id, 1, ReservationReference::cart(format!("cart-{i}")))
                            .unwrap();
                    }
                    let due = ledger.now() + Duration::hours(1);
                    (ledger, due)
                },
                |(ledger, due)| ledger.expire_sweep(due).unwrap(),
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_price_resolution, bench_reserve_release);
criterion_main!(benches);
