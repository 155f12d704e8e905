use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use shipping_idempotency::idempotency::{
    Codec, CoordinatorConfig, IdempotencyCoordinator, InMemoryKeyValueStore, JsonCodec,
};
use shipping_idempotency::models::{NewShippingOrder, ShippingOrder};
use shipping_idempotency::observability::{mask_key, LatencyTimer};

fn sample_order(id: i64) -> ShippingOrder {
    let key = format!("ORD-{}", id);
    NewShippingOrder::new(key.as_str(), key.as_str(), "Acme Freight", "1 Harbour Road")
        .into_order(id, Utc::now())
}

fn benchmark_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let order = sample_order(1);
    let bytes = JsonCodec.encode(&order).unwrap_or_default();

    group.bench_function("json_encode", |b| {
        b.iter(|| black_box(JsonCodec.encode(black_box(&order))))
    });

    group.bench_function("json_decode", |b| {
        b.iter(|| {
            let decoded: shipping_idempotency::error::Result<ShippingOrder> =
                JsonCodec.decode(black_box(&bytes));
            black_box(decoded)
        })
    });

    group.finish();
}

fn benchmark_claim_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("coordinator");
    group.measurement_time(Duration::from_secs(10));

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let coordinator: Arc<IdempotencyCoordinator<ShippingOrder>> =
        Arc::new(IdempotencyCoordinator::json(
            Arc::new(InMemoryKeyValueStore::new()),
            CoordinatorConfig::default(),
        ));
    let order = sample_order(1);

    group.bench_function("fresh_claim_and_publish", |b| {
        b.to_async(&runtime).iter(|| {
            let coordinator = coordinator.clone();
            let order = order.clone();
            async move {
                let key = Uuid::new_v4().to_string();
                let _ = coordinator.claim(&key).await;
                let _ = coordinator.publish(&key, &order).await;
            }
        })
    });

    runtime.block_on(async {
        let _ = coordinator.claim("replayed").await;
        let _ = coordinator.publish("replayed", &order).await;
    });

    group.bench_function("duplicate_claim", |b| {
        b.to_async(&runtime).iter(|| {
            let coordinator = coordinator.clone();
            async move { black_box(coordinator.claim("replayed").await) }
        })
    });

    group.finish();
}

fn benchmark_concurrent_duplicates(c: &mut Criterion) {
    let mut group = c.benchmark_group("contention");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    for callers in [2, 8, 32].iter() {
        group.bench_with_input(
            BenchmarkId::new("same_key_callers", callers),
            callers,
            |b, &callers| {
                b.to_async(&runtime).iter(|| async move {
                    let coordinator: Arc<IdempotencyCoordinator<ShippingOrder>> =
                        Arc::new(IdempotencyCoordinator::json(
                            Arc::new(InMemoryKeyValueStore::new()),
                            CoordinatorConfig {
                                poll_interval: Duration::from_micros(100),
                                ..CoordinatorConfig::default()
                            },
                        ));
                    let order = sample_order(1);

                    let handles: Vec<_> = (0..callers)
                        .map(|_| {
                            let coordinator = coordinator.clone();
                            let order = order.clone();
                            tokio::spawn(async move {
                                if let Ok(outcome) = coordinator.claim("K").await {
                                    if !outcome.is_duplicate() {
                                        let _ = coordinator.publish("K", &order).await;
                                    }
                                }
                            })
                        })
                        .collect();

                    for handle in handles {
                        let _ = handle.await;
                    }
                });
            },
        );
    }

    group.finish();
}

fn benchmark_observability(c: &mut Criterion) {
    let mut group = c.benchmark_group("observability");

    group.bench_function("latency_timer", |b| {
        b.iter(|| {
            let timer = LatencyTimer::new();
            black_box(timer.elapsed_ms())
        })
    });

    group.bench_function("mask_key", |b| {
        b.iter(|| black_box(mask_key(black_box("order-2024-000123"))))
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_codec,
    benchmark_claim_publish,
    benchmark_concurrent_duplicates,
    benchmark_observability,
);
criterion_main!(benches);
