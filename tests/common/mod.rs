#![allow(dead_code)]

use async_trait::async_trait;
use shipping_idempotency::error::{AppError, Result};
use shipping_idempotency::idempotency::{
    CoordinatorConfig, IdempotencyCoordinator, InMemoryKeyValueStore, KeyValueStore,
};
use shipping_idempotency::models::{NewShippingOrder, ShippingOrder};
use shipping_idempotency::repositories::{InMemoryShippingOrderRepository, ShippingOrderStore};
use shipping_idempotency::services::{
    DelayStrategy, FixedDelay, IdempotentRequestHandler, ShippingOrderExecutor,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub type ShippingHandler = IdempotentRequestHandler<ShippingOrderExecutor>;

/// Short polling so duplicate paths resolve quickly in tests.
pub fn fast_config(max_poll_attempts: u32) -> CoordinatorConfig {
    CoordinatorConfig {
        key_prefix: "idempotency".to_string(),
        store_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(5),
        max_poll_attempts,
    }
}

pub fn unique_key(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

/// In-memory store with switchable failures.
#[derive(Default)]
pub struct FlakyKeyValueStore {
    inner: InMemoryKeyValueStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl FlakyKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_everything(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self, flag: &AtomicBool) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(AppError::StoreUnavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KeyValueStore for FlakyKeyValueStore {
    async fn set_if_absent(&self, key: &str, field: &str, value: &[u8]) -> Result<bool> {
        self.check(&self.fail_reads)?;
        self.inner.set_if_absent(key, field, value).await
    }

    async fn get_field(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        self.check(&self.fail_reads)?;
        self.inner.get_field(key, field).await
    }

    async fn set_field(&self, key: &str, field: &str, value: &[u8]) -> Result<()> {
        self.check(&self.fail_writes)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set_field(key, field, value).await
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

/// Store whose every call takes longer than any test deadline.
pub struct StalledKeyValueStore;

#[async_trait]
impl KeyValueStore for StalledKeyValueStore {
    async fn set_if_absent(&self, _key: &str, _field: &str, _value: &[u8]) -> Result<bool> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(true)
    }

    async fn get_field(&self, _key: &str, _field: &str) -> Result<Option<Vec<u8>>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(None)
    }

    async fn set_field(&self, _key: &str, _field: &str, _value: &[u8]) -> Result<()> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stalled"
    }
}

/// Order store whose writes always fail.
pub struct FailingOrderStore;

#[async_trait]
impl ShippingOrderStore for FailingOrderStore {
    async fn create(&self, _order: NewShippingOrder) -> Result<ShippingOrder> {
        Err(AppError::Persistence("disk full".to_string()))
    }

    async fn find_by_id(&self, _id: i64) -> Result<Option<ShippingOrder>> {
        Ok(None)
    }

    async fn find_by_order_id(&self, _order_id: &str) -> Result<Option<ShippingOrder>> {
        Ok(None)
    }

    async fn find_by_idempotency_key(&self, _key: &str) -> Result<Option<ShippingOrder>> {
        Ok(None)
    }
}

/// Wires a handler over the given stores, with the executor as reconciler.
pub fn build_handler(
    kv_store: Arc<dyn KeyValueStore>,
    orders: Arc<dyn ShippingOrderStore>,
    config: CoordinatorConfig,
    delay: Option<Duration>,
) -> ShippingHandler {
    let mut executor = ShippingOrderExecutor::new(orders);
    if let Some(delay) = delay {
        let delay: Arc<dyn DelayStrategy> = Arc::new(FixedDelay(delay));
        executor = executor.with_delay(delay);
    }
    let executor = Arc::new(executor);

    let coordinator = IdempotencyCoordinator::<ShippingOrder>::json(kv_store, config)
        .with_reconciler(executor.clone());

    IdempotentRequestHandler::new(Arc::new(coordinator), executor, Duration::from_secs(1))
}

/// Handler over fresh in-memory stores; returns the order store for inspection.
pub fn in_memory_handler(
    config: CoordinatorConfig,
    delay: Option<Duration>,
) -> (ShippingHandler, Arc<InMemoryShippingOrderRepository>) {
    let orders = Arc::new(InMemoryShippingOrderRepository::new());
    let handler = build_handler(
        Arc::new(InMemoryKeyValueStore::new()),
        orders.clone(),
        config,
        delay,
    );
    (handler, orders)
}
