use shipping_idempotency::api::{create_router, AppState};
use shipping_idempotency::config::{OrderBackend, Settings, StoreBackend};
use shipping_idempotency::idempotency::{
    IdempotencyCoordinator, InMemoryKeyValueStore, KeyValueStore, RedisKeyValueStore,
};
use shipping_idempotency::models::ShippingOrder;
use shipping_idempotency::observability::{init_logging, init_metrics, HealthChecker, LogConfig};
use shipping_idempotency::repositories::{
    InMemoryShippingOrderRepository, PostgresShippingOrderRepository, ShippingOrderStore,
};
use shipping_idempotency::services::{
    DelayStrategy, FixedDelay, IdempotentRequestHandler, ShippingOrderExecutor,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;
    init_logging(&LogConfig::from(&settings.application));
    info!("Configuration loaded");

    let metrics_handle = init_metrics()?;

    // Idempotency store
    let (kv_store, redis_client): (Arc<dyn KeyValueStore>, Option<redis::Client>) =
        match settings.idempotency.backend {
            StoreBackend::Redis => {
                info!("Connecting to Redis at {}...", settings.redis.url);
                let client = redis::Client::open(settings.redis.url.as_str())?;
                let mut con = client.get_multiplexed_async_connection().await?;
                let _: () = redis::cmd("PING").query_async(&mut con).await?;
                info!("Redis connection established");
                let store: Arc<dyn KeyValueStore> =
                    Arc::new(RedisKeyValueStore::new(client.clone()));
                (store, Some(client))
            }
            StoreBackend::Memory => {
                warn!("Using in-memory idempotency store; claims are not shared across processes");
                let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
                (store, None)
            }
        };

    // Order store
    let (orders, pool): (Arc<dyn ShippingOrderStore>, Option<PgPool>) =
        match settings.orders.backend {
            OrderBackend::Postgres => {
                info!("Connecting to database...");
                let pool = PgPoolOptions::new()
                    .max_connections(settings.database.pool_size)
                    .acquire_timeout(Duration::from_secs(settings.database.acquire_timeout_secs))
                    .connect(&settings.database.url)
                    .await?;
                info!("Database connection established");

                let repository = PostgresShippingOrderRepository::new(pool.clone());
                repository.ensure_schema().await?;
                info!("Shipping order schema ready");
                let orders: Arc<dyn ShippingOrderStore> = Arc::new(repository);
                (orders, Some(pool))
            }
            OrderBackend::Memory => {
                warn!("Using in-memory order store; orders are lost on restart");
                let orders: Arc<dyn ShippingOrderStore> =
                    Arc::new(InMemoryShippingOrderRepository::new());
                (orders, None)
            }
        };

    let mut executor = ShippingOrderExecutor::new(orders.clone())
        .with_lookup_timeout(settings.executor.persist_timeout());
    if let Some(delay) = settings.executor.artificial_delay() {
        warn!("Artificial delay of {:?} before each order write", delay);
        let delay: Arc<dyn DelayStrategy> = Arc::new(FixedDelay(delay));
        executor = executor.with_delay(delay);
    }
    let executor = Arc::new(executor);

    let coordinator = IdempotencyCoordinator::<ShippingOrder>::json(
        kv_store,
        settings.idempotency.coordinator_config(),
    )
    .with_reconciler(executor.clone());

    let handler = Arc::new(IdempotentRequestHandler::new(
        Arc::new(coordinator),
        executor,
        settings.executor.persist_timeout(),
    ));

    let state = AppState::new(handler, orders)
        .with_metrics(metrics_handle)
        .with_health_checker(Arc::new(HealthChecker::new(pool, redis_client)));

    let addr = format!("{}:{}", settings.application.host, settings.application.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, create_router(state)).await?;

    Ok(())
}
