use crate::error::{AppError, Result};
use crate::models::{NewShippingOrder, ShippingOrder};
use crate::observability::mask_key;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

/// Durable store for shipping orders.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ShippingOrderStore: Send + Sync {
    /// Persists a new order and returns it with its assigned id.
    async fn create(&self, order: NewShippingOrder) -> Result<ShippingOrder>;

    async fn find_by_id(&self, id: i64) -> Result<Option<ShippingOrder>>;

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<ShippingOrder>>;

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<ShippingOrder>>;
}

/// PostgreSQL repository for shipping orders.
#[derive(Clone)]
pub struct PostgresShippingOrderRepository {
    pool: PgPool,
}

impl PostgresShippingOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `shipping_orders` table and its indexes if missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS shipping_orders (
                id BIGSERIAL PRIMARY KEY,
                idempotency_key TEXT NOT NULL,
                order_id TEXT NOT NULL,
                vendor TEXT NOT NULL,
                address TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_shipping_orders_idempotency_key ON shipping_orders (idempotency_key)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_shipping_orders_order_id ON shipping_orders (order_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_one(&self, column: &'static str, value: &str) -> Result<Option<ShippingOrder>> {
        let sql = format!(
            r#"
            SELECT id, idempotency_key, order_id, vendor, address, created_at, updated_at
            FROM shipping_orders
            WHERE {} = $1
            ORDER BY id
            LIMIT 1
            "#,
            column
        );

        let row = sqlx::query_as::<_, ShippingOrder>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }
}

#[async_trait]
impl ShippingOrderStore for PostgresShippingOrderRepository {
    async fn create(&self, order: NewShippingOrder) -> Result<ShippingOrder> {
        let row = sqlx::query_as::<_, ShippingOrder>(
            r#"
            INSERT INTO shipping_orders (idempotency_key, order_id, vendor, address, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            RETURNING id, idempotency_key, order_id, vendor, address, created_at, updated_at
            "#,
        )
        .bind(&order.idempotency_key)
        .bind(&order.order_id)
        .bind(&order.vendor)
        .bind(&order.address)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ShippingOrder>> {
        let row = sqlx::query_as::<_, ShippingOrder>(
            r#"
            SELECT id, idempotency_key, order_id, vendor, address, created_at, updated_at
            FROM shipping_orders
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<ShippingOrder>> {
        self.find_one("order_id", order_id).await
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<ShippingOrder>> {
        self.find_one("idempotency_key", key).await
    }
}

/// Process-local order store for development and tests.
#[derive(Debug)]
pub struct InMemoryShippingOrderRepository {
    orders: RwLock<Vec<ShippingOrder>>,
    next_id: AtomicI64,
}

impl Default for InMemoryShippingOrderRepository {
    fn default() -> Self {
        Self {
            orders: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl InMemoryShippingOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl ShippingOrderStore for InMemoryShippingOrderRepository {
    async fn create(&self, order: NewShippingOrder) -> Result<ShippingOrder> {
        let mut orders = self.orders.write().await;
        if orders.iter().any(|o| o.idempotency_key == order.idempotency_key) {
            return Err(AppError::Persistence(format!(
                "shipping order with idempotency key {} already exists",
                mask_key(&order.idempotency_key)
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let created = order.into_order(id, Utc::now());
        orders.push(created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ShippingOrder>> {
        let orders = self.orders.read().await;
        Ok(orders.iter().find(|o| o.id == id).cloned())
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<ShippingOrder>> {
        let orders = self.orders.read().await;
        Ok(orders.iter().find(|o| o.order_id == order_id).cloned())
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<ShippingOrder>> {
        let orders = self.orders.read().await;
        Ok(orders.iter().find(|o| o.idempotency_key == key).cloned())
    }
}
