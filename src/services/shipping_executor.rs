use crate::error::{AppError, Result};
use crate::idempotency::Reconciler;
use crate::models::{NewShippingOrder, ShippingOrder};
use crate::observability::{get_metrics, mask_key, LatencyTimer};
use crate::repositories::ShippingOrderStore;
use crate::services::executor::{DelayStrategy, ExecutionContext, NoDelay, OperationExecutor};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Business fields of a shipping order request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceShippingOrder {
    pub order_id: String,
    pub vendor: String,
    pub address: String,
}

/// Persists shipping orders; the effect guarded by the idempotency coordinator.
pub struct ShippingOrderExecutor {
    store: Arc<dyn ShippingOrderStore>,
    delay: Arc<dyn DelayStrategy>,
    lookup_timeout: Duration,
}

impl ShippingOrderExecutor {
    pub fn new(store: Arc<dyn ShippingOrderStore>) -> Self {
        Self {
            store,
            delay: Arc::new(NoDelay),
            lookup_timeout: Duration::from_secs(1),
        }
    }

    pub fn with_delay(mut self, delay: Arc<dyn DelayStrategy>) -> Self {
        self.delay = delay;
        self
    }

    /// Deadline for the order lookup used during reconciliation.
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }
}

#[async_trait]
impl OperationExecutor for ShippingOrderExecutor {
    type Payload = PlaceShippingOrder;
    type Output = ShippingOrder;

    async fn run(
        &self,
        ctx: &ExecutionContext,
        payload: PlaceShippingOrder,
    ) -> Result<ShippingOrder> {
        self.delay.pause().await;

        let new_order = NewShippingOrder::new(
            ctx.idempotency_key.clone(),
            payload.order_id,
            payload.vendor,
            payload.address,
        );

        let timer = LatencyTimer::new();
        let result = match tokio::time::timeout(ctx.timeout, self.store.create(new_order)).await {
            Ok(Ok(order)) => Ok(order),
            Ok(Err(
                e @ (AppError::StoreUnavailable(_)
                | AppError::Persistence(_)
                | AppError::Timeout(_)),
            )) => Err(e),
            Ok(Err(other)) => Err(AppError::Persistence(other.to_string())),
            Err(_) => Err(AppError::Timeout(format!(
                "shipping order write exceeded {:?}",
                ctx.timeout
            ))),
        };
        get_metrics().record_order_persisted(timer.elapsed_ms(), result.is_ok());

        match &result {
            Ok(order) => tracing::info!(
                shipping_id = order.id,
                order_id = %order.order_id,
                key = %mask_key(&ctx.idempotency_key),
                "Shipping order persisted"
            ),
            Err(e) => tracing::error!(
                key = %mask_key(&ctx.idempotency_key),
                error = %e,
                "Failed to persist shipping order"
            ),
        }

        result
    }
}

#[async_trait]
impl Reconciler<ShippingOrder> for ShippingOrderExecutor {
    async fn recover(&self, key: &str) -> Result<Option<ShippingOrder>> {
        let lookup = self.store.find_by_idempotency_key(key);
        match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "shipping order lookup exceeded {:?}",
                self.lookup_timeout
            ))),
        }
    }
}
