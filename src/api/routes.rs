use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::observability::HealthChecker;
use crate::repositories::ShippingOrderStore;
use crate::services::{IdempotentRequestHandler, ShippingOrderExecutor};

/// Request handler guarding shipping order creation.
pub type ShippingOrderHandler = IdempotentRequestHandler<ShippingOrderExecutor>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<ShippingOrderHandler>,
    pub orders: Arc<dyn ShippingOrderStore>,
    pub metrics_handle: Option<PrometheusHandle>,
    pub health_checker: Option<Arc<HealthChecker>>,
}

impl AppState {
    pub fn new(handler: Arc<ShippingOrderHandler>, orders: Arc<dyn ShippingOrderStore>) -> Self {
        Self {
            handler,
            orders,
            metrics_handle: None,
            health_checker: None,
        }
    }

    /// Adds metrics handle to the state.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Adds health checker to the state.
    pub fn with_health_checker(mut self, checker: Arc<HealthChecker>) -> Self {
        self.health_checker = Some(checker);
        self
    }
}

/// Creates the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check))
        // Metrics endpoint
        .route("/metrics", get(handlers::metrics_endpoint))
        // Shipping endpoints
        .route("/shipping/order", post(handlers::place_shipping_order))
        .route("/shipping/orders/:id", get(handlers::get_shipping_order))
        .with_state(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
