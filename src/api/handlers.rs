use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use validator::Validate;

use crate::api::requests::{validation_details, PlaceShippingOrderRequest};
use crate::api::responses::{ApiResponse, ErrorResponse, OrderCreatedResponse};
use crate::error::AppError;
use crate::observability::{get_metrics, AggregatedHealth, LatencyTimer};
use crate::services::HandlerOutcome;

use super::routes::AppState;

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<AggregatedHealth>> {
    let health = match &state.health_checker {
        Some(checker) => checker.check_all().await,
        None => AggregatedHealth::new(env!("CARGO_PKG_VERSION").to_string(), 0, Vec::new()),
    };

    Json(ApiResponse::success(health))
}

/// Readiness check endpoint.
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    let ready = match &state.health_checker {
        Some(checker) => checker.is_ready().await,
        None => true,
    };

    if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness check endpoint.
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Prometheus metrics endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Place a shipping order at most once per idempotency key.
///
/// A fresh request answers `201 {"ok": true, "shipping_id": ..}`; a
/// duplicate answers `200` with the full stored order.
pub async fn place_shipping_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PlaceShippingOrderRequest>,
) -> Response {
    let timer = LatencyTimer::new();
    let response = place_order(&state, &headers, request).await;
    get_metrics().record_http_request(
        "POST",
        "/shipping/order",
        response.status().as_u16(),
        timer.elapsed_ms(),
    );
    response
}

async fn place_order(
    state: &AppState,
    headers: &HeaderMap,
    request: PlaceShippingOrderRequest,
) -> Response {
    let mut details = match request.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => validation_details(&errors),
    };
    let key = match request.idempotency_key(headers) {
        Ok(key) => Some(key),
        Err(detail) => {
            details.push(detail);
            None
        }
    };

    let key = match key {
        Some(key) if details.is_empty() => key,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<()>::error(
                    ErrorResponse::new("VALIDATION_ERROR", "Request validation failed")
                        .with_details(details),
                )),
            )
                .into_response();
        }
    };

    match state.handler.handle(&key, request.into()).await {
        Ok(HandlerOutcome::Created(order)) => (
            StatusCode::CREATED,
            Json(OrderCreatedResponse {
                ok: true,
                shipping_id: order.id,
            }),
        )
            .into_response(),
        Ok(HandlerOutcome::Replayed(order)) => (StatusCode::OK, Json(order)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Get a shipping order by its surrogate id.
pub async fn get_shipping_order(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.orders.find_by_id(id).await {
        Ok(Some(order)) => Json(ApiResponse::success(order)).into_response(),
        Ok(None) => AppError::NotFound(format!("shipping order {}", id)).into_response(),
        Err(e) => e.into_response(),
    }
}
