use http::HeaderMap;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use crate::api::responses::ValidationErrorDetail;
use crate::services::PlaceShippingOrder;

/// Header carrying the caller's idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Longest idempotency key accepted.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Request to place a shipping order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PlaceShippingOrderRequest {
    #[validate(length(min = 1, max = 255, message = "order_id must be 1-255 characters"))]
    pub order_id: String,
    #[validate(length(min = 1, message = "vendor cannot be empty"))]
    pub vendor: String,
    #[validate(length(min = 1, message = "address cannot be empty"))]
    pub address: String,
}

impl From<PlaceShippingOrderRequest> for PlaceShippingOrder {
    fn from(request: PlaceShippingOrderRequest) -> Self {
        Self {
            order_id: request.order_id,
            vendor: request.vendor,
            address: request.address,
        }
    }
}

impl PlaceShippingOrderRequest {
    /// Idempotency key from the header, falling back to `order_id`.
    pub fn idempotency_key(&self, headers: &HeaderMap) -> Result<String, ValidationErrorDetail> {
        let key = match headers.get(IDEMPOTENCY_KEY_HEADER) {
            Some(value) => value
                .to_str()
                .map_err(|_| ValidationErrorDetail {
                    field: IDEMPOTENCY_KEY_HEADER.to_string(),
                    message: "idempotency key must be visible ASCII".to_string(),
                })?
                .trim()
                .to_string(),
            None => self.order_id.trim().to_string(),
        };

        if key.is_empty() {
            return Err(ValidationErrorDetail {
                field: IDEMPOTENCY_KEY_HEADER.to_string(),
                message: "idempotency key cannot be empty".to_string(),
            });
        }
        if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(ValidationErrorDetail {
                field: IDEMPOTENCY_KEY_HEADER.to_string(),
                message: format!(
                    "idempotency key cannot exceed {} bytes",
                    MAX_IDEMPOTENCY_KEY_LEN
                ),
            });
        }

        Ok(key)
    }
}

/// Flattens validator errors into response details, sorted by field.
pub fn validation_details(errors: &ValidationErrors) -> Vec<ValidationErrorDetail> {
    let mut details: Vec<ValidationErrorDetail> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, field_errors)| {
            field_errors.iter().map(move |e| ValidationErrorDetail {
                field: field.to_string(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string()),
            })
        })
        .collect();
    details.sort_by(|a, b| a.field.cmp(&b.field));
    details
}
