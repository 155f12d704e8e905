use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A persisted shipping order.
///
/// `id` is assigned by the order store. `idempotency_key` ties the order to
/// the request that created it, so a stuck idempotency record can be
/// reconciled from the order table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ShippingOrder {
    pub id: i64,
    pub idempotency_key: String,
    pub order_id: String,
    pub vendor: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields of a shipping order before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewShippingOrder {
    pub idempotency_key: String,
    pub order_id: String,
    pub vendor: String,
    pub address: String,
}

impl NewShippingOrder {
    pub fn new(
        idempotency_key: impl Into<String>,
        order_id: impl Into<String>,
        vendor: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            idempotency_key: idempotency_key.into(),
            order_id: order_id.into(),
            vendor: vendor.into(),
            address: address.into(),
        }
    }

    /// Builds the stored order once the store has assigned `id`.
    pub fn into_order(self, id: i64, now: DateTime<Utc>) -> ShippingOrder {
        ShippingOrder {
            id,
            idempotency_key: self.idempotency_key,
            order_id: self.order_id,
            vendor: self.vendor,
            address: self.address,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_order_keeps_fields() {
        let now = Utc::now();
        let order = NewShippingOrder::new("K1", "K1", "V", "A").into_order(1, now);
        assert_eq!(order.id, 1);
        assert_eq!(order.order_id, "K1");
        assert_eq!(order.vendor, "V");
        assert_eq!(order.address, "A");
        assert_eq!(order.created_at, now);
        assert_eq!(order.updated_at, now);
    }

    #[test]
    fn test_serde_round_trip() {
        let order = NewShippingOrder::new("key-7", "ORD-7", "acme", "1 Main St")
            .into_order(42, Utc::now());
        let json = serde_json::to_vec(&order).unwrap();
        let decoded: ShippingOrder = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, order);
    }
}
