pub mod shipping_order_repository;

pub use shipping_order_repository::{
    InMemoryShippingOrderRepository, PostgresShippingOrderRepository, ShippingOrderStore,
};

#[cfg(test)]
pub use shipping_order_repository::MockShippingOrderStore;
