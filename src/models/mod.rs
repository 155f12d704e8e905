pub mod shipping_order;

pub use shipping_order::{NewShippingOrder, ShippingOrder};
