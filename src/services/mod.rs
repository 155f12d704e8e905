pub mod executor;
pub mod request_handler;
pub mod shipping_executor;

pub use executor::{DelayStrategy, ExecutionContext, FixedDelay, NoDelay, OperationExecutor};
pub use request_handler::{HandlerOutcome, IdempotentRequestHandler};
pub use shipping_executor::{PlaceShippingOrder, ShippingOrderExecutor};
