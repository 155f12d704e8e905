pub mod codec;
pub mod coordinator;
pub mod storage;

pub use codec::{Codec, JsonCodec};
pub use coordinator::{
    ClaimOutcome, CoordinatorConfig, IdempotencyCoordinator, IdempotencyMetrics, MetricsSnapshot,
    Reconciler,
};
pub use storage::{
    IdempotencyRecord, IdempotencyStatus, InMemoryKeyValueStore, KeyValueStore,
    RedisKeyValueStore, STATUS_FIELD, VALUE_FIELD,
};
