use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Per-invocation context handed to an executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Key under which this invocation was claimed.
    pub idempotency_key: String,
    /// Deadline for the executor's external write.
    pub timeout: Duration,
}

impl ExecutionContext {
    pub fn new(idempotency_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            idempotency_key: idempotency_key.into(),
            timeout,
        }
    }
}

/// The side effect guarded by an idempotency key.
///
/// Must be safe to run concurrently for different keys. The request handler
/// only runs it after a fresh claim.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    type Payload: Send + Sync + 'static;
    type Output: Send + Sync + 'static;

    async fn run(&self, ctx: &ExecutionContext, payload: Self::Payload) -> Result<Self::Output>;
}

/// Pause applied before the executor's write, for latency testing.
#[async_trait]
pub trait DelayStrategy: Send + Sync {
    async fn pause(&self);
}

/// No artificial latency.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

#[async_trait]
impl DelayStrategy for NoDelay {
    async fn pause(&self) {}
}

/// Fixed artificial latency.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

#[async_trait]
impl DelayStrategy for FixedDelay {
    async fn pause(&self) {
        tokio::time::sleep(self.0).await;
    }
}
