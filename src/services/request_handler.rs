use crate::error::Result;
use crate::idempotency::{ClaimOutcome, Codec, IdempotencyCoordinator, JsonCodec};
use crate::observability::mask_key;
use crate::services::executor::{ExecutionContext, OperationExecutor};
use std::sync::Arc;
use std::time::Duration;

/// How a request was satisfied.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome<T> {
    /// This request ran the operation.
    Created(T),
    /// An earlier request with the same key ran it; this is its result.
    Replayed(T),
}

impl<T> HandlerOutcome<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, HandlerOutcome::Created(_))
    }

    pub fn value(&self) -> &T {
        match self {
            HandlerOutcome::Created(value) | HandlerOutcome::Replayed(value) => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            HandlerOutcome::Created(value) | HandlerOutcome::Replayed(value) => value,
        }
    }
}

/// Runs an executor at most once per idempotency key.
pub struct IdempotentRequestHandler<E, C = JsonCodec>
where
    E: OperationExecutor,
{
    coordinator: Arc<IdempotencyCoordinator<E::Output, C>>,
    executor: Arc<E>,
    execution_timeout: Duration,
}

impl<E, C> IdempotentRequestHandler<E, C>
where
    E: OperationExecutor,
    C: Codec<E::Output>,
{
    pub fn new(
        coordinator: Arc<IdempotencyCoordinator<E::Output, C>>,
        executor: Arc<E>,
        execution_timeout: Duration,
    ) -> Self {
        Self {
            coordinator,
            executor,
            execution_timeout,
        }
    }

    pub fn coordinator(&self) -> &Arc<IdempotencyCoordinator<E::Output, C>> {
        &self.coordinator
    }

    /// Claims `key`, then either replays the stored result or runs the
    /// executor and publishes what it produced.
    ///
    /// If publishing fails after the executor succeeded, the error is
    /// returned and the record stays `started`; a retry with the same key
    /// reconciles it.
    pub async fn handle(
        &self,
        key: &str,
        payload: E::Payload,
    ) -> Result<HandlerOutcome<E::Output>> {
        if let ClaimOutcome::Duplicate(prior) = self.coordinator.claim(key).await? {
            tracing::info!(key = %mask_key(key), "Replaying stored result for duplicate request");
            return Ok(HandlerOutcome::Replayed(prior));
        }

        let ctx = ExecutionContext::new(key, self.execution_timeout);
        let output = match self.executor.run(&ctx, payload).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(
                    key = %mask_key(key),
                    error = %e,
                    "Operation failed after claim; key remains in started state"
                );
                return Err(e);
            }
        };

        if let Err(e) = self.coordinator.publish(key, &output).await {
            tracing::error!(
                key = %mask_key(key),
                error = %e,
                "Operation succeeded but its result was not published"
            );
            return Err(e);
        }

        Ok(HandlerOutcome::Created(output))
    }
}
