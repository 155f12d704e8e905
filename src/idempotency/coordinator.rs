use crate::error::{AppError, Result};
use crate::idempotency::codec::{Codec, JsonCodec};
use crate::idempotency::storage::{
    IdempotencyRecord, IdempotencyStatus, KeyValueStore, STATUS_FIELD, VALUE_FIELD,
};
use crate::observability::{get_metrics, mask_key, LatencyTimer};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Counters for one coordinator instance.
#[derive(Debug, Default)]
pub struct IdempotencyMetrics {
    pub total_claims: AtomicU64,
    pub fresh_claims: AtomicU64,
    pub duplicate_claims: AtomicU64,
    pub in_flight_waits: AtomicU64,
    pub reconciled: AtomicU64,
    pub in_progress_rejections: AtomicU64,
    pub abandoned_claims: AtomicU64,
    pub published: AtomicU64,
    pub publish_failures: AtomicU64,
}

impl IdempotencyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_claim(&self) {
        self.total_claims.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fresh(&self) {
        self.fresh_claims.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicate_claims.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_in_flight_wait(&self) {
        self.in_flight_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconciled(&self) {
        self.reconciled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_in_progress(&self) {
        self.in_progress_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self) {
        self.abandoned_claims.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_claims: self.total_claims.load(Ordering::Relaxed),
            fresh_claims: self.fresh_claims.load(Ordering::Relaxed),
            duplicate_claims: self.duplicate_claims.load(Ordering::Relaxed),
            in_flight_waits: self.in_flight_waits.load(Ordering::Relaxed),
            reconciled: self.reconciled.load(Ordering::Relaxed),
            in_progress_rejections: self.in_progress_rejections.load(Ordering::Relaxed),
            abandoned_claims: self.abandoned_claims.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_claims: u64,
    pub fresh_claims: u64,
    pub duplicate_claims: u64,
    pub in_flight_waits: u64,
    pub reconciled: u64,
    pub in_progress_rejections: u64,
    pub abandoned_claims: u64,
    pub published: u64,
    pub publish_failures: u64,
}

impl MetricsSnapshot {
    pub fn duplicate_rate(&self) -> f64 {
        if self.total_claims == 0 {
            0.0
        } else {
            self.duplicate_claims as f64 / self.total_claims as f64
        }
    }
}

/// Result of claiming an idempotency key.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome<T> {
    /// The caller owns this invocation and must run the operation.
    Fresh,
    /// The key was claimed before; carries the published result.
    Duplicate(T),
}

impl<T> ClaimOutcome<T> {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, ClaimOutcome::Duplicate(_))
    }

    /// Splits into `(prior value, is_duplicate)`.
    pub fn into_parts(self) -> (Option<T>, bool) {
        match self {
            ClaimOutcome::Fresh => (None, false),
            ClaimOutcome::Duplicate(value) => (Some(value), true),
        }
    }
}

/// Recovers the result of an invocation whose record never reached `Completed`,
/// typically by looking the business record up by idempotency key.
///
/// `Ok(None)` is taken as final: the invocation produced nothing and never
/// will, so the poll window must outlast the guarded operation's deadline.
#[async_trait]
pub trait Reconciler<T>: Send + Sync {
    async fn recover(&self, key: &str) -> Result<Option<T>>;
}

/// Configuration for the idempotency coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Namespace prepended to every key, as `<prefix>:<key>`.
    pub key_prefix: String,
    /// Deadline for each individual store call.
    pub store_timeout: Duration,
    /// Delay between status polls while a duplicate waits on an in-flight claim.
    pub poll_interval: Duration,
    /// Polls after the first read before falling back to reconciliation.
    pub max_poll_attempts: u32,
}

impl CoordinatorConfig {
    /// How long a duplicate waits on an in-flight claim before reconciling.
    pub fn poll_window(&self) -> Duration {
        self.poll_interval.saturating_mul(self.max_poll_attempts)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            key_prefix: "idempotency".to_string(),
            store_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(100),
            max_poll_attempts: 30,
        }
    }
}

/// Claims idempotency keys and publishes results against a shared store.
///
/// Per key the record moves `Unset -> Started -> Completed` and never back.
/// `claim` is the only insert and `publish` the only overwrite; reconciliation
/// repairs a stuck record through `publish` as well.
///
/// A duplicate that finds the record `Started` polls until it completes. If
/// it does not complete within `max_poll_attempts`, the reconciler (when
/// installed) is asked for the result. When the reconciler finds nothing the
/// original invocation failed and the claim returns [`AppError::Conflict`];
/// without a reconciler the outcome is unknown and the claim returns
/// [`AppError::InProgress`]. A duplicate never sees an empty value.
pub struct IdempotencyCoordinator<T, C = JsonCodec> {
    store: Arc<dyn KeyValueStore>,
    codec: C,
    config: CoordinatorConfig,
    reconciler: Option<Arc<dyn Reconciler<T>>>,
    metrics: Arc<IdempotencyMetrics>,
}

impl<T> IdempotencyCoordinator<T, JsonCodec>
where
    T: Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static,
{
    /// Creates a coordinator storing results as JSON.
    pub fn json(store: Arc<dyn KeyValueStore>, config: CoordinatorConfig) -> Self {
        Self::new(store, JsonCodec, config)
    }
}

impl<T, C> IdempotencyCoordinator<T, C>
where
    T: Send + Sync + 'static,
    C: Codec<T>,
{
    pub fn new(store: Arc<dyn KeyValueStore>, codec: C, config: CoordinatorConfig) -> Self {
        Self {
            store,
            codec,
            config,
            reconciler: None,
            metrics: Arc::new(IdempotencyMetrics::new()),
        }
    }

    /// Installs a fallback used when an in-flight claim never completes.
    pub fn with_reconciler(mut self, reconciler: Arc<dyn Reconciler<T>>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<IdempotencyMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Store key for an idempotency key.
    pub fn record_key(&self, idempotency_key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, idempotency_key)
    }

    /// Atomically claims `key`.
    ///
    /// Returns [`ClaimOutcome::Fresh`] to exactly one caller per key; every
    /// other caller gets [`ClaimOutcome::Duplicate`] with the published value.
    pub async fn claim(&self, key: &str) -> Result<ClaimOutcome<T>> {
        if key.trim().is_empty() {
            return Err(AppError::Validation(
                "idempotency key cannot be empty".to_string(),
            ));
        }

        self.metrics.record_claim();
        let record_key = self.record_key(key);

        let created = self
            .with_deadline(
                "set_if_absent",
                self.store.set_if_absent(
                    &record_key,
                    STATUS_FIELD,
                    IdempotencyStatus::Started.as_str().as_bytes(),
                ),
            )
            .await?;

        if created {
            self.metrics.record_fresh();
            get_metrics().record_claim("fresh");
            tracing::debug!(key = %mask_key(key), "Claimed idempotency key");
            return Ok(ClaimOutcome::Fresh);
        }

        self.metrics.record_duplicate();
        let value = self.await_completion(key, &record_key).await?;
        get_metrics().record_claim("duplicate");
        tracing::debug!(key = %mask_key(key), "Duplicate request served from idempotency record");
        Ok(ClaimOutcome::Duplicate(value))
    }

    /// Records `value` as the result for `key` and marks the record completed.
    ///
    /// Safe to repeat; the last published value wins.
    pub async fn publish(&self, key: &str, value: &T) -> Result<()> {
        let bytes = self.codec.encode(value)?;
        let record_key = self.record_key(key);

        let result = self.write_completed(&record_key, &bytes).await;
        match &result {
            Ok(()) => {
                self.metrics.record_published();
                get_metrics().record_publish(true);
                tracing::debug!(key = %mask_key(key), "Published idempotency result");
            }
            Err(e) => {
                self.metrics.record_publish_failure();
                get_metrics().record_publish(false);
                tracing::error!(
                    key = %mask_key(key),
                    error = %e,
                    "Failed to publish idempotency result"
                );
            }
        }
        result
    }

    /// Reads the current record for `key` without modifying it.
    pub async fn record(&self, key: &str) -> Result<IdempotencyRecord<T>> {
        let record_key = self.record_key(key);
        let raw_status = self
            .with_deadline("get_field", self.store.get_field(&record_key, STATUS_FIELD))
            .await?;
        let status = IdempotencyStatus::from_field(raw_status.as_deref())?;

        let value = if status == IdempotencyStatus::Completed {
            let raw_value = self
                .with_deadline("get_field", self.store.get_field(&record_key, VALUE_FIELD))
                .await?;
            match raw_value {
                Some(bytes) => Some(self.codec.decode(&bytes)?),
                None => {
                    return Err(AppError::Conflict(format!(
                        "record {} is completed but holds no value",
                        mask_key(key)
                    )))
                }
            }
        } else {
            None
        };

        Ok(IdempotencyRecord {
            key: key.to_string(),
            status,
            value,
        })
    }

    async fn write_completed(&self, record_key: &str, bytes: &[u8]) -> Result<()> {
        // Value before status, so a completed status always has a value.
        self.with_deadline(
            "set_field",
            self.store.set_field(record_key, VALUE_FIELD, bytes),
        )
        .await?;
        self.with_deadline(
            "set_field",
            self.store.set_field(
                record_key,
                STATUS_FIELD,
                IdempotencyStatus::Completed.as_str().as_bytes(),
            ),
        )
        .await
    }

    async fn await_completion(&self, key: &str, record_key: &str) -> Result<T> {
        let max_polls = self.config.max_poll_attempts;

        for attempt in 0..=max_polls {
            let record = self.record(key).await?;
            match record.status {
                IdempotencyStatus::Completed => {
                    if let Some(value) = record.value {
                        return Ok(value);
                    }
                }
                IdempotencyStatus::Started => {}
                IdempotencyStatus::Unset => {
                    return Err(AppError::Conflict(format!(
                        "record {} vanished after a failed claim",
                        record_key
                    )));
                }
            }

            if attempt == 0 {
                self.metrics.record_in_flight_wait();
                tracing::debug!(key = %mask_key(key), "Waiting on in-flight invocation");
            }
            if attempt < max_polls {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }

        self.reconcile(key).await
    }

    async fn reconcile(&self, key: &str) -> Result<T> {
        let reconciler = match &self.reconciler {
            Some(reconciler) => reconciler,
            None => {
                self.metrics.record_in_progress();
                get_metrics().record_claim("in_progress");
                return Err(AppError::InProgress(format!(
                    "key {} is claimed by an invocation that has not completed",
                    mask_key(key)
                )));
            }
        };

        match reconciler.recover(key).await? {
            Some(value) => {
                tracing::warn!(
                    key = %mask_key(key),
                    "Idempotency record stuck in started state, republishing recovered result"
                );
                self.publish(key, &value).await?;
                self.metrics.record_reconciled();
                get_metrics().record_reconciliation();
                Ok(value)
            }
            None => {
                self.metrics.record_abandoned();
                get_metrics().record_claim("abandoned");
                tracing::warn!(
                    key = %mask_key(key),
                    "Idempotency key claimed by an invocation that produced no result"
                );
                Err(AppError::Conflict(format!(
                    "key {} was claimed by an invocation that failed without a result",
                    mask_key(key)
                )))
            }
        }
    }

    async fn with_deadline<R, F>(&self, operation: &'static str, fut: F) -> Result<R>
    where
        F: Future<Output = Result<R>>,
    {
        let timer = LatencyTimer::new();
        let result = match tokio::time::timeout(self.config.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "{} on {} store exceeded {:?}",
                operation,
                self.store.name(),
                self.config.store_timeout
            ))),
        };
        get_metrics().record_store_operation(
            self.store.name(),
            operation,
            timer.elapsed_ms(),
            result.is_ok(),
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idempotency::storage::InMemoryKeyValueStore;

    fn coordinator() -> IdempotencyCoordinator<String> {
        IdempotencyCoordinator::json(
            Arc::new(InMemoryKeyValueStore::new()),
            CoordinatorConfig {
                poll_interval: Duration::from_millis(1),
                max_poll_attempts: 2,
                ..CoordinatorConfig::default()
            },
        )
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = IdempotencyMetrics::new();
        metrics.record_claim();
        metrics.record_claim();
        metrics.record_duplicate();
        metrics.record_fresh();
        metrics.record_published();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_claims, 2);
        assert_eq!(snapshot.duplicate_claims, 1);
        assert_eq!(snapshot.fresh_claims, 1);
        assert_eq!(snapshot.published, 1);
        assert_eq!(snapshot.duplicate_rate(), 0.5);
    }

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.key_prefix, "idempotency");
        assert_eq!(config.max_poll_attempts, 30);
        assert_eq!(config.poll_window(), Duration::from_secs(3));
    }

    #[test]
    fn test_record_key_namespacing() {
        assert_eq!(coordinator().record_key("K1"), "idempotency:K1");
    }

    #[test]
    fn test_claim_outcome_parts() {
        assert_eq!(ClaimOutcome::<u8>::Fresh.into_parts(), (None, false));
        assert_eq!(ClaimOutcome::Duplicate(3u8).into_parts(), (Some(3), true));
        assert!(ClaimOutcome::Duplicate(1u8).is_duplicate());
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let result = coordinator().claim("  ").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_record_lifecycle() {
        let coordinator = coordinator();

        let unset = coordinator.record("K").await.unwrap();
        assert_eq!(unset.status, IdempotencyStatus::Unset);

        assert_eq!(coordinator.claim("K").await.unwrap(), ClaimOutcome::Fresh);
        let started = coordinator.record("K").await.unwrap();
        assert!(started.is_in_flight());
        assert!(started.value.is_none());

        coordinator.publish("K", &"done".to_string()).await.unwrap();
        let completed = coordinator.record("K").await.unwrap();
        assert!(completed.is_completed());
        assert_eq!(completed.value.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn test_in_flight_without_reconciler_is_in_progress() {
        let coordinator = coordinator();
        coordinator.claim("K").await.unwrap();

        let result = coordinator.claim("K").await;
        assert!(matches!(result, Err(AppError::InProgress(_))));

        let snapshot = coordinator.metrics().snapshot();
        assert_eq!(snapshot.in_flight_waits, 1);
        assert_eq!(snapshot.in_progress_rejections, 1);
    }
}
