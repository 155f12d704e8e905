use http::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Errors surfaced by the idempotency coordinator, the executor and the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// The shared key-value store or the business store could not be reached.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A store call or persistence write exceeded its deadline.
    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    /// A stored value could not be decoded.
    #[error("Corrupt idempotency record: {0}")]
    Corrupt(String),

    /// A result could not be encoded for storage.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The business record write failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The idempotency record is in a state the protocol cannot produce.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A duplicate arrived while the original invocation was still running.
    #[error("Request is still in progress: {0}")]
    InProgress(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// HTTP status used when the error reaches the transport layer.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InProgress(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Corrupt(_)
            | AppError::Encoding(_)
            | AppError::Persistence(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for error responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Corrupt(_) => "CORRUPT_RECORD",
            AppError::Encoding(_) => "ENCODING_ERROR",
            AppError::Persistence(_) => "PERSISTENCE_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::InProgress(_) => "IN_PROGRESS",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Config(_) | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for failures a caller may retry with the same idempotency key.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::StoreUnavailable(_) | AppError::Timeout(_) | AppError::InProgress(_)
        )
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => AppError::StoreUnavailable(err.to_string()),
            sqlx::Error::RowNotFound => AppError::NotFound(err.to_string()),
            other => AppError::Persistence(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            AppError::Timeout(err.to_string())
        } else if err.kind() == redis::ErrorKind::TypeError || err.code() == Some("WRONGTYPE") {
            // The store answered, but the key does not hold what we wrote.
            AppError::Corrupt(err.to_string())
        } else {
            AppError::StoreUnavailable(err.to_string())
        }
    }
}
