use log::{debug, error, info, warn};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Debug, Clone, Error)]
pub enum RouterError {
    /// Network/connectivity issues talking to an external service
    #[error("Network Error: {0}")]
    NetworkError(String),

    /// JSON-RPC errors from a chain node
    #[error("RPC Error: {0}")]
    RpcError(String),

    /// An external call exceeded its deadline
    #[error("Timeout Error: {0}")]
    TimeoutError(String),

    /// Malformed payloads from indexers, nodes or cache tiers
    #[error("Parse Error: {0}")]
    ParseError(String),

    /// Cache tier errors (Redis, disk)
    #[error("Cache Error: {0}")]
    CacheError(String),

    /// Configuration errors
    #[error("Config Error: {0}")]
    ConfigError(String),

    /// Invalid input parameters
    #[error("Invalid Input: {0}")]
    InvalidInput(String),

    /// No pool exists for the requested pair
    #[error("Pair Not Found: {0}")]
    PairNotFound(String),

    /// Route or bridge quote used after its expiry
    #[error("Quote Expired: {0}")]
    QuoteExpired(String),

    /// Structural or economic route check failed
    #[error("Validation Failed: {0}")]
    ValidationFailed(String),

    /// Bridge adapter errors
    #[error("Bridge Error: {0}")]
    BridgeError(String),

    /// An external quote source failed
    #[error("Source Failure: {0}")]
    SourceFailure(String),

    /// Unknown/unclassified errors
    #[error("Unknown Error: {0}")]
    Unknown(String),
}

impl From<serde_json::Error> for RouterError {
    fn from(err: serde_json::Error) -> Self {
        RouterError::ParseError(format!("JSON serialization/deserialization error: {}", err))
    }
}

impl From<anyhow::Error> for RouterError {
    fn from(err: anyhow::Error) -> Self {
        RouterError::Unknown(format!("{:#}", err))
    }
}

impl From<reqwest::Error> for RouterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RouterError::TimeoutError(err.to_string())
        } else if err.is_decode() {
            RouterError::ParseError(err.to_string())
        } else {
            RouterError::NetworkError(err.to_string())
        }
    }
}

impl From<alloy::contract::Error> for RouterError {
    fn from(err: alloy::contract::Error) -> Self {
        RouterError::RpcError(err.to_string())
    }
}

impl From<redis::RedisError> for RouterError {
    fn from(err: redis::RedisError) -> Self {
        RouterError::CacheError(format!("Redis error: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for RouterError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        RouterError::TimeoutError(err.to_string())
    }
}

impl RouterError {
    /// Determines if an error is recoverable through retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            RouterError::NetworkError(_) => true,
            RouterError::RpcError(_) => true,
            RouterError::TimeoutError(_) => true,
            RouterError::CacheError(_) => true,
            RouterError::SourceFailure(_) => true,
            RouterError::BridgeError(_) => true,
            RouterError::Unknown(_) => true,
            RouterError::ParseError(_) => false,
            RouterError::ConfigError(_) => false,
            RouterError::InvalidInput(_) => false,
            RouterError::PairNotFound(_) => false,
            RouterError::QuoteExpired(_) => false, // must be re-fetched, not retried
            RouterError::ValidationFailed(_) => false,
        }
    }

    /// Determines if operation should be retried immediately
    pub fn should_retry(&self) -> bool {
        self.is_recoverable()
            && matches!(
                self,
                RouterError::NetworkError(_)
                    | RouterError::RpcError(_)
                    | RouterError::TimeoutError(_)
                    | RouterError::CacheError(_)
            )
    }

    /// Maps the error onto the routing failure taxonomy
    pub fn categorize(&self) -> ErrorCategory {
        match self {
            RouterError::PairNotFound(_) => ErrorCategory::DataUnavailable,
            RouterError::ParseError(_) => ErrorCategory::DataUnavailable,
            RouterError::QuoteExpired(_) => ErrorCategory::StaleQuote,
            RouterError::ValidationFailed(_) | RouterError::InvalidInput(_) => {
                ErrorCategory::Validation
            }
            RouterError::NetworkError(_)
            | RouterError::RpcError(_)
            | RouterError::TimeoutError(_)
            | RouterError::SourceFailure(_)
            | RouterError::BridgeError(_) => ErrorCategory::SourceFailure,
            RouterError::CacheError(_) => ErrorCategory::Infrastructure,
            RouterError::ConfigError(_) => ErrorCategory::Configuration,
            RouterError::Unknown(_) => ErrorCategory::Infrastructure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A fetch returned nothing; callers fall back to the next tier or source
    DataUnavailable,
    /// Route or bridge quote past `expires_at`
    StaleQuote,
    /// Structural route inconsistency
    Validation,
    /// An external dependency failed
    SourceFailure,
    Configuration,
    Infrastructure,
}

/// Retry policy with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Calculate delay for a given attempt (exponential backoff)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        let delay_ms = self.base_delay.as_millis() * (2_u128.pow(attempt - 1));
        let delay = Duration::from_millis(delay_ms.min(self.max_delay.as_millis()) as u64);

        debug!("Retry attempt {}: delay = {:?}", attempt, delay);
        delay
    }

    /// Execute operation with retry logic
    pub async fn execute<F, T, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                sleep(self.delay_for_attempt(attempt)).await;
            }

            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!("Operation succeeded after {} retries", attempt);
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if !e.should_retry() {
                        warn!("Non-retryable error on attempt {}: {}", attempt + 1, e);
                        return Err(e);
                    }

                    warn!("Attempt {} failed: {} (retrying...)", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        error!("All {} retry attempts failed", self.max_attempts);
        Err(last_error.unwrap_or_else(|| RouterError::Unknown("Max retries exceeded".to_string())))
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            RouterError::QuoteExpired("q".into()).categorize(),
            ErrorCategory::StaleQuote
        );
        assert_eq!(
            RouterError::PairNotFound("p".into()).categorize(),
            ErrorCategory::DataUnavailable
        );
        assert_eq!(
            RouterError::TimeoutError("t".into()).categorize(),
            ErrorCategory::SourceFailure
        );
        assert!(!RouterError::QuoteExpired("q".into()).is_recoverable());
        assert!(RouterError::NetworkError("n".into()).should_retry());
        assert!(!RouterError::BridgeError("b".into()).should_retry());
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(0));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_retry_stops_on_non_retryable() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = policy
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(RouterError::ParseError("bad".into()))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = policy
            .execute(|| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(RouterError::NetworkError("reset".into()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
