//! Provider failures and their mapping onto [`ModelError`].

use std::time::Duration;

use pipeline::{ModelError, RetryPolicy};
use thiserror::Error;

/// Errors raised while talking to the provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request never produced a response (connect, timeout, TLS).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("provider returned status {status}: {message}")]
    Status {
        status: u16,
        message: String,
        /// Parsed from the `Retry-After` header, when present.
        retry_after: Option<Duration>,
    },

    /// The response body was not the expected shape.
    #[error("failed to decode provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Whether retrying the same request could succeed.
    ///
    /// Rate limits, server errors and timeouts are transient; authentication
    /// and request-shape errors are not.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Http(err) if err.is_timeout() || err.is_connect() || err.is_request() => {
                RetryPolicy::retry_now()
            }
            Self::Http(_) => RetryPolicy::NonRetryable,
            Self::Status {
                status,
                retry_after,
                ..
            } => match *status {
                408 | 429 => RetryPolicy::Retryable {
                    after: *retry_after,
                },
                s if s >= 500 => RetryPolicy::Retryable {
                    after: *retry_after,
                },
                _ => RetryPolicy::NonRetryable,
            },
            Self::Decode(_) => RetryPolicy::NonRetryable,
        }
    }
}

impl From<ProviderError> for ModelError {
    fn from(err: ProviderError) -> Self {
        ModelError::Transport {
            retry: err.retry_policy(),
            message: err.to_string(),
        }
    }
}

/// Parses a `Retry-After` value given in seconds. HTTP-date values are ignored.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
