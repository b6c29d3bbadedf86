//! Top-level error and retry-policy types for the research pipeline.
//!
//! [`RunFailure`] is the payload of a run that ended in the `Failed` state. It
//! is a value, not something that propagates with `?` out of the public entry
//! point: callers inspect it on the terminal outcome.
//!
//! Component-level errors (model calls, search calls, clarification, brief
//! validation) are defined next to the ports and the validator that produce
//! them.
//!
//! [`RetryPolicy`] is a cross-cutting concern: any error type that participates
//! in retry decisions must be able to produce a [`RetryPolicy`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::ModelError;
use crate::schema::ValidationFailure;
use crate::state::PipelineStage;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by infrastructure error types to let the orchestrator decide
/// whether to re-invoke an operation.
///
/// - `Retryable` errors: timeouts, connection resets, rate-limit and 5xx responses.
/// - `NonRetryable` errors: authentication failures, malformed requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying (e.g.
    /// derived from a `Retry-After` response header).
    Retryable {
        /// Minimum back-off before the next attempt. `None` means retry
        /// immediately or apply the caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

impl RetryPolicy {
    /// Shorthand for an immediately retryable condition.
    pub fn retry_now() -> Self {
        Self::Retryable { after: None }
    }

    /// Returns `true` for [`RetryPolicy::Retryable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Caller input errors
// ---------------------------------------------------------------------------

/// Problems with what the caller (or the human answering clarifications)
/// supplied. Detected before any further model call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum InputError {
    /// The research topic was empty or whitespace-only.
    #[error("research topic is empty")]
    EmptyTopic,

    /// The model kept asking for clarification past the configured cap.
    #[error("clarification limit of {rounds} round(s) reached without a usable topic")]
    ClarificationLimit {
        /// Number of clarification rounds that were answered.
        rounds: u32,
    },

    /// The clarifier did not answer within the configured timeout.
    #[error("no clarification answer within {after:?}")]
    ClarificationTimeout {
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The clarifier answered with an empty string.
    #[error("clarification answer was empty")]
    EmptyAnswer,

    /// The clarifier could not ask the question at all (non-interactive run,
    /// closed terminal).
    #[error("clarification unavailable: {message}")]
    ClarifierUnavailable {
        /// Description supplied by the clarifier.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Terminal failure payload
// ---------------------------------------------------------------------------

/// Why a run ended in the `Failed` state.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum RunFailure {
    /// Caller input was unusable.
    #[error("input error: {0}")]
    Input(#[from] InputError),

    /// A model call failed after its retry budget was spent.
    #[error("model call failed during {stage}: {error}")]
    Model {
        /// Stage the call was made from.
        stage: PipelineStage,
        /// The final error.
        error: ModelError,
    },

    /// The model produced a brief that does not satisfy the schema.
    #[error("no brief produced: {0}")]
    Validation(#[from] ValidationFailure),
}

impl RunFailure {
    /// The stage in which the run failed.
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::Input(_) => PipelineStage::Clarify,
            Self::Model { stage, .. } => *stage,
            Self::Validation(_) => PipelineStage::ParseBrief,
        }
    }
}
