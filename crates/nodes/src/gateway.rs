//! The LLM gateway: every model call in a run goes through here.
//!
//! Wraps a [`ModelGateway`] adapter with the retry budget and structured
//! logging shared by all stages. Token accounting is left to the caller, which
//! owns the run state.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use pipeline::{
    CompletionRequest, Message, ModelError, ModelGateway, ModelName, ModelReply, OutputSchema,
    RetryPolicy, StructuredReply,
};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// How transport failures are retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Extra attempts after a retryable transport failure.
    pub transport_retries: u32,
    /// Upper bound on a provider-requested delay.
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            transport_retries: 1,
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Token bucket shared by every call through one gateway.
///
/// Starts full; each call takes a token and waits for one to refill when the
/// bucket is empty.
#[derive(Debug)]
pub struct RateLimiter {
    per_second: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

impl RateLimiter {
    /// Calls burst up to this many before pacing starts.
    pub const DEFAULT_BURST: u32 = 3;

    /// `None` unless `per_second` is positive and finite.
    pub fn new(per_second: f64, burst: u32) -> Option<Self> {
        if !(per_second.is_finite() && per_second > 0.0) {
            return None;
        }
        let burst = f64::from(burst.max(1));
        Some(Self {
            per_second,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                refilled_at: Instant::now(),
            }),
        })
    }

    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let earned = now.duration_since(bucket.refilled_at).as_secs_f64() * self.per_second;
                bucket.tokens = (bucket.tokens + earned).min(self.burst);
                bucket.refilled_at = now;
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.per_second)
            };
            debug!(wait_ms = wait.as_millis() as u64, "rate limited; waiting");
            tokio::time::sleep(wait).await;
        }
    }
}

/// Retrying front for a [`ModelGateway`].
///
/// Only [`ModelError::Transport`] with a [`RetryPolicy::Retryable`] policy is
/// retried. Schema mismatches are returned at once: asking again with the same
/// prompt rarely repairs them, and the caller's validator reports them better.
#[derive(Clone)]
pub struct LlmGateway {
    inner: Arc<dyn ModelGateway>,
    retry: RetryConfig,
    limiter: Option<Arc<RateLimiter>>,
}

impl std::fmt::Debug for LlmGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmGateway")
            .field("model", &self.inner.model_name())
            .field("retry", &self.retry)
            .field("rate_limited", &self.limiter.is_some())
            .finish()
    }
}

impl LlmGateway {
    pub fn new(inner: Arc<dyn ModelGateway>) -> Self {
        Self {
            inner,
            retry: RetryConfig::default(),
            limiter: None,
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Paces every attempt, retries included, through `limiter`.
    #[must_use]
    pub fn with_rate_limit(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(Arc::new(limiter));
        self
    }

    pub fn model_name(&self) -> ModelName {
        self.inner.model_name()
    }

    /// Free-form completion, optionally offering tools.
    #[instrument(skip_all, fields(messages = request.messages.len(), tools = request.tools.len()))]
    pub async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply, ModelError> {
        let reply = self
            .retrying("complete", || self.inner.complete(request))
            .await?;
        debug!(
            tool_calls = reply.tool_calls.len(),
            prompt_tokens = reply.usage.prompt.as_u64(),
            completion_tokens = reply.usage.completion.as_u64(),
            "completion received"
        );
        Ok(reply)
    }

    /// Completion constrained to `schema`.
    #[instrument(skip_all, fields(schema = %schema.name))]
    pub async fn complete_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<StructuredReply, ModelError> {
        let reply = self
            .retrying("complete_structured", || {
                self.inner.complete_structured(messages, schema)
            })
            .await?;
        debug!(
            prompt_tokens = reply.usage.prompt.as_u64(),
            completion_tokens = reply.usage.completion.as_u64(),
            "structured completion received"
        );
        Ok(reply)
    }

    async fn retrying<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, ModelError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ModelError>>,
    {
        let mut retries_used = 0u32;
        loop {
            if let Some(limiter) = &self.limiter {
                limiter.acquire().await;
            }
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let retry_after = match (&err, err.retry_policy()) {
                (ModelError::Transport { .. }, RetryPolicy::Retryable { after }) => Some(after),
                _ => None,
            };
            let delay = match retry_after {
                Some(after) if retries_used < self.retry.transport_retries => {
                    after.unwrap_or_default().min(self.retry.max_backoff)
                }
                _ => {
                    warn!(operation, retries_used, error = %err, "model call failed");
                    return Err(err);
                }
            };

            retries_used += 1;
            warn!(
                operation,
                attempt = retries_used,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retryable model failure; retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Replays a fixed sequence of results, then repeats the last one.
    struct Scripted {
        replies: Mutex<Vec<Result<ModelReply, ModelError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(mut replies: Vec<Result<ModelReply, ModelError>>) -> Arc<Self> {
            replies.reverse();
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelGateway for Scripted {
        fn model_name(&self) -> ModelName {
            ModelName::new("scripted").unwrap()
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<ModelReply, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.pop().unwrap()
            } else {
                replies[0].clone()
            }
        }
    }

    fn transport(retry: RetryPolicy) -> ModelError {
        ModelError::Transport {
            message: "boom".into(),
            retry,
        }
    }

    #[tokio::test]
    async fn retryable_transport_error_is_retried_once() {
        let model = Scripted::new(vec![
            Err(transport(RetryPolicy::retry_now())),
            Ok(ModelReply::text("ok")),
        ]);
        let gateway = LlmGateway::new(model.clone());

        let reply = gateway
            .complete(&CompletionRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap();

        assert_eq!(reply.content, "ok");
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let model = Scripted::new(vec![Err(transport(RetryPolicy::retry_now()))]);
        let gateway = LlmGateway::new(model.clone());

        let result = gateway.complete(&CompletionRequest::default()).await;

        assert!(matches!(result, Err(ModelError::Transport { .. })));
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn non_retryable_and_schema_errors_fail_immediately() {
        let model = Scripted::new(vec![Err(transport(RetryPolicy::NonRetryable))]);
        let gateway = LlmGateway::new(model.clone());
        assert!(gateway.complete(&CompletionRequest::default()).await.is_err());
        assert_eq!(model.calls(), 1);

        let model = Scripted::new(vec![Err(ModelError::SchemaMismatch {
            message: "not json".into(),
            raw: "hello".into(),
        })]);
        let gateway = LlmGateway::new(model.clone());
        assert!(gateway.complete(&CompletionRequest::default()).await.is_err());
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn provider_delay_is_honoured_up_to_the_cap() {
        let model = Scripted::new(vec![
            Err(transport(RetryPolicy::Retryable {
                after: Some(Duration::from_secs(600)),
            })),
            Ok(ModelReply::text("late")),
        ]);
        let gateway = LlmGateway::new(model.clone());

        let started = tokio::time::Instant::now();
        let reply = gateway.complete(&CompletionRequest::default()).await.unwrap();

        assert_eq!(reply.content, "late");
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(30));
        assert!(waited < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_paces_calls_after_the_burst() {
        let model = Scripted::new(vec![Ok(ModelReply::text("ok"))]);
        let limiter = RateLimiter::new(0.5, 2).unwrap();
        let gateway = LlmGateway::new(model.clone()).with_rate_limit(limiter);

        let started = tokio::time::Instant::now();
        for _ in 0..2 {
            gateway.complete(&CompletionRequest::default()).await.unwrap();
        }
        assert!(started.elapsed() < Duration::from_millis(1));

        gateway.complete(&CompletionRequest::default()).await.unwrap();
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(2));
        assert!(waited < Duration::from_secs(3));
        assert_eq!(model.calls(), 3);
    }

    #[test]
    fn rate_limit_must_be_positive() {
        assert!(RateLimiter::new(0.0, 3).is_none());
        assert!(RateLimiter::new(-1.0, 3).is_none());
        assert!(RateLimiter::new(f64::NAN, 3).is_none());
        assert!(RateLimiter::new(0.2, 3).is_some());
    }
}
