use std::{sync::Arc, time::Duration};

use {async_trait::async_trait, tracing::warn};

use crate::{CompletionRequest, CompletionResponse, ProviderClient, ProviderError};

const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Retries retryable provider errors with exponential backoff.
///
/// Non-retryable errors (auth, invalid request) return immediately.
pub struct RetryingProvider {
    inner: Arc<dyn ProviderClient>,
    max_retries: u32,
    base_delay: Duration,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn ProviderClient>, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            base_delay: Duration::from_millis(250),
        }
    }

    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(MAX_BACKOFF)
    }
}

#[async_trait]
impl ProviderClient for RetryingProvider {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    attempt += 1;
                    warn!(
                        provider = %self.inner.id(),
                        model = %request.model,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{
            collections::HashMap,
            sync::{
                Mutex,
                atomic::{AtomicU32, Ordering},
            },
        },
    };

    struct Scripted {
        outcomes: Mutex<Vec<Result<CompletionResponse, ProviderError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(mut outcomes: Vec<Result<CompletionResponse, ProviderError>>) -> Arc<Self> {
            outcomes.reverse();
            Arc::new(Self {
                outcomes: Mutex::new(outcomes),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl ProviderClient for Scripted {
        fn id(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(ProviderError::Other("script exhausted".into())))
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            conversation_id: "c".into(),
            model: "m".into(),
            temperature: 0.7,
            max_tokens: 10,
            history: Vec::new(),
            prompt: "hi".into(),
            base_url: None,
            api_key: None,
            extra_params: HashMap::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_retryable_errors_until_success() {
        let inner = Scripted::new(vec![
            Err(ProviderError::Server("503".into())),
            Err(ProviderError::RateLimit("429".into())),
            Ok(CompletionResponse::text("done")),
        ]);
        let provider = RetryingProvider::new(inner.clone(), 2);
        let response = provider.complete(&request()).await.unwrap();
        assert_eq!(response.text, "done");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let inner = Scripted::new(vec![
            Err(ProviderError::Server("1".into())),
            Err(ProviderError::Server("2".into())),
            Ok(CompletionResponse::text("late")),
        ]);
        let provider = RetryingProvider::new(inner.clone(), 1);
        let err = provider.complete(&request()).await.unwrap_err();
        assert_eq!(err, ProviderError::Server("2".into()));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn auth_errors_are_not_retried() {
        let inner = Scripted::new(vec![Err(ProviderError::Auth("401".into()))]);
        let provider = RetryingProvider::new(inner.clone(), 5);
        assert!(provider.complete(&request()).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_is_capped() {
        let inner = Scripted::new(vec![]);
        let provider = RetryingProvider::new(inner, 10).with_base_delay(Duration::from_secs(1));
        assert_eq!(provider.backoff(0), Duration::from_secs(1));
        assert_eq!(provider.backoff(2), Duration::from_secs(4));
        assert_eq!(provider.backoff(8), MAX_BACKOFF);
    }
}
