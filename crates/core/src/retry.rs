//! Retry-with-backoff for LLM calls (SPEC_FULL §11), modeled on the
//! teacher provider's `ask()` retry loop: a fixed attempt count, a fixed
//! delay between attempts, and the last error surfaced on final failure.
//!
//! This is a distinct concern from the Manager's one-shot provider
//! fallback (§4.6): fallback switches to an *alternate* provider once;
//! this loop re-hits the *same* selected call for transient errors before
//! the Manager ever sees a failure. Summarization and Evaluation both
//! wrap their provider calls in this loop.

use std::time::Duration;

use crate::error::{CoreError, CoreResult};

/// Wraps `fut` with a deadline (§5): each LLM call carries a request
/// timeout (60s text, 120s vision by convention — see
/// [`crate::provider::TEXT_REQUEST_TIMEOUT`]/[`crate::provider::VISION_REQUEST_TIMEOUT`]).
pub async fn with_timeout<T>(duration: Duration, fut: impl std::future::Future<Output = CoreResult<T>>) -> CoreResult<T> {
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(CoreError::Timeout(duration)),
    }
}

/// Runs `f` up to `attempts` times (minimum 1), sleeping `delay` between
/// attempts, stopping early on an error that isn't fallback-eligible
/// (`QuotaExhausted`/`InvalidApiKey` are never worth retrying verbatim).
/// Returns the last error if every attempt fails.
pub async fn with_retry<F, Fut, T>(attempts: u32, delay: Duration, mut f: F) -> CoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = CoreResult<T>>,
{
    let attempts = attempts.max(1);
    let mut last_error: Option<CoreError> = None;

    for attempt in 0..attempts {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let retryable = e.is_fallback_eligible();
                last_error = Some(e);
                if !retryable || attempt + 1 == attempts {
                    break;
                }
                tracing::warn!(attempt = attempt + 1, attempts, "LLM call failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(last_error.expect("loop runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_on_second_attempt() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(CoreError::Provider("transient".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stops_immediately_on_non_retryable_error() {
        let calls = AtomicU32::new(0);
        let result: CoreResult<()> = with_retry(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CoreError::InvalidApiKey("remote-a".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_all_attempts_then_surfaces_last_error() {
        let calls = AtomicU32::new(0);
        let result: CoreResult<()> = with_retry(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CoreError::Provider("still failing".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
