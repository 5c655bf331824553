//! Rate-limit failover across pooled keys
//!
//! `KeyPool::invoke` runs one logical call, trying keys in cursor order. Only
//! failures classified as rate limits move on to the next key; the loop is
//! bounded by the pool size sampled at the start of the call.

use std::future::Future;

use provider::{ErrorClassification, UpstreamError};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::pool::KeyPool;
use crate::quota::classify_error;

fn record_attempt(outcome: &'static str) {
    metrics::counter!("keypool_attempts_total", "outcome" => outcome).increment(1);
}

fn record_invocation(outcome: &'static str) {
    metrics::counter!("keypool_invocations_total", "outcome" => outcome).increment(1);
}

impl<H: Clone> KeyPool<H> {
    /// Run `operation` with the handle of the current key, failing over to
    /// the next key on rate-limit errors.
    ///
    /// - Empty pool: `NotConfigured`, `operation` is never called.
    /// - Success: the cursor advances past the key that succeeded.
    /// - Rate limited: the cursor advances and the next key is tried, at most
    ///   once per key; when all are rate limited, `RateLimitExhausted` carries
    ///   the attempt count and the last error's message.
    /// - Any other error: returned unchanged as `Upstream`, no further attempts.
    pub async fn invoke<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut(H) -> Fut,
        Fut: Future<Output = provider::Result<T>>,
    {
        let limit = self.size().await;
        if limit == 0 {
            record_invocation(Error::NotConfigured.kind());
            return Err(Error::NotConfigured);
        }

        let mut attempts = 0usize;
        let mut rate_limited: Vec<UpstreamError> = Vec::new();

        while attempts < limit {
            // The pool can be emptied by the admin API mid-call.
            let Some(selected) = self.current().await else {
                break;
            };

            match operation(selected.handle).await {
                Ok(value) => {
                    self.advance().await;
                    record_attempt("success");
                    record_invocation("success");
                    debug!(key_hint = %selected.hint, attempt = attempts + 1, "invocation succeeded");
                    return Ok(value);
                }
                Err(e) => match classify_error(&e) {
                    ErrorClassification::RateLimited => {
                        record_attempt(ErrorClassification::RateLimited.label());
                        warn!(
                            key_hint = %selected.hint,
                            attempt = attempts + 1,
                            of = limit,
                            error = %e,
                            "key rate limited, failing over to next key"
                        );
                        rate_limited.push(e);
                        self.advance().await;
                        attempts += 1;
                    }
                    ErrorClassification::Fatal => {
                        record_attempt(ErrorClassification::Fatal.label());
                        let err = Error::Upstream(e);
                        record_invocation(err.kind());
                        warn!(key_hint = %selected.hint, error = %err, "upstream call failed");
                        return Err(err);
                    }
                },
            }
        }

        let err = match rate_limited.pop() {
            Some(last) => Error::RateLimitExhausted {
                attempts,
                last_message: last.message,
            },
            None => Error::NotConfigured,
        };
        record_invocation(err.kind());
        warn!(attempts, error = %err, "invocation gave up");
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct FakeHandle(String);

    async fn loaded(keys: &[&str]) -> KeyPool<FakeHandle> {
        let pool = KeyPool::new(|key| FakeHandle(key.to_string()));
        pool.load(keys.iter().map(|k| k.to_string())).await;
        pool
    }

    /// Records every key an operation was called with.
    #[derive(Clone, Default)]
    struct CallLog(Arc<Mutex<Vec<String>>>);

    impl CallLog {
        fn push(&self, key: &str) {
            self.0.lock().unwrap().push(key.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    fn quota_error() -> UpstreamError {
        UpstreamError::with_status(429, "429 Too Many Requests: [RESOURCE_EXHAUSTED] quota")
    }

    #[tokio::test]
    async fn empty_pool_never_calls_operation() {
        let pool = loaded(&[]).await;
        let log = CallLog::default();

        let result: Result<()> = pool
            .invoke(|h: FakeHandle| {
                let log = log.clone();
                async move {
                    log.push(&h.0);
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(Error::NotConfigured)));
        assert!(log.calls().is_empty());
    }

    #[tokio::test]
    async fn success_on_first_key_advances_cursor() {
        let pool = loaded(&["a", "b", "c"]).await;
        let log = CallLog::default();

        let result = pool
            .invoke(|h: FakeHandle| {
                let log = log.clone();
                async move {
                    log.push(&h.0);
                    Ok(format!("done by {}", h.0))
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "done by a");
        assert_eq!(log.calls(), vec!["a"]);
        assert_eq!(pool.current().await.unwrap().handle.0, "b");
    }

    #[tokio::test]
    async fn all_keys_rate_limited_exhausts_after_k_attempts() {
        for k in 1..=4 {
            let keys: Vec<String> = (0..k).map(|i| format!("k{i}")).collect();
            let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
            let pool = loaded(&key_refs).await;
            let log = CallLog::default();

            let result: Result<()> = pool
                .invoke(|h: FakeHandle| {
                    let log = log.clone();
                    async move {
                        log.push(&h.0);
                        Err(UpstreamError::new(format!("Quota exceeded on {}", h.0)))
                    }
                })
                .await;

            assert_eq!(log.calls().len(), k, "pool of size {k}");
            let unique: HashSet<String> = log.calls().into_iter().collect();
            assert_eq!(unique.len(), k, "each key tried once");
            match result {
                Err(Error::RateLimitExhausted {
                    attempts,
                    last_message,
                }) => {
                    assert_eq!(attempts, k);
                    assert_eq!(last_message, format!("Quota exceeded on k{}", k - 1));
                }
                other => panic!("expected RateLimitExhausted, got {other:?}"),
            }
            // One full lap: back at the start
            assert_eq!(pool.current().await.unwrap().handle.0, "k0");
        }
    }

    #[tokio::test]
    async fn fails_over_then_succeeds() {
        let pool = loaded(&["a", "b", "c", "d"]).await;
        for m in 0..4 {
            pool.load(["a", "b", "c", "d"].map(String::from)).await;
            let log = CallLog::default();

            let result = pool
                .invoke(|h: FakeHandle| {
                    let log = log.clone();
                    async move {
                        log.push(&h.0);
                        if log.calls().len() <= m {
                            Err(quota_error())
                        } else {
                            Ok(h.0)
                        }
                    }
                })
                .await
                .unwrap();

            let expected = ["a", "b", "c", "d"][m];
            assert_eq!(log.calls().len(), m + 1, "{m} rate limits then success");
            assert_eq!(result, expected);
            // Cursor is one past the key that succeeded
            let next = ["a", "b", "c", "d"][(m + 1) % 4];
            assert_eq!(pool.current().await.unwrap().handle.0, next);
        }
    }

    #[tokio::test]
    async fn non_rate_limit_error_short_circuits() {
        let pool = loaded(&["a", "b", "c"]).await;
        let log = CallLog::default();
        let original = UpstreamError::with_status(400, "invalid API key");

        let result: Result<()> = pool
            .invoke(|h: FakeHandle| {
                let log = log.clone();
                let err = original.clone();
                async move {
                    log.push(&h.0);
                    Err(err)
                }
            })
            .await;

        assert_eq!(log.calls(), vec!["a"]);
        match result {
            Err(Error::Upstream(e)) => assert_eq!(e, original),
            other => panic!("expected Upstream, got {other:?}"),
        }
        // Fatal errors leave the cursor alone
        assert_eq!(pool.current().await.unwrap().handle.0, "a");
    }

    #[tokio::test]
    async fn fatal_error_after_failover_is_propagated() {
        let pool = loaded(&["a", "b", "c"]).await;
        let log = CallLog::default();

        let result: Result<()> = pool
            .invoke(|h: FakeHandle| {
                let log = log.clone();
                async move {
                    log.push(&h.0);
                    if h.0 == "a" {
                        Err(quota_error())
                    } else {
                        Err(UpstreamError::new("request to Gemini timed out"))
                    }
                }
            })
            .await;

        assert_eq!(log.calls(), vec!["a", "b"]);
        assert!(matches!(result, Err(Error::Upstream(ref e)) if e.message == "request to Gemini timed out"));
    }

    #[tokio::test]
    async fn invocation_starts_from_cursor() {
        let pool = loaded(&["a", "b", "c"]).await;
        pool.advance().await;
        pool.advance().await;
        let log = CallLog::default();

        let _: Result<()> = pool
            .invoke(|h: FakeHandle| {
                let log = log.clone();
                async move {
                    log.push(&h.0);
                    Err(quota_error())
                }
            })
            .await;

        assert_eq!(log.calls(), vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn successive_calls_spread_across_keys() {
        let pool = loaded(&["a", "b", "c"]).await;
        let mut used = Vec::new();
        for _ in 0..6 {
            let key = pool
                .invoke(|h: FakeHandle| async move { Ok::<_, UpstreamError>(h.0) })
                .await
                .unwrap();
            used.push(key);
        }
        assert_eq!(used, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn pool_emptied_mid_call_stops_with_recorded_errors() {
        let pool = Arc::new(loaded(&["a", "b", "c"]).await);
        let log = CallLog::default();

        let inner = pool.clone();
        let result: Result<()> = pool
            .invoke(|h: FakeHandle| {
                let log = log.clone();
                let inner = inner.clone();
                async move {
                    log.push(&h.0);
                    inner.remove(None).await;
                    Err(quota_error())
                }
            })
            .await;

        assert_eq!(log.calls(), vec!["a"]);
        assert!(matches!(
            result,
            Err(Error::RateLimitExhausted { attempts: 1, .. })
        ));
    }

    #[tokio::test]
    async fn concurrent_invocations_each_terminate() {
        let pool = Arc::new(loaded(&["a", "b", "c"]).await);
        let calls = CallLog::default();

        let mut handles = Vec::new();
        for i in 0..20 {
            let pool = pool.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                pool.invoke(|h: FakeHandle| {
                    let calls = calls.clone();
                    async move {
                        calls.push(&h.0);
                        tokio::task::yield_now().await;
                        if i % 2 == 0 {
                            Err(quota_error())
                        } else {
                            Ok(h.0)
                        }
                    }
                })
                .await
            }));
        }

        let mut exhausted = 0;
        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(Error::RateLimitExhausted { attempts, .. }) => {
                    assert_eq!(attempts, 3);
                    exhausted += 1;
                }
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(succeeded, 10);
        assert_eq!(exhausted, 10);
        // 10 successes * 1 attempt + 10 exhausted * 3 attempts
        assert_eq!(calls.calls().len(), 40);
        assert!(pool.current().await.unwrap().index < 3);
    }

    #[tokio::test]
    async fn attempts_are_counted_in_metrics() {
        use metrics_exporter_prometheus::PrometheusBuilder;

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let pool = loaded(&["a", "b"]).await;
        let _ = pool
            .invoke(|h: FakeHandle| async move {
                if h.0 == "a" {
                    Err(quota_error())
                } else {
                    Ok(())
                }
            })
            .await;

        let output = handle.render();
        assert!(output.contains("keypool_attempts_total"), "got: {output}");
        assert!(output.contains("outcome=\"rate_limited\""), "got: {output}");
        assert!(output.contains("keypool_invocations_total"), "got: {output}");
        assert!(output.contains("outcome=\"success\""), "got: {output}");
    }
}
