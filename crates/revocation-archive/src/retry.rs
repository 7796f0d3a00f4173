//! Bounded retry with a fixed pause, optional jitter, and cancellation.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::ArchiveConfig;

/// Why a retried operation produced no value.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the last attempt's error.
    Exhausted { attempts: usize, last: E },
    Cancelled,
}

/// Attempt bound and pause between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self::new(config.max_attempts, config.retry_delay()).with_jitter(config.retry_jitter())
    }

    /// Same pause and jitter, different attempt bound.
    pub fn with_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    fn pause(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.delay;
        }
        let extra = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        self.delay + Duration::from_millis(extra)
    }

    /// Run `op` until it succeeds, the bound is hit, or `cancel` fires.
    ///
    /// `op` receives the zero-based attempt index. The pause follows each
    /// failed attempt except the last.
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut last = None;
        for attempt in 0..self.max_attempts {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                outcome = op(attempt) => outcome,
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::debug!("attempt {}/{} failed: {e}", attempt + 1, self.max_attempts);
                    last = Some(e);
                }
            }

            if attempt + 1 < self.max_attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                    _ = tokio::time::sleep(self.pause()) => {}
                }
            }
        }

        match last {
            Some(last) => Err(RetryError::Exhausted {
                attempts: self.max_attempts,
                last,
            }),
            // zero attempts allowed; nothing was tried
            None => Err(RetryError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast(attempts: usize) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result: Result<usize, RetryError<String>> = fast(5)
            .run(&CancellationToken::new(), |attempt| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err(format!("fail {attempt}"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_error() {
        let result: Result<(), RetryError<String>> = fast(4)
            .run(&CancellationToken::new(), |attempt| async move {
                Err(format!("fail {attempt}"))
            })
            .await;
        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert_eq!(last, "fail 3");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<(), RetryError<String>> =
            fast(3).run(&cancel, |_| async { Ok(()) }).await;
        assert!(matches!(result, Err(RetryError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_during_pause() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::new(3, Duration::from_secs(60));
        let trigger = cancel.clone();
        let result: Result<(), RetryError<String>> = policy
            .run(&cancel, move |_| {
                let trigger = trigger.clone();
                async move {
                    trigger.cancel();
                    Err("down".to_string())
                }
            })
            .await;
        assert!(matches!(result, Err(RetryError::Cancelled)));
    }

    #[test]
    fn test_pause_with_jitter_is_bounded() {
        let policy =
            RetryPolicy::new(1, Duration::from_millis(200)).with_jitter(Duration::from_millis(50));
        for _ in 0..20 {
            let pause = policy.pause();
            assert!(pause >= Duration::from_millis(200));
            assert!(pause <= Duration::from_millis(250));
        }
    }
}
