//! Bounded retry with backoff.
//!
//! [`RetryPolicy::execute`] runs an operation up to `max_attempts` times,
//! sleeping between attempts. Each call receives a [`RetryAttempt`]
//! describing the previous failure, which lets the caller do recovery work
//! (such as replacing a browser after a transient error) before trying
//! again. Fatal errors stop immediately.

use pitchscrape::{ErrorKind, ScrapeError, ScrapeResult};
use std::future::Future;
use std::time::Duration;

/// Delay schedule between attempts. Delays never decrease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `step * n` after the n-th failure.
    Linear { step: Duration },
    /// `base * 2^(n-1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay after the `failed_attempt`-th failure (1-based).
    pub fn delay(&self, failed_attempt: u32) -> Duration {
        let n = failed_attempt.max(1);
        match *self {
            Backoff::Fixed(d) => d,
            Backoff::Linear { step } => step.saturating_mul(n),
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(n - 1);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

/// State handed to each attempt. Lives only for one `execute` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAttempt {
    /// 1-based.
    pub number: u32,
    pub max_attempts: u32,
    pub last_error_kind: Option<ErrorKind>,
    pub last_error: Option<String>,
}

impl RetryAttempt {
    pub fn is_retry(&self) -> bool {
        self.number > 1
    }

    /// Whether the previous attempt failed with a transient error.
    pub fn after_transient(&self) -> bool {
        self.last_error_kind == Some(ErrorKind::Transient)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff: Backoff::Linear {
                step: Duration::from_millis(500),
            },
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Run `operation` until it succeeds, fails fatally, or the attempt
    /// budget is spent.
    ///
    /// `label` identifies the work in log events (an item id, never a URL).
    /// Exhaustion returns [`ScrapeError::Exhausted`] wrapping the last error.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> ScrapeResult<T>
    where
        F: FnMut(RetryAttempt) -> Fut,
        Fut: Future<Output = ScrapeResult<T>>,
    {
        let mut attempt = RetryAttempt {
            number: 1,
            max_attempts: self.max_attempts,
            last_error_kind: None,
            last_error: None,
        };

        loop {
            let error = match operation(attempt.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if error.is_fatal() {
                return Err(error);
            }
            if attempt.number >= self.max_attempts {
                return Err(ScrapeError::Exhausted {
                    attempts: attempt.number,
                    source: Box::new(error),
                });
            }

            let delay = self.backoff.delay(attempt.number);
            tracing::warn!(
                item = label,
                attempt = attempt.number,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                kind = ?error.kind(),
                "attempt failed, retrying: {error}"
            );
            tokio::time::sleep(delay).await;

            attempt = RetryAttempt {
                number: attempt.number + 1,
                max_attempts: self.max_attempts,
                last_error_kind: Some(error.kind()),
                last_error: Some(error.to_string()),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Backoff::Fixed(Duration::from_millis(1)))
    }

    #[test]
    fn test_linear_backoff() {
        let b = Backoff::Linear {
            step: Duration::from_millis(500),
        };
        assert_eq!(b.delay(1), Duration::from_millis(500));
        assert_eq!(b.delay(3), Duration::from_millis(1500));
    }

    #[test]
    fn test_exponential_backoff_is_capped_and_monotonic() {
        let b = Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
        };
        let delays: Vec<_> = (1..=8).map(|n| b.delay(n)).collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[2], Duration::from_millis(400));
        assert_eq!(delays[7], Duration::from_secs(1));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let result = quick(3)
            .execute("m1", |attempt| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    assert_eq!(attempt.number, n);
                    if n < 3 {
                        Err(ScrapeError::Disconnected)
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts_and_last_error() {
        let calls = AtomicU32::new(0);
        let err = quick(4)
            .execute("m1", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(ScrapeError::MissingField {
                        id: "m1".into(),
                        field: "home.name",
                    })
                }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match err {
            ScrapeError::Exhausted { attempts, source } => {
                assert_eq!(attempts, 4);
                assert!(matches!(*source, ScrapeError::MissingField { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fatal_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = quick(5)
            .execute("m1", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ScrapeError::Launch("no chrome".into())) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_attempt_carries_previous_error_kind() {
        let seen = Mutex::new(Vec::new());
        let _ = quick(3)
            .execute("m1", |attempt| {
                seen.lock().unwrap().push(attempt.after_transient());
                let n = attempt.number;
                async move {
                    match n {
                        1 => Err(ScrapeError::Timeout {
                            what: "navigation".into(),
                            after_ms: 10,
                        }),
                        2 => Err(ScrapeError::MissingField {
                            id: "m1".into(),
                            field: "score.home",
                        }),
                        _ => Ok(()),
                    }
                }
            })
            .await;
        assert_eq!(*seen.lock().unwrap(), vec![false, true, false]);
    }
}
