use crate::transcript::{ChatMessage, Transcript};
use std::fmt;
use std::future::Future;
use std::time::Duration;

// ===================================================================
// Policy
// ===================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Attempt `n` failing waits `2^n` of these before attempt `n + 1`.
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// One try, no backoff. Used for the background image refresh.
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_unit
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

// ===================================================================
// Seams: sleeping and progress reporting
// ===================================================================

pub trait Sleeper {
    fn sleep(&mut self, duration: Duration) -> impl Future<Output = ()>;
}

pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&mut self, duration: Duration) -> impl Future<Output = ()> {
        tokio::time::sleep(duration)
    }
}

/// Receives one notification per failed attempt that will be retried.
pub trait RetryProgress {
    fn attempt_failed(&mut self, attempt: u32, max_attempts: u32, delay: Duration, error: &str);
}

impl RetryProgress for Transcript {
    fn attempt_failed(&mut self, attempt: u32, max_attempts: u32, delay: Duration, error: &str) {
        self.push(ChatMessage::assistant(format!(
            "Attempt {attempt} of {max_attempts} failed ({error}). Retrying in {}...",
            format_delay(delay)
        )));
    }
}

fn format_delay(delay: Duration) -> String {
    if delay.subsec_millis() == 0 {
        format!("{}s", delay.as_secs())
    } else {
        format!("{}ms", delay.as_millis())
    }
}

// ===================================================================
// Wrapper
// ===================================================================

/// The last error once retries are exhausted (or a non-retryable error on
/// the attempt it happened).
#[derive(Debug)]
pub struct RetryFailure<E> {
    pub attempts: u32,
    pub error: E,
}

impl<E: fmt::Display> fmt::Display for RetryFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed after {} attempt", self.attempts)?;
        if self.attempts != 1 {
            f.write_str("s")?;
        }
        Ok(())
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryFailure<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Run `op` until it succeeds, fails with an error `is_retryable` rejects,
/// or `policy.max_attempts` is reached. `op` receives the 1-based attempt
/// number.
pub async fn with_retry<T, E, F, Fut, P, S, R>(
    policy: RetryPolicy,
    sleeper: &mut S,
    progress: &mut R,
    is_retryable: P,
    mut op: F,
) -> Result<T, RetryFailure<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: fmt::Display,
    S: Sleeper,
    R: RetryProgress,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let error = match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    log::info!("succeeded on attempt {attempt}");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if !is_retryable(&error) {
            log::info!("attempt {attempt} failed, not retryable: {error}");
            return Err(RetryFailure { attempts: attempt, error });
        }
        if attempt >= max_attempts {
            log::info!("giving up after {attempt} attempts: {error}");
            return Err(RetryFailure { attempts: attempt, error });
        }

        let delay = policy.delay_after(attempt);
        log::info!("attempt {attempt}/{max_attempts} failed: {error}; retrying in {delay:?}");
        progress.attempt_failed(attempt, max_attempts, delay, &error.to_string());
        sleeper.sleep(delay).await;
        attempt += 1;
    }
}
