use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

// ============================================================================
// Exponential Backoff Retry Strategy
// ============================================================================
//
// Retries an operation while it fails with a transient error, doubling the
// delay between attempts. The loop is bounded three ways: attempt count,
// per-sleep delay cap, and an optional cap on total elapsed time. Each sleep
// is stretched by a random jitter so concurrent retriers spread out. A caller
// supplied cancellation future interrupts the backoff sleeps.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Give up once another sleep would push total latency past this
    pub max_elapsed: Option<Duration>,
    /// Each sleep is stretched by a random fraction in `[0, jitter)`
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            max_elapsed: None,
            jitter: 0.0,
        }
    }
}

impl RetryConfig {
    /// Policy for optimistic-concurrency conflicts: short, fast, bounded
    pub fn on_conflict() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_elapsed: Some(Duration::from_secs(5)),
            jitter: 0.1,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        let next = Duration::from_millis(((delay.as_millis() as f64) * self.multiplier) as u64);
        next.min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let factor = rand::thread_rng().gen::<f64>() * self.jitter;
        delay + delay.mul_f64(factor)
    }
}

/// Result of a retry operation
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded
    Success(T),
    /// Operation kept failing transiently until the budget ran out
    Failed(E),
    /// Operation permanently failed (should not retry)
    PermanentFailure(E),
    /// Cancellation fired while waiting between attempts
    Canceled,
}

/// Check if an error is transient (should retry) or permanent (should not retry)
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

/// Retry with transient error checking
///
/// `operation` receives the 1-based attempt number. `cancelled` is polled only
/// during backoff sleeps; an operation that wants to observe cancellation while
/// running must do so itself.
pub async fn retry_on_transient<F, Fut, T, E, C>(
    config: &RetryConfig,
    cancelled: C,
    mut operation: F,
) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsTransient,
    C: Future<Output = ()>,
{
    tokio::pin!(cancelled);

    let started = Instant::now();
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return RetryResult::Success(result);
            }
            Err(error) => {
                if !error.is_transient() {
                    tracing::debug!(
                        attempt = attempt,
                        error = %error,
                        "Permanent failure detected, not retrying"
                    );
                    return RetryResult::PermanentFailure(error);
                }

                if attempt >= config.max_attempts {
                    tracing::error!(
                        attempt = attempt,
                        error = %error,
                        "Operation failed after all retries"
                    );
                    return RetryResult::Failed(error);
                }

                let pause = config.jittered(delay);

                if let Some(max_elapsed) = config.max_elapsed {
                    if started.elapsed() + pause > max_elapsed {
                        tracing::error!(
                            attempt = attempt,
                            error = %error,
                            elapsed_ms = started.elapsed().as_millis(),
                            "Retry budget exhausted"
                        );
                        return RetryResult::Failed(error);
                    }
                }

                tracing::warn!(
                    attempt = attempt,
                    error = %error,
                    delay_ms = pause.as_millis(),
                    "Transient failure, retrying after delay"
                );

                tokio::select! {
                    _ = &mut cancelled => {
                        tracing::debug!(attempt = attempt, "Retry interrupted by cancellation");
                        return RetryResult::Canceled;
                    }
                    _ = sleep(pause) => {}
                }

                delay = config.next_delay(delay);
            }
        }
    }
}
