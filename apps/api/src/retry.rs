//! Bounded retry and request pacing.
//!
//! Every wait in the pipeline goes through a [`Sleeper`] so tests can run the
//! full control flow without real delays.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Uniformly distributed delay between `min` and `max` (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    pub fn between(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn fixed(duration: Duration) -> Self {
        Self {
            min: duration,
            max: duration,
        }
    }

    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let low = self.min.as_millis() as u64;
        let high = self.max.as_millis() as u64;
        Duration::from_millis(fastrand::u64(low..=high))
    }

    /// Sleeps for a freshly sampled delay. A zero sample does not touch the sleeper.
    pub async fn pause(&self, sleeper: &dyn Sleeper) {
        let delay = self.sample();
        if !delay.is_zero() {
            sleeper.sleep(delay).await;
        }
    }
}

/// Runs `op` up to `attempts` times, sleeping `delay` between failed attempts.
///
/// Returns the first `Ok`, or the error from the final attempt. `op` receives the
/// zero-based attempt number. At least one attempt is always made.
pub async fn retry_bounded<T, E, F, Fut>(
    attempts: u32,
    delay: Duration,
    sleeper: &dyn Sleeper,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= attempts {
                    return Err(err);
                }
                sleeper.sleep(delay).await;
            }
        }
    }
}
