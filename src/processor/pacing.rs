use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::task::yield_now;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Enforces a randomized minimum gap between consecutive upstream fetches.
///
/// Each wait draws a fresh target from `[min, max]` and only sleeps for the
/// part of it that has not already elapsed since the previous fetch.
#[derive(Debug)]
pub struct PacingController {
    min: Duration,
    max: Duration,
    last_run: Option<Instant>,
    rng: StdRng,
}

impl PacingController {
    pub fn new(min: Duration, max: Duration) -> Result<Self> {
        Self::with_rng(min, max, StdRng::from_entropy())
    }

    /// Deterministic variant used by tests.
    pub fn with_seed(min: Duration, max: Duration, seed: u64) -> Result<Self> {
        Self::with_rng(min, max, StdRng::seed_from_u64(seed))
    }

    fn with_rng(min: Duration, max: Duration, rng: StdRng) -> Result<Self> {
        if min > max {
            bail!("pacing min ({min:?}) must not exceed max ({max:?})");
        }
        Ok(Self {
            min,
            max,
            last_run: None,
            rng,
        })
    }

    pub fn bounds(&self) -> (Duration, Duration) {
        (self.min, self.max)
    }

    pub fn last_run(&self) -> Option<Instant> {
        self.last_run
    }

    /// Draws the next target gap, uniformly in `[min, max]` at millisecond grain.
    pub fn target_interval(&mut self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if min >= max {
            return self.min;
        }
        Duration::from_millis(self.rng.gen_range(min..=max))
    }

    /// Sleeps until a fresh target has elapsed since `last`. Returns the time slept.
    pub async fn wait_since_last(&mut self, last: Option<Instant>) -> Duration {
        let target = self.target_interval();
        let Some(last) = last else {
            return Duration::ZERO;
        };

        let delay = remaining(last.elapsed(), target);
        if delay.is_zero() {
            yield_now().await;
        } else {
            tracing::debug!(delay_ms = delay.as_millis() as u64, "pacing upstream fetch");
            sleep(delay).await;
        }
        delay
    }

    /// Waits relative to the previous call and marks the current instant as the
    /// latest fetch start.
    pub async fn pace(&mut self) -> Duration {
        let slept = self.wait_since_last(self.last_run).await;
        self.last_run = Some(Instant::now());
        slept
    }
}

/// Portion of `target` not yet covered by `elapsed`.
pub fn remaining(elapsed: Duration, target: Duration) -> Duration {
    target.saturating_sub(elapsed)
}

/// Sleeps for `delay` unless the token fires first. Returns `false` when cancelled.
pub(crate) async fn sleep_with_cancellation(delay: Duration, token: &CancellationToken) -> bool {
    if delay.is_zero() {
        yield_now().await;
        return !token.is_cancelled();
    }

    tokio::select! {
        _ = token.cancelled() => false,
        _ = sleep(delay) => true,
    }
}
