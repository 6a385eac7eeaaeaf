use crate::processor::pacing::sleep_with_cancellation;
use crate::rpc::FunctionControl;
use anyhow::{bail, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const MARKER_LEN: usize = 16;

/// Round-robin selection across equivalent upstream fetchers.
///
/// The cursor survives across items so load spreads evenly over the whole
/// run. A failing fetcher is remediated in place and never leaves rotation.
#[derive(Debug, Clone)]
pub struct WorkerRotation {
    fetchers: Vec<String>,
    cursor: usize,
    cooldown: Duration,
}

/// Result of a remediation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remediation {
    pub fetcher: String,
    pub marker: String,
    pub touched: bool,
    pub cooled_down: bool,
}

impl WorkerRotation {
    pub fn new(fetchers: Vec<String>, cooldown: Duration) -> Result<Self> {
        if fetchers.is_empty() {
            bail!("worker rotation needs at least one fetcher");
        }
        Ok(Self {
            fetchers,
            cursor: 0,
            cooldown,
        })
    }

    /// Returns the fetcher under the cursor and advances it.
    pub fn next_fetcher(&mut self) -> String {
        let fetcher = self.fetchers[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.fetchers.len();
        fetcher
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn fetchers(&self) -> &[String] {
        &self.fetchers
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Forces a cold restart of `fetcher` by touching its configuration with a
    /// fresh random marker, then waits out the cooldown. A failed touch is
    /// logged; the cooldown still applies. Shutdown cuts the cooldown short.
    pub async fn remediate<C>(
        &self,
        control: &C,
        fetcher: &str,
        shutdown: &CancellationToken,
    ) -> Remediation
    where
        C: FunctionControl + ?Sized,
    {
        let marker = remediation_marker();

        let touched = match control.touch_configuration(fetcher, &marker).await {
            Ok(()) => {
                tracing::info!(fetcher, marker = %marker, "fetcher configuration touched");
                true
            }
            Err(err) => {
                tracing::warn!(fetcher, error = %err, "failed to remediate fetcher");
                false
            }
        };

        let cooled_down = sleep_with_cancellation(self.cooldown, shutdown).await;
        if !cooled_down {
            tracing::info!(fetcher, "remediation cooldown interrupted by shutdown");
        }

        Remediation {
            fetcher: fetcher.to_owned(),
            marker,
            touched,
            cooled_down,
        }
    }
}

fn remediation_marker() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(MARKER_LEN)
        .map(char::from)
        .collect()
}
