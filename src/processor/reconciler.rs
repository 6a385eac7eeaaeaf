use crate::model::{ItemState, SoldSkuSet, SystemClock, WallClock};
use crate::processor::engine::{EngineSettings, ReconciliationEngine};
use crate::processor::pacing::PacingController;
use crate::processor::rotation::WorkerRotation;
use crate::processor::source::{WorkSource, WorkSourceError};
use crate::rpc::procedures;
use crate::rpc::{Platform, RpcError};
use crate::runtime::fatal::fatal_kind;
use crate::runtime::telemetry::{Telemetry, TelemetrySnapshot};
use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What a single loop iteration amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// The work source had nothing to offer.
    Idle,
    Sold {
        item_id: String,
        sku: String,
    },
    Reconciled {
        item_id: String,
        state: ItemState,
    },
    FetchFailed {
        item_id: String,
        fetcher: String,
    },
    /// A recoverable failure dropped the item for this cycle.
    Skipped {
        item_id: Option<String>,
        kind: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: u64,
    pub telemetry: TelemetrySnapshot,
}

/// Sequential reconciliation loop. Owns the rotation cursor, pacing state,
/// and sold set; only one item is ever in flight.
pub struct Reconciler<P: ?Sized> {
    platform: Arc<P>,
    source: Box<dyn WorkSource>,
    sold: SoldSkuSet,
    rotation: WorkerRotation,
    pacing: PacingController,
    engine: ReconciliationEngine<P>,
    clock: Arc<dyn WallClock>,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
}

impl<P: Platform + ?Sized> Reconciler<P> {
    pub fn new(
        platform: Arc<P>,
        source: Box<dyn WorkSource>,
        sold: SoldSkuSet,
        rotation: WorkerRotation,
        pacing: PacingController,
        settings: EngineSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let engine = ReconciliationEngine::new(Arc::clone(&platform), settings);
        Self {
            platform,
            source,
            sold,
            rotation,
            pacing,
            engine,
            clock: Arc::new(SystemClock),
            telemetry: Arc::new(Telemetry::default()),
            shutdown,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn WallClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        Arc::clone(&self.telemetry)
    }

    pub fn rotation(&self) -> &WorkerRotation {
        &self.rotation
    }

    /// Loops until the shutdown token fires or `max_iterations` is reached.
    /// Shutdown is observed between iterations only. Returns early with the
    /// first unhandled error.
    pub async fn run(&mut self, max_iterations: Option<u64>) -> Result<RunSummary> {
        let mut iterations = 0;
        let (pacing_min, pacing_max) = self.pacing.bounds();
        tracing::info!(
            source = %self.source.describe(),
            fetchers = self.rotation.fetchers().len(),
            sold_skus = self.sold.len(),
            pacing_min_ms = pacing_min.as_millis() as u64,
            pacing_max_ms = pacing_max.as_millis() as u64,
            cooldown_ms = self.rotation.cooldown().as_millis() as u64,
            "reconciliation loop started"
        );

        loop {
            if self.shutdown.is_cancelled() {
                tracing::info!(iterations, "shutdown requested; leaving reconciliation loop");
                break;
            }
            if max_iterations.is_some_and(|limit| iterations >= limit) {
                tracing::info!(iterations, "iteration limit reached");
                break;
            }

            self.run_iteration().await?;
            iterations += 1;
        }

        Ok(RunSummary {
            iterations,
            telemetry: self.telemetry.snapshot(),
        })
    }

    /// Processes at most one item.
    pub async fn run_iteration(&mut self) -> Result<IterationOutcome> {
        let item = match self.source.next_item().await {
            Ok(Some(item)) => item,
            Ok(None) => {
                self.telemetry.record_idle_poll();
                return Ok(IterationOutcome::Idle);
            }
            Err(err) => return self.skip_or_fail(None, err),
        };

        if self.sold.contains(&item.marketplace_sku) {
            tracing::debug!(item_id = %item.id, sku = %item.marketplace_sku, "sku already sold; skipping");
            self.telemetry.record_sold_skip();
            return Ok(IterationOutcome::Sold {
                item_id: item.id,
                sku: item.marketplace_sku,
            });
        }

        self.pacing.pace().await;
        let fetcher = self.rotation.next_fetcher();

        let snapshot =
            match procedures::fetch_snapshot(self.platform.as_ref(), &fetcher, &item.id).await {
                Ok(snapshot) => snapshot,
                Err(err) if err.downcast_ref::<RpcError>().is_some() => {
                    tracing::warn!(
                        item_id = %item.id,
                        fetcher = %fetcher,
                        kind = fatal_kind(&err),
                        error = %err,
                        "upstream fetch failed; remediating fetcher"
                    );
                    self.telemetry.record_fetch_failure();
                    let remediation = self
                        .rotation
                        .remediate(self.platform.as_ref(), &fetcher, &self.shutdown)
                        .await;
                    if remediation.touched {
                        self.telemetry.record_remediation();
                    }
                    return Ok(IterationOutcome::FetchFailed {
                        item_id: item.id,
                        fetcher,
                    });
                }
                Err(err) => return Err(err),
            };

        match self.engine.reconcile(&item, &snapshot, self.clock.now()).await {
            Ok(report) => {
                self.telemetry.record_reconciled();
                if report.listed {
                    self.telemetry.record_listed();
                }
                if report.delisted {
                    self.telemetry.record_delisted();
                }
                tracing::debug!(
                    item_id = %item.id,
                    fetcher = %fetcher,
                    state = %report.state,
                    "item reconciled"
                );
                Ok(IterationOutcome::Reconciled {
                    item_id: item.id,
                    state: report.state,
                })
            }
            Err(err) => self.skip_or_fail(Some(&item.id), err),
        }
    }

    fn skip_or_fail(&self, item_id: Option<&str>, err: anyhow::Error) -> Result<IterationOutcome> {
        let recoverable = err.downcast_ref::<RpcError>().is_some()
            || err.downcast_ref::<WorkSourceError>().is_some();
        if !recoverable {
            return Err(err);
        }

        let kind = fatal_kind(&err);
        tracing::warn!(item_id, kind, error = %err, "iteration failed; item skipped");
        self.telemetry.record_skipped();
        Ok(IterationOutcome::Skipped {
            item_id: item_id.map(str::to_owned),
            kind,
        })
    }
}
