use crate::model::{SoldSkuSet, SystemClock, WallClock};
use crate::processor::engine::EngineSettings;
use crate::processor::pacing::PacingController;
use crate::processor::reconciler::{Reconciler, RunSummary};
use crate::processor::rotation::WorkerRotation;
use crate::processor::source::{PullWorkSource, QueueWorkSource, WorkSource};
use crate::rpc::procedures::{self, EmptyRequest, SoldLookupResponse};
use crate::rpc::{FunctionInvoker, Platform};
use crate::runtime::config::{ReconcilerConfig, WorkSourceKind};
use crate::runtime::fatal::FatalErrorHandler;
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Wires configuration and a platform into a reconciliation loop and drives it
/// until shutdown.
pub struct Runner<P: ?Sized> {
    config: ReconcilerConfig,
    platform: Arc<P>,
    shutdown: CancellationToken,
    telemetry: Arc<Telemetry>,
    clock: Arc<dyn WallClock>,
}

impl<P: Platform + ?Sized + 'static> Runner<P> {
    pub fn new(config: ReconcilerConfig, platform: Arc<P>) -> Self {
        Self {
            config,
            platform,
            shutdown: CancellationToken::new(),
            telemetry: Arc::new(Telemetry::default()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn WallClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        Arc::clone(&self.telemetry)
    }

    /// Loads the sold inventory and assembles the loop. Any failure here is a
    /// startup failure.
    pub async fn bootstrap(&self) -> Result<Reconciler<P>> {
        let sold = load_sold_skus(
            self.platform.as_ref(),
            self.config.sold_lookup_function(),
        )
        .await
        .context("failed to load sold inventory")?;

        let source: Box<dyn WorkSource> = match self.config.work_source() {
            WorkSourceKind::Queue { queue_url } => Box::new(QueueWorkSource::new(
                Arc::clone(&self.platform),
                queue_url.clone(),
                self.config.queue_wait(),
            )),
            WorkSourceKind::Pull { function } => Box::new(PullWorkSource::new(
                Arc::clone(&self.platform),
                function.clone(),
            )),
        };

        let rotation = WorkerRotation::new(
            self.config.fetcher_functions().to_vec(),
            self.config.remediation_cooldown(),
        )?;
        let pacing = PacingController::new(self.config.pacing_min(), self.config.pacing_max())?;

        Ok(Reconciler::new(
            Arc::clone(&self.platform),
            source,
            sold,
            rotation,
            pacing,
            EngineSettings::from_config(&self.config),
            self.shutdown.clone(),
        )
        .with_clock(Arc::clone(&self.clock))
        .with_telemetry(Arc::clone(&self.telemetry)))
    }

    /// Runs the loop with the metrics reporter alongside. Unhandled errors are
    /// logged once with full detail before being returned.
    pub async fn run(&self) -> Result<RunSummary> {
        let fatal = FatalErrorHandler::new(self.shutdown.clone());

        let mut reconciler = match self.bootstrap().await {
            Ok(reconciler) => reconciler,
            Err(err) => return Err(fatal.trigger("bootstrap", err)),
        };

        let reporter = spawn_metrics_reporter(
            Arc::clone(&self.telemetry),
            self.shutdown.clone(),
            self.config.metrics_interval(),
        );

        let result = reconciler.run(self.config.max_iterations()).await;

        self.shutdown.cancel();
        if let Err(err) = reporter.await {
            tracing::warn!(error = %err, "metrics reporter task failed");
        }

        match result {
            Ok(summary) => {
                let totals = summary.telemetry;
                tracing::info!(
                    iterations = summary.iterations,
                    reconciled = totals.reconciled,
                    listed = totals.listed,
                    delisted = totals.delisted,
                    sold_skips = totals.sold_skips,
                    fetch_failures = totals.fetch_failures,
                    skipped = totals.skipped,
                    "reconciliation loop completed"
                );
                Ok(summary)
            }
            Err(err) => Err(fatal.trigger("reconciler", err)),
        }
    }

    /// Runs until SIGINT/SIGTERM is received or the shutdown token is
    /// cancelled elsewhere. The in-flight iteration always completes.
    pub async fn run_until_signal(&self) -> Result<RunSummary> {
        let listener = spawn_signal_listener(self.shutdown.clone());
        tracing::info!("runner started; waiting for SIGINT/SIGTERM to initiate shutdown");

        let result = self.run().await;

        self.shutdown.cancel();
        if let Err(err) = listener.await {
            tracing::warn!(error = %err, "signal listener task failed");
        }
        result
    }
}

/// Fetches the marketplace SKUs that are already sold.
pub async fn load_sold_skus<I: FunctionInvoker + ?Sized>(
    invoker: &I,
    function: &str,
) -> Result<SoldSkuSet> {
    let response: SoldLookupResponse =
        procedures::call(invoker, function, &EmptyRequest {}).await?;
    let sold: SoldSkuSet = response.skus.into_iter().collect();
    tracing::info!(function, skus = sold.len(), "sold inventory loaded");
    Ok(sold)
}

fn spawn_signal_listener(shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_termination() => {
                tracing::info!("termination signal received; finishing current iteration");
                shutdown.cancel();
            }
            _ = shutdown.cancelled() => {}
        }
    })
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to install SIGTERM handler; relying on SIGINT");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}
