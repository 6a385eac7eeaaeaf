pub mod model;
pub mod processor;
pub mod rpc;
pub mod runtime;
pub mod store;

pub use model::{ItemState, ReconciliationOutcome, SoldSkuSet, TrackedItem, UpstreamSnapshot};
pub use processor::engine::{EngineReport, EngineSettings, ReconciliationEngine};
pub use processor::pacing::PacingController;
pub use processor::reconciler::{IterationOutcome, Reconciler, RunSummary};
pub use processor::rotation::WorkerRotation;
pub use processor::source::{PullWorkSource, QueueWorkSource, WorkSource, WorkSourceError};
pub use rpc::{GatewayClient, Platform, RpcError};
pub use runtime::config::{
    ReconcilerConfig, ReconcilerConfigBuilder, ReconcilerConfigParams, WorkSourceKind,
};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use store::RecordUpdate;
