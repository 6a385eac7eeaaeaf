use crate::processor::source::WorkSourceError;
use crate::rpc::RpcError;
use anyhow::Error as AnyError;
use std::backtrace::BacktraceStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Reports the first unhandled error of a run and cancels the root shutdown
/// token so background tasks stop alongside the loop.
#[derive(Clone)]
pub struct FatalErrorHandler {
    inner: Arc<FatalInner>,
}

struct FatalInner {
    triggered: AtomicBool,
    shutdown: CancellationToken,
}

impl FatalErrorHandler {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            inner: Arc::new(FatalInner {
                triggered: AtomicBool::new(false),
                shutdown,
            }),
        }
    }

    /// Logs `error` once and cancels the shutdown token. The error is handed
    /// back unchanged so the caller can propagate it.
    pub fn trigger(&self, context: &str, error: AnyError) -> AnyError {
        if !self.inner.triggered.swap(true, Ordering::SeqCst) {
            report_fatal(context, &error);
            self.inner.shutdown.cancel();
        }
        error
    }
}

/// Coarse classification used in the failure log line.
pub fn fatal_kind(error: &AnyError) -> &'static str {
    if let Some(rpc) = error.downcast_ref::<RpcError>() {
        return rpc.kind();
    }
    if error.downcast_ref::<WorkSourceError>().is_some() {
        return "work_source";
    }
    "unhandled"
}

/// Renders the `source()` chain below the top-level message.
pub fn cause_chain(error: &AnyError) -> Vec<String> {
    error.chain().skip(1).map(ToString::to_string).collect()
}

/// Emits the structured failure record for an error that ends the process.
pub fn report_fatal(context: &str, error: &AnyError) {
    let causes = cause_chain(error);
    let backtrace = error.backtrace();
    let backtrace =
        (backtrace.status() == BacktraceStatus::Captured).then(|| backtrace.to_string());

    tracing::error!(
        context,
        kind = fatal_kind(error),
        error = %error,
        causes = ?causes,
        backtrace = backtrace.as_deref().unwrap_or(""),
        "fatal error; shutting down"
    );
}
