//! Object-safe seams for every external collaborator the loop talks to. The
//! production implementation is [`GatewayClient`](crate::rpc::GatewayClient);
//! tests substitute in-memory fakes.

use crate::store::RecordUpdate;
use anyhow::Result;
use futures::future::BoxFuture;
use serde_json::Value;
use std::time::Duration;

/// Invokes a named remote function and returns the decoded `result` value.
pub trait FunctionInvoker: Send + Sync {
    fn invoke<'a>(&'a self, function: &'a str, payload: Value) -> BoxFuture<'a, Result<Value>>;
}

/// Touches a remote function's configuration so its next invocation starts cold.
pub trait FunctionControl: Send + Sync {
    fn touch_configuration<'a>(
        &'a self,
        function: &'a str,
        marker: &'a str,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Applies atomic field updates to the persistent item store.
pub trait RecordStore: Send + Sync {
    fn update_record<'a>(&'a self, update: &'a RecordUpdate) -> BoxFuture<'a, Result<()>>;
}

/// Message received from the work queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: Option<String>,
}

/// Minimal work-queue surface: receive one message, delete it by receipt.
pub trait MessageQueue: Send + Sync {
    fn receive_message<'a>(
        &'a self,
        queue: &'a str,
        wait: Duration,
    ) -> BoxFuture<'a, Result<Option<QueueMessage>>>;

    fn delete_message<'a>(&'a self, queue: &'a str, receipt: &'a str)
        -> BoxFuture<'a, Result<()>>;
}

/// Everything the reconciliation loop needs from the outside world.
pub trait Platform: FunctionInvoker + FunctionControl + RecordStore + MessageQueue {}

impl<T> Platform for T where T: FunctionInvoker + FunctionControl + RecordStore + MessageQueue {}
