//! Work sources: where the loop obtains its next candidate item.
//!
//! Two implementations sit behind one trait. The queue source removes each
//! message right after receipt (at-most-once delivery); the pull source asks a
//! stateful remote function for the next item.

use crate::model::TrackedItem;
use crate::rpc::procedures::{self, EmptyRequest, WorkEnvelope};
use crate::rpc::{FunctionInvoker, MessageQueue};
use anyhow::Result;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Candidate-item supplier. `Ok(None)` means the queue had nothing to offer;
/// the pull source always answers with an item or an error.
pub trait WorkSource: Send + Sync {
    fn next_item(&self) -> BoxFuture<'_, Result<Option<TrackedItem>>>;

    fn describe(&self) -> String;
}

/// Body-level failures. They fail the current iteration only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkSourceError {
    EmptyBody,
    MalformedBody(String),
}

impl fmt::Display for WorkSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkSourceError::EmptyBody => write!(f, "work item body is empty"),
            WorkSourceError::MalformedBody(reason) => {
                write!(f, "work item body is malformed: {reason}")
            }
        }
    }
}

impl std::error::Error for WorkSourceError {}

/// Decodes a `{ "item": TrackedItem }` body.
pub fn parse_work_body(body: Option<&str>) -> Result<TrackedItem, WorkSourceError> {
    let body = body
        .map(str::trim)
        .filter(|body| !body.is_empty())
        .ok_or(WorkSourceError::EmptyBody)?;

    let envelope: WorkEnvelope = serde_json::from_str(body)
        .map_err(|err| WorkSourceError::MalformedBody(err.to_string()))?;
    envelope.item.ok_or(WorkSourceError::EmptyBody)
}

pub struct QueueWorkSource<Q: ?Sized> {
    queue: Arc<Q>,
    queue_url: String,
    wait: Duration,
}

impl<Q: MessageQueue + ?Sized> QueueWorkSource<Q> {
    pub fn new(queue: Arc<Q>, queue_url: impl Into<String>, wait: Duration) -> Self {
        Self {
            queue,
            queue_url: queue_url.into(),
            wait,
        }
    }

    async fn receive(&self) -> Result<Option<TrackedItem>> {
        let Some(message) = self.queue.receive_message(&self.queue_url, self.wait).await? else {
            return Ok(None);
        };

        self.queue
            .delete_message(&self.queue_url, &message.receipt_handle)
            .await?;
        tracing::debug!(message_id = %message.message_id, "work message received and deleted");

        let item = parse_work_body(message.body.as_deref())?;
        Ok(Some(item))
    }
}

impl<Q: MessageQueue + ?Sized> WorkSource for QueueWorkSource<Q> {
    fn next_item(&self) -> BoxFuture<'_, Result<Option<TrackedItem>>> {
        Box::pin(self.receive())
    }

    fn describe(&self) -> String {
        format!("queue:{}", self.queue_url)
    }
}

pub struct PullWorkSource<I: ?Sized> {
    invoker: Arc<I>,
    function: String,
}

impl<I: FunctionInvoker + ?Sized> PullWorkSource<I> {
    pub fn new(invoker: Arc<I>, function: impl Into<String>) -> Self {
        Self {
            invoker,
            function: function.into(),
        }
    }

    async fn pull(&self) -> Result<Option<TrackedItem>> {
        let envelope: WorkEnvelope =
            procedures::call(self.invoker.as_ref(), &self.function, &EmptyRequest {}).await?;
        let item = envelope.item.ok_or(WorkSourceError::EmptyBody)?;
        Ok(Some(item))
    }
}

impl<I: FunctionInvoker + ?Sized> WorkSource for PullWorkSource<I> {
    fn next_item(&self) -> BoxFuture<'_, Result<Option<TrackedItem>>> {
        Box::pin(self.pull())
    }

    fn describe(&self) -> String {
        format!("pull:{}", self.function)
    }
}
