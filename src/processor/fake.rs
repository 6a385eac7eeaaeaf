//! In-memory platform used by the processor unit tests. Every call is
//! recorded in order so tests can assert on sequencing.

use crate::rpc::{
    FunctionControl, FunctionInvoker, MessageQueue, QueueMessage, RecordStore, RpcError,
};
use crate::store::RecordUpdate;
use anyhow::Result;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Invoke { function: String, payload: Value },
    Touch { function: String, marker: String },
    Update(RecordUpdate),
    Receive { queue: String },
    Delete { queue: String, receipt: String },
}

#[derive(Default)]
pub(crate) struct FakePlatform {
    calls: Mutex<Vec<Call>>,
    scripted: Mutex<HashMap<String, VecDeque<Result<Value, RpcError>>>>,
    defaults: Mutex<HashMap<String, Value>>,
    messages: Mutex<VecDeque<QueueMessage>>,
    store_failure: Mutex<Option<RpcError>>,
}

impl FakePlatform {
    /// Default reply for every invocation of `function`.
    pub(crate) fn reply(&self, function: &str, value: Value) -> &Self {
        self.defaults
            .lock()
            .unwrap()
            .insert(function.to_owned(), value);
        self
    }

    /// One-shot failure consumed by the next invocation of `function`.
    pub(crate) fn fail_next(&self, function: &str, error: RpcError) -> &Self {
        self.scripted
            .lock()
            .unwrap()
            .entry(function.to_owned())
            .or_default()
            .push_back(Err(error));
        self
    }

    pub(crate) fn fail_store(&self, error: RpcError) {
        *self.store_failure.lock().unwrap() = Some(error);
    }

    pub(crate) fn push_message(&self, receipt: &str, body: Option<&str>) {
        self.messages.lock().unwrap().push_back(QueueMessage {
            message_id: format!("id-{receipt}"),
            receipt_handle: receipt.to_owned(),
            body: body.map(str::to_owned),
        });
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than queue traffic.
    pub(crate) fn remote_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, Call::Receive { .. } | Call::Delete { .. }))
            .collect()
    }

    pub(crate) fn invocations(&self, function: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Invoke {
                    function: name,
                    payload,
                } if name == function => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn updates(&self) -> Vec<RecordUpdate> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Update(update) => Some(update),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn touched(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Touch { function, .. } => Some(function),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn deleted_receipts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Delete { receipt, .. } => Some(receipt),
                _ => None,
            })
            .collect()
    }

    /// Position of the first call matching `predicate`.
    pub(crate) fn position(&self, predicate: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls().iter().position(predicate)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl FunctionInvoker for FakePlatform {
    fn invoke<'a>(&'a self, function: &'a str, payload: Value) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            self.record(Call::Invoke {
                function: function.to_owned(),
                payload,
            });

            let scripted = self
                .scripted
                .lock()
                .unwrap()
                .get_mut(function)
                .and_then(VecDeque::pop_front);
            if let Some(reply) = scripted {
                return reply.map_err(Into::into);
            }

            self.defaults
                .lock()
                .unwrap()
                .get(function)
                .cloned()
                .ok_or_else(|| {
                    RpcError::Upstream {
                        function: function.to_owned(),
                        detail: "no reply scripted".into(),
                    }
                    .into()
                })
        })
    }
}

impl FunctionControl for FakePlatform {
    fn touch_configuration<'a>(
        &'a self,
        function: &'a str,
        marker: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(Call::Touch {
                function: function.to_owned(),
                marker: marker.to_owned(),
            });
            Ok(())
        })
    }
}

impl RecordStore for FakePlatform {
    fn update_record<'a>(&'a self, update: &'a RecordUpdate) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(Call::Update(update.clone()));
            match self.store_failure.lock().unwrap().clone() {
                Some(error) => Err(error.into()),
                None => Ok(()),
            }
        })
    }
}

impl MessageQueue for FakePlatform {
    fn receive_message<'a>(
        &'a self,
        queue: &'a str,
        _wait: Duration,
    ) -> BoxFuture<'a, Result<Option<QueueMessage>>> {
        Box::pin(async move {
            self.record(Call::Receive {
                queue: queue.to_owned(),
            });
            Ok(self.messages.lock().unwrap().pop_front())
        })
    }

    fn delete_message<'a>(
        &'a self,
        queue: &'a str,
        receipt: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(Call::Delete {
                queue: queue.to_owned(),
                receipt: receipt.to_owned(),
            });
            Ok(())
        })
    }
}
