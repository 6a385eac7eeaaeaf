//! Gateway client implementation. A single JSON-RPC endpoint fronts every
//! external collaborator: remote function invocation and configuration, the
//! work queue, and the item store. `GatewayClient` implements all platform
//! traits on top of it.

use crate::rpc::auth::build_auth_headers;
use crate::rpc::envelope::{decode_envelope, InvokeRequest, InvokeResponse};
use crate::rpc::error::RpcError;
use crate::rpc::metrics::{RpcMetrics, RpcMetricsSnapshot};
use crate::rpc::options::RpcClientOptions;
use crate::rpc::platform::{
    FunctionControl, FunctionInvoker, MessageQueue, QueueMessage, RecordStore,
};
use crate::runtime::config::ReconcilerConfig;
use crate::store::{RecordUpdate, UpdateItemRequest};
use anyhow::{anyhow, Context, Result};
use futures::future::BoxFuture;
use jsonrpsee::core::client::{ClientT, Error as JsonRpcError};
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::time::{timeout, Instant};

/// JSON-RPC method names exposed by the gateway.
pub mod methods {
    pub const INVOKE: &str = "functions.invoke";
    pub const UPDATE_CONFIGURATION: &str = "functions.updateConfiguration";
    pub const RECEIVE_MESSAGE: &str = "queue.receiveMessage";
    pub const DELETE_MESSAGE: &str = "queue.deleteMessage";
    pub const UPDATE_ITEM: &str = "store.updateItem";
}

const REMEDIATION_DESCRIPTION_PREFIX: &str = "relistd-remediation";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UpdateConfigurationRequest<'a> {
    function_name: &'a str,
    description: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ReceiveMessageRequest<'a> {
    queue_url: &'a str,
    max_number_of_messages: u32,
    wait_time_seconds: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReceiveMessageResponse {
    #[serde(default)]
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireMessage {
    #[serde(default)]
    message_id: String,
    receipt_handle: String,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteMessageRequest<'a> {
    queue_url: &'a str,
    receipt_handle: &'a str,
}

#[derive(Debug, Clone)]
pub struct GatewayClient {
    gateway_url: Arc<String>,
    client: HttpClient,
    options: RpcClientOptions,
    metrics: Arc<RpcMetrics>,
}

impl FunctionInvoker for GatewayClient {
    fn invoke<'a>(&'a self, function: &'a str, payload: Value) -> BoxFuture<'a, Result<Value>> {
        Box::pin(self.invoke_function(function, payload))
    }
}

impl FunctionControl for GatewayClient {
    fn touch_configuration<'a>(
        &'a self,
        function: &'a str,
        marker: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.touch_function_configuration(function, marker))
    }
}

impl RecordStore for GatewayClient {
    fn update_record<'a>(&'a self, update: &'a RecordUpdate) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.update_item(update))
    }
}

impl MessageQueue for GatewayClient {
    fn receive_message<'a>(
        &'a self,
        queue: &'a str,
        wait: Duration,
    ) -> BoxFuture<'a, Result<Option<QueueMessage>>> {
        Box::pin(self.receive_one(queue, wait))
    }

    fn delete_message<'a>(
        &'a self,
        queue: &'a str,
        receipt: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.delete_one(queue, receipt))
    }
}

impl GatewayClient {
    pub fn new(
        url: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        Self::with_options(url, user, password, RpcClientOptions::default())
    }

    pub fn with_options(
        url: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        options: RpcClientOptions,
    ) -> Result<Self> {
        options.validate()?;

        let gateway_url = url.into();
        let headers = build_auth_headers(&user.into(), &password.into())?;
        let max_request_body_size = options.max_request_body_bytes.min(u32::MAX as usize) as u32;
        let max_response_body_size = options.max_response_body_bytes.min(u32::MAX as usize) as u32;

        let client = HttpClientBuilder::default()
            .set_headers(headers)
            .request_timeout(options.request_timeout)
            .max_concurrent_requests(options.max_concurrent_requests)
            .max_request_size(max_request_body_size)
            .max_response_size(max_response_body_size)
            .build(&gateway_url)
            .map_err(|err| anyhow!("failed to build gateway client: {err}"))?;

        Ok(Self {
            gateway_url: Arc::new(gateway_url),
            client,
            options,
            metrics: Arc::new(RpcMetrics::default()),
        })
    }

    pub fn from_config(config: &ReconcilerConfig) -> Result<Self> {
        let options = RpcClientOptions {
            request_timeout: config.rpc_timeout(),
            ..RpcClientOptions::default()
        };
        Self::with_options(
            config.gateway_url().to_owned(),
            config.gateway_user().to_owned(),
            config.gateway_password().to_owned(),
            options,
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.gateway_url
    }

    pub fn metrics(&self) -> RpcMetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn invoke_function(&self, function: &str, payload: Value) -> Result<Value> {
        let request = InvokeRequest {
            function_name: function.to_owned(),
            payload: payload.to_string(),
        };
        let response: InvokeResponse = self.call_gateway(methods::INVOKE, function, request).await?;
        let result = decode_envelope(function, &response.payload)?;
        tracing::debug!(function, "remote function invocation completed");
        Ok(result)
    }

    async fn touch_function_configuration(&self, function: &str, marker: &str) -> Result<()> {
        let request = UpdateConfigurationRequest {
            function_name: function,
            description: format!("{REMEDIATION_DESCRIPTION_PREFIX}:{marker}"),
        };
        let _: Value = self
            .call_gateway(methods::UPDATE_CONFIGURATION, function, request)
            .await?;
        tracing::debug!(function, marker, "remote function configuration touched");
        Ok(())
    }

    async fn update_item(&self, update: &RecordUpdate) -> Result<()> {
        let request = UpdateItemRequest::from(update);
        let _: Value = self
            .call_gateway(methods::UPDATE_ITEM, &update.table, request)
            .await?;
        tracing::debug!(
            table = %update.table,
            key = %update.key_value,
            fields = update.set.len(),
            "record updated"
        );
        Ok(())
    }

    async fn receive_one(&self, queue: &str, wait: Duration) -> Result<Option<QueueMessage>> {
        // The gateway takes whole seconds; configuration rejects fractional waits.
        let request = ReceiveMessageRequest {
            queue_url: queue,
            max_number_of_messages: 1,
            wait_time_seconds: wait.as_secs(),
        };
        let response: ReceiveMessageResponse = self
            .call_gateway(methods::RECEIVE_MESSAGE, queue, request)
            .await?;
        Ok(response
            .messages
            .into_iter()
            .next()
            .map(|message| QueueMessage {
                message_id: message.message_id,
                receipt_handle: message.receipt_handle,
                body: message.body,
            }))
    }

    async fn delete_one(&self, queue: &str, receipt: &str) -> Result<()> {
        let request = DeleteMessageRequest {
            queue_url: queue,
            receipt_handle: receipt,
        };
        let _: Value = self
            .call_gateway(methods::DELETE_MESSAGE, queue, request)
            .await?;
        Ok(())
    }

    /// Issues one gateway request with a single positional parameter, bounded by
    /// the configured timeout, and records latency metrics. `label` names the
    /// remote resource in errors.
    async fn call_gateway<R, P>(&self, method: &'static str, label: &str, params: P) -> Result<R>
    where
        R: DeserializeOwned,
        P: Serialize,
    {
        let mut array = ArrayParams::new();
        array
            .insert(params)
            .with_context(|| format!("failed to serialize {method} params"))?;

        let start = Instant::now();
        match timeout(
            self.options.request_timeout,
            self.client.request::<R, _>(method, array),
        )
        .await
        {
            Err(_) => {
                self.metrics.record_timeout(start.elapsed());
                Err(RpcError::Timeout {
                    function: label.to_owned(),
                }
                .into())
            }
            Ok(Err(err)) => {
                self.metrics.record_failure(start.elapsed());
                Err(map_gateway_error(label, err))
            }
            Ok(Ok(value)) => {
                self.metrics.record_success(start.elapsed());
                Ok(value)
            }
        }
    }
}

fn map_gateway_error(label: &str, err: JsonRpcError) -> anyhow::Error {
    let function = label.to_owned();
    match err {
        JsonRpcError::Call(object) => RpcError::Upstream {
            function,
            detail: format!("code={}, message={}", object.code(), object.message()),
        },
        JsonRpcError::RequestTimeout => RpcError::Timeout { function },
        JsonRpcError::ParseError(err) => RpcError::Malformed {
            function,
            message: err.to_string(),
        },
        other => RpcError::Transport {
            function,
            message: other.to_string(),
        },
    }
    .into()
}
