//! Remote procedure plumbing: the gateway client, response envelope decoding,
//! typed procedure schemas, platform traits, authentication, and metrics.

pub mod auth;
pub mod client;
pub mod envelope;
pub mod error;
pub mod metrics;
pub mod options;
pub mod platform;
pub mod procedures;

pub use client::{methods, GatewayClient};
pub use envelope::decode_envelope;
pub use error::RpcError;
pub use metrics::RpcMetricsSnapshot;
pub use options::RpcClientOptions;
pub use platform::{
    FunctionControl, FunctionInvoker, MessageQueue, Platform, QueueMessage, RecordStore,
};
