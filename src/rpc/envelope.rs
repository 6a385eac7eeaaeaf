//! Response envelope decoding for remote function invocations.
//!
//! A function replies with text that decodes either to a platform error
//! (`{"errorMessage": ...}`) or to an application envelope
//! (`{"success": bool, "result": ...}`).

use crate::rpc::error::RpcError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request shape forwarded to the gateway for a single invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvokeRequest {
    pub function_name: String,
    pub payload: String,
}

/// Raw textual reply returned by the gateway for a single invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvokeResponse {
    #[serde(default)]
    pub payload: String,
}

/// Decodes a textual function reply into its `result` value.
pub fn decode_envelope(function: &str, text: &str) -> Result<Value, RpcError> {
    let decoded: Value = serde_json::from_str(text).map_err(|err| RpcError::Malformed {
        function: function.to_owned(),
        message: format!("response is not JSON: {err}"),
    })?;

    let Value::Object(mut envelope) = decoded else {
        return Err(RpcError::Malformed {
            function: function.to_owned(),
            message: "response envelope is not an object".to_owned(),
        });
    };

    if envelope.contains_key("errorMessage") {
        return Err(RpcError::Upstream {
            function: function.to_owned(),
            detail: text.to_owned(),
        });
    }

    if !matches!(envelope.get("success"), Some(Value::Bool(true))) {
        return Err(RpcError::Upstream {
            function: function.to_owned(),
            detail: format!("{function} did not report success"),
        });
    }

    Ok(envelope.remove("result").unwrap_or(Value::Null))
}
