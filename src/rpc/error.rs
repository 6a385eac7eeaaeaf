use std::fmt;

/// Failure classes surfaced by remote procedure calls.
///
/// `Timeout` and `Transport` mean the call never completed. `Upstream` and
/// `Malformed` mean it completed but reported or returned something unusable.
/// The loop treats all four as recoverable for the current item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    Timeout { function: String },
    Transport { function: String, message: String },
    Upstream { function: String, detail: String },
    Malformed { function: String, message: String },
}

impl RpcError {
    pub fn function(&self) -> &str {
        match self {
            RpcError::Timeout { function }
            | RpcError::Transport { function, .. }
            | RpcError::Upstream { function, .. }
            | RpcError::Malformed { function, .. } => function,
        }
    }

    /// True when the call could not complete at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, RpcError::Timeout { .. } | RpcError::Transport { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::Timeout { .. } => "timeout",
            RpcError::Transport { .. } => "transport",
            RpcError::Upstream { .. } => "upstream",
            RpcError::Malformed { .. } => "malformed",
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::Timeout { function } => write!(f, "remote call {function} timed out"),
            RpcError::Transport { function, message } => {
                write!(f, "remote call {function} failed in transport: {message}")
            }
            RpcError::Upstream { function, detail } => {
                write!(f, "remote call {function} reported failure: {detail}")
            }
            RpcError::Malformed { function, message } => {
                write!(f, "remote call {function} returned a malformed response: {message}")
            }
        }
    }
}

impl std::error::Error for RpcError {}
