use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("[Rpc] transport error: {0}")]
    Transport(String),

    #[error("[Rpc] request timed out after {0}ms")]
    Timeout(u64),

    #[error("[Rpc] node returned error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("[Rpc] unexpected response: {0}")]
    InvalidResponse(String),

    #[error("[Rpc] no providers configured")]
    NoProviders,

    #[error("[Rpc] abi decode failed: {0}")]
    AbiDecode(String),
}

impl RpcError {
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Transport(_) | RpcError::Timeout(_) => true,
            RpcError::Node { message, .. } => crate::utils::is_retryable_error(message),
            _ => false,
        }
    }
}
