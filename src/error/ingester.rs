use alloy_primitives::Address;
use alloy_primitives::B256;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("invariant violation on token {token} at tx {tx_hash} log {log_index}: {reason}")]
    InvariantViolation {
        token: Address,
        tx_hash: B256,
        log_index: u64,
        reason: String,
    },

    #[error("event for untracked token {0}")]
    UnknownToken(Address),

    #[error("chain rpc unavailable: {0}")]
    RpcUnavailable(String),

    #[error("malformed log at tx {tx_hash} log {log_index}: {reason}")]
    MalformedLog { tx_hash: B256, log_index: u64, reason: String },
}
