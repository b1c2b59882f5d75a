use alloy_primitives::B256;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeployError {
    #[error("deployer is not configured for writes: {0}")]
    Configuration(String),

    #[error("failed to submit deployment transaction: {0}")]
    Submission(String),

    #[error("deployment transaction {tx_hash} not confirmed within {waited_secs}s; reconcile before retrying")]
    ConfirmationTimeout { tx_hash: B256, waited_secs: u64 },

    #[error("deployment transaction {0} reverted")]
    Reverted(B256),

    #[error("deployment transaction {0} confirmed but no curve address could be read back")]
    MissingCurveAddress(B256),

    #[error("chain unavailable while checking for an existing deployment: {0}")]
    ReconcileUnavailable(String),

    #[error("in-flight deployment did not finish within {0}s")]
    CoalesceTimeout(u64),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl DeployError {
    /// Whether a later deploy call for the same pair may succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DeployError::Configuration(_))
    }
}
