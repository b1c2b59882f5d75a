use std::time::Duration;

use alloy_primitives::Address;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployerConfig {
    pub factory_address: Option<Address>,
    /// Account the RPC endpoint signs deployment transactions with.
    pub deployer_address: Option<Address>,
    pub confirmation_timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,
    /// How long a coalesced caller waits on another process's in-flight deployment.
    pub coalesce_wait_secs: u64,
    pub max_concurrent_deployments: usize,
    /// A DEPLOYING claim untouched for this long is presumed orphaned and may be taken over.
    /// Never shorter than twice the confirmation timeout.
    pub claim_ttl_secs: u64,
    /// Deployment block recorded for a curve found on the factory when no receipt says where it
    /// landed. Ingestion backfills the curve from here.
    pub backfill_floor_block: u64,
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            factory_address: None,
            deployer_address: None,
            confirmation_timeout_secs: 180,
            receipt_poll_interval_ms: 2_000,
            coalesce_wait_secs: 300,
            max_concurrent_deployments: 16,
            claim_ttl_secs: 900,
            backfill_floor_block: 0,
        }
    }
}

impl DeployerConfig {
    /// Both addresses are required before any transaction may be sent.
    pub fn write_addresses(&self) -> Result<(Address, Address), ConfigError> {
        let factory = self
            .factory_address
            .ok_or(ConfigError::MissingWriteSetting("deployer.factory_address"))?;
        let deployer = self
            .deployer_address
            .ok_or(ConfigError::MissingWriteSetting("deployer.deployer_address"))?;
        Ok((factory, deployer))
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    pub fn coalesce_wait(&self) -> Duration {
        Duration::from_secs(self.coalesce_wait_secs)
    }

    pub fn claim_ttl_secs(&self) -> u64 {
        self.claim_ttl_secs.max(self.confirmation_timeout_secs.saturating_mul(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_ttl_outlives_a_live_attempt() {
        let config = DeployerConfig {
            confirmation_timeout_secs: 600,
            claim_ttl_secs: 60,
            ..Default::default()
        };
        assert_eq!(config.claim_ttl_secs(), 1_200);
        assert_eq!(DeployerConfig::default().claim_ttl_secs(), 900);
    }
}
