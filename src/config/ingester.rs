use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_INGESTER_ID;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngesterConfig {
    pub id: String,
    pub poll_interval_ms: u64,
    pub base_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    /// Blocks behind head treated as final.
    pub confirmations: u64,
    pub max_block_range: u64,
    /// Floor for every scan; logs below it are never read, even for curves deployed earlier.
    pub start_block: Option<u64>,
    pub max_consecutive_failures: usize,
    pub publish_trades: bool,
}

impl Default for IngesterConfig {
    fn default() -> Self {
        Self {
            id: DEFAULT_INGESTER_ID.to_string(),
            poll_interval_ms: 4_000,
            base_retry_delay_ms: 500,
            max_retry_delay_ms: 60_000,
            confirmations: 2,
            max_block_range: 2_000,
            start_block: None,
            max_consecutive_failures: 10,
            publish_trades: true,
        }
    }
}

impl IngesterConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
