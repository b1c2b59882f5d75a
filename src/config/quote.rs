use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_SLIPPAGE_BPS;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteConfig {
    /// Budget for the live on-chain read before falling back to persisted state.
    pub live_read_timeout_ms: u64,
    /// Slippage applied to the min-out encoded in trade calldata.
    pub slippage_bps: u16,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            live_read_timeout_ms: 1_500,
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
        }
    }
}
