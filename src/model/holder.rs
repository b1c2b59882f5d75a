use alloy_primitives::Address;
use alloy_primitives::U256;
use serde::Deserialize;
use serde::Serialize;

use crate::utils::serde_u256;

/// Token balance of one holder as reconstructed from Transfer logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderBalance {
    pub token_address: Address,
    pub holder_address: Address,
    #[serde(with = "serde_u256")]
    pub balance: U256,
    pub updated_at: u64,
}
