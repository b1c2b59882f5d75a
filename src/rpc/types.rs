use alloy_primitives::Address;
use alloy_primitives::Bytes;
use alloy_primitives::B256;
use serde::Deserialize;
use serde::Serialize;

/// A log as returned by `eth_getLogs` or inside a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(with = "quantity")]
    pub block_number: u64,
    pub transaction_hash: B256,
    #[serde(with = "quantity")]
    pub log_index: u64,
    #[serde(default)]
    pub removed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    #[serde(with = "quantity")]
    pub block_number: u64,
    /// 1 on success, 0 on revert.
    #[serde(with = "quantity")]
    pub status: u64,
    #[serde(default)]
    pub logs: Vec<ChainLog>,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == 1
    }
}

/// Hex-encoded JSON-RPC quantities ("0x1a").
pub mod quantity {
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(
        value: &u64,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:#x}", value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<u64, String> {
        let hex = raw
            .strip_prefix("0x")
            .ok_or_else(|| format!("quantity {} is missing the 0x prefix", raw))?;
        u64::from_str_radix(hex, 16).map_err(|e| format!("invalid quantity {}: {}", raw, e))
    }

    pub fn encode(value: u64) -> String {
        format!("{:#x}", value)
    }
}
