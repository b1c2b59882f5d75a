use alloy_primitives::Address;
use serde::Deserialize;
use serde::Serialize;

/// Durable watermark of the shared ingestion loop. Never moves backwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestCursor {
    pub ingester_id: String,
    pub last_processed_block: u64,
    pub updated_at: u64,
}

impl IngestCursor {
    pub fn new(
        ingester_id: impl Into<String>,
        last_processed_block: u64,
        updated_at: u64,
    ) -> Self {
        Self {
            ingester_id: ingester_id.into(),
            last_processed_block,
            updated_at,
        }
    }

    pub fn advanced_to(
        &self,
        block: u64,
        now: u64,
    ) -> Self {
        Self {
            ingester_id: self.ingester_id.clone(),
            last_processed_block: self.last_processed_block.max(block),
            updated_at: now,
        }
    }
}

/// Per-token low-water mark: highest block whose logs for this token are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenWatermark {
    pub token_address: Address,
    pub last_scanned_block: u64,
}
