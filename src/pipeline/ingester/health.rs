use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::INGESTER_HEALTH_KEY_PREFIX;
use crate::storage::redis::kv::CurveKv;
use crate::Result;

/// Operator-facing view of one ingester loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngesterHealth {
    pub ingester_id: String,
    pub consecutive_failures: usize,
    pub last_error: Option<String>,
    pub last_committed_block: Option<u64>,
    pub last_success_at: Option<u64>,
    /// Set once failures reach the configured threshold; cleared by the next success.
    pub needs_attention: bool,
    pub updated_at: u64,
}

impl IngesterHealth {
    pub fn new(
        ingester_id: impl Into<String>,
        now: u64,
    ) -> Self {
        Self {
            ingester_id: ingester_id.into(),
            consecutive_failures: 0,
            last_error: None,
            last_committed_block: None,
            last_success_at: None,
            needs_attention: false,
            updated_at: now,
        }
    }

    pub fn record_success(
        &mut self,
        committed_block: u64,
        now: u64,
    ) {
        self.consecutive_failures = 0;
        self.last_error = None;
        self.needs_attention = false;
        self.last_committed_block = Some(self.last_committed_block.map_or(committed_block, |b| b.max(committed_block)));
        self.last_success_at = Some(now);
        self.updated_at = now;
    }

    pub fn record_failure(
        &mut self,
        error: &str,
        max_consecutive_failures: usize,
        now: u64,
    ) {
        self.consecutive_failures += 1;
        self.last_error = Some(error.to_string());
        self.needs_attention = self.consecutive_failures >= max_consecutive_failures.max(1);
        self.updated_at = now;
    }

    pub fn key(&self) -> String {
        health_key(&self.ingester_id)
    }
}

pub fn health_key(ingester_id: &str) -> String {
    format!("{}:{}", INGESTER_HEALTH_KEY_PREFIX, ingester_id)
}

#[async_trait]
pub trait HealthSink: Send + Sync {
    async fn write_health(
        &self,
        health: &IngesterHealth,
    ) -> Result<()>;
}

#[async_trait]
impl HealthSink for CurveKv {
    async fn write_health(
        &self,
        health: &IngesterHealth,
    ) -> Result<()> {
        self.set(&health.key(), health, None).await
    }
}
