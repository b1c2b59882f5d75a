use alloy_primitives::Address;
use alloy_primitives::B256;
use alloy_primitives::U256;
use serde::Deserialize;
use serde::Serialize;

use super::curve::CurveParams;
use crate::utils::serde_u256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    NotStarted,
    Deploying,
    Deployed,
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::NotStarted => "NOT_STARTED",
            DeploymentStatus::Deploying => "DEPLOYING",
            DeploymentStatus::Deployed => "DEPLOYED",
            DeploymentStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NOT_STARTED" => Some(DeploymentStatus::NotStarted),
            "DEPLOYING" => Some(DeploymentStatus::Deploying),
            "DEPLOYED" => Some(DeploymentStatus::Deployed),
            "FAILED" => Some(DeploymentStatus::Failed),
            _ => None,
        }
    }

    /// Legal transitions of a deployment record. FAILED may be re-reserved for a retry.
    pub fn can_transition_to(
        &self,
        next: DeploymentStatus,
    ) -> bool {
        matches!(
            (self, next),
            (DeploymentStatus::NotStarted, DeploymentStatus::Deploying)
                | (DeploymentStatus::Failed, DeploymentStatus::Deploying)
                | (DeploymentStatus::Deploying, DeploymentStatus::Deployed)
                | (DeploymentStatus::Deploying, DeploymentStatus::Failed)
        )
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub creator_address: Address,
    pub token_address: Address,
    pub status: DeploymentStatus,
    /// Holder of the DEPLOYING claim; only it may complete or fail the attempt.
    pub reservation_id: Option<String>,
    pub curve_address: Option<Address>,
    /// Last submitted deployment transaction, kept across failures for reconciliation.
    pub tx_hash: Option<B256>,
    pub deployment_block: Option<u64>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl DeploymentRecord {
    pub fn not_started(
        creator_address: Address,
        token_address: Address,
        now: u64,
    ) -> Self {
        Self {
            creator_address,
            token_address,
            status: DeploymentStatus::NotStarted,
            reservation_id: None,
            curve_address: None,
            tx_hash: None,
            deployment_block: None,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_held_by(
        &self,
        reservation_id: &str,
    ) -> bool {
        self.status == DeploymentStatus::Deploying && self.reservation_id.as_deref() == Some(reservation_id)
    }
}

/// Proof of holding the DEPLOYING claim for one pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub reservation_id: String,
    pub record: DeploymentRecord,
}

/// Result of the compare-and-set claim on a deployment record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved(Reservation),
    /// Another caller holds the DEPLOYING claim.
    AlreadyReserved(DeploymentRecord),
    AlreadyDeployed(DeploymentRecord),
}

/// Chain facts of a confirmed deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploymentReceipt {
    pub curve_address: Address,
    /// `None` when the curve was found on the factory without a known creating transaction.
    pub tx_hash: Option<B256>,
    pub deployment_block: u64,
}

/// Request from the content-creation side to put a curve behind a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub creator_address: Address,
    pub token_address: Address,
    pub platform_address: Address,
    #[serde(with = "serde_u256", default)]
    pub initial_supply: U256,
    /// Falls back to the configured curve shape when absent.
    #[serde(default)]
    pub params: Option<CurveParams>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployResponse {
    pub creator_address: Address,
    pub token_address: Address,
    pub status: DeploymentStatus,
    pub curve_address: Option<Address>,
    pub tx_hash: Option<B256>,
    pub error: Option<String>,
    pub retryable: bool,
    /// True when this caller joined another caller's in-flight attempt.
    pub coalesced: bool,
}

impl DeployResponse {
    pub fn from_record(
        record: &DeploymentRecord,
        coalesced: bool,
    ) -> Self {
        Self {
            creator_address: record.creator_address,
            token_address: record.token_address,
            status: record.status,
            curve_address: record.curve_address,
            tx_hash: record.tx_hash,
            error: record.last_error.clone(),
            retryable: record.status == DeploymentStatus::Failed,
            coalesced,
        }
    }

    pub fn failed(
        creator_address: Address,
        token_address: Address,
        tx_hash: Option<B256>,
        error: &crate::error::DeployError,
    ) -> Self {
        Self {
            creator_address,
            token_address,
            status: DeploymentStatus::Failed,
            curve_address: None,
            tx_hash,
            error: Some(error.to_string()),
            retryable: error.is_retryable(),
            coalesced: false,
        }
    }
}
