use alloy_primitives::Address;
use alloy_primitives::B256;
use alloy_primitives::U256;
use serde::Deserialize;
use serde::Serialize;

use crate::utils::serde_u256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "buy",
            TradeDirection::Sell => "sell",
        }
    }
}

/// Idempotency key of anything ingested from chain logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    pub transaction_hash: B256,
    pub log_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub token_address: Address,
    pub curve_address: Address,
    pub trader_address: Address,
    pub direction: TradeDirection,
    /// Buy: gross paid in, fee included. Sell: net paid out, fee excluded.
    #[serde(with = "serde_u256")]
    pub base_amount: U256,
    #[serde(with = "serde_u256")]
    pub token_amount: U256,
    #[serde(with = "serde_u256")]
    pub fee: U256,
    pub block_number: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub token_address: Address,
    pub from: Address,
    pub to: Address,
    #[serde(with = "serde_u256")]
    pub value: U256,
    pub block_number: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPayout {
    pub token_address: Address,
    pub recipient: Address,
    #[serde(with = "serde_u256")]
    pub amount: U256,
    pub block_number: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainEvent {
    Trade(TradeEvent),
    Transfer(TransferEvent),
    Reward(RewardPayout),
}

impl ChainEvent {
    pub fn key(&self) -> EventKey {
        let (transaction_hash, log_index) = match self {
            ChainEvent::Trade(e) => (e.transaction_hash, e.log_index),
            ChainEvent::Transfer(e) => (e.transaction_hash, e.log_index),
            ChainEvent::Reward(e) => (e.transaction_hash, e.log_index),
        };
        EventKey {
            transaction_hash,
            log_index,
        }
    }

    pub fn block_number(&self) -> u64 {
        match self {
            ChainEvent::Trade(e) => e.block_number,
            ChainEvent::Transfer(e) => e.block_number,
            ChainEvent::Reward(e) => e.block_number,
        }
    }

    pub fn token_address(&self) -> Address {
        match self {
            ChainEvent::Trade(e) => e.token_address,
            ChainEvent::Transfer(e) => e.token_address,
            ChainEvent::Reward(e) => e.token_address,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChainEvent::Trade(_) => "trade",
            ChainEvent::Transfer(_) => "transfer",
            ChainEvent::Reward(_) => "reward",
        }
    }

    /// Application order within a batch.
    pub fn sort_key(&self) -> (u64, u64) {
        (self.block_number(), self.key().log_index)
    }
}

/// Sort into application order and drop duplicate keys (overlapping log fetches).
pub fn order_events(events: &mut Vec<ChainEvent>) {
    events.sort_by_key(|e| (e.sort_key(), e.key().transaction_hash));
    events.dedup_by_key(|e| e.key());
}
