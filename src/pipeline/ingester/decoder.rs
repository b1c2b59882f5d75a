use std::collections::HashMap;
use std::collections::HashSet;

use alloy_primitives::Address;
use alloy_primitives::B256;
use alloy_sol_types::SolEvent;

use crate::error::IngestError;
use crate::model::ChainEvent;
use crate::model::CurveState;
use crate::model::RewardPayout;
use crate::model::TradeDirection;
use crate::model::TradeEvent;
use crate::model::TransferEvent;
use crate::rpc::abi::IBondingCurve;
use crate::rpc::abi::IContentToken;
use crate::rpc::ChainLog;

/// First topics the ingester asks the node for.
pub fn tracked_topics() -> Vec<B256> {
    vec![
        IBondingCurve::Buy::SIGNATURE_HASH,
        IBondingCurve::Sell::SIGNATURE_HASH,
        IBondingCurve::RewardPayout::SIGNATURE_HASH,
        IContentToken::Transfer::SIGNATURE_HASH,
    ]
}

/// Contracts whose logs are decoded: curve contracts for trades and rewards, token
/// contracts for transfers.
#[derive(Debug, Clone, Default)]
pub struct TrackedContracts {
    token_by_curve: HashMap<Address, Address>,
    tokens: HashSet<Address>,
}

impl TrackedContracts {
    pub fn new<'a>(states: impl IntoIterator<Item = &'a CurveState>) -> Self {
        let mut tracked = Self::default();
        for state in states {
            tracked.insert(state.token_address, state.curve_address);
        }
        tracked
    }

    pub fn insert(
        &mut self,
        token: Address,
        curve: Address,
    ) {
        self.tokens.insert(token);
        if !curve.is_zero() {
            self.token_by_curve.insert(curve, token);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Every address to pass to `eth_getLogs`, sorted for stable requests.
    pub fn addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.tokens.iter().chain(self.token_by_curve.keys()).copied().collect();
        addresses.sort();
        addresses.dedup();
        addresses
    }

    /// `Ok(None)` for logs that are not ours (untracked emitter, foreign topic, removed by a reorg).
    pub fn decode(
        &self,
        log: &ChainLog,
    ) -> Result<Option<ChainEvent>, IngestError> {
        if log.removed {
            return Ok(None);
        }
        let Some(topic0) = log.topics.first().copied() else {
            return Ok(None);
        };

        if let Some(token) = self.token_by_curve.get(&log.address).copied() {
            return decode_curve_log(log, topic0, token);
        }
        if self.tokens.contains(&log.address) && topic0 == IContentToken::Transfer::SIGNATURE_HASH {
            let event = IContentToken::Transfer::decode_raw_log(log.topics.iter().copied(), &log.data, true)
                .map_err(|e| malformed(log, e.to_string()))?;
            return Ok(Some(ChainEvent::Transfer(TransferEvent {
                token_address: log.address,
                from: event.from,
                to: event.to,
                value: event.value,
                block_number: log.block_number,
                transaction_hash: log.transaction_hash,
                log_index: log.log_index,
            })));
        }
        Ok(None)
    }
}

fn decode_curve_log(
    log: &ChainLog,
    topic0: B256,
    token: Address,
) -> Result<Option<ChainEvent>, IngestError> {
    let trade = |direction, emitted_token: Address, trader, base_amount, token_amount, fee| {
        if emitted_token != token {
            return Err(malformed(
                log,
                format!("curve for {} emitted a trade for {}", token, emitted_token),
            ));
        }
        Ok(Some(ChainEvent::Trade(TradeEvent {
            token_address: token,
            curve_address: log.address,
            trader_address: trader,
            direction,
            base_amount,
            token_amount,
            fee,
            block_number: log.block_number,
            transaction_hash: log.transaction_hash,
            log_index: log.log_index,
        })))
    };

    if topic0 == IBondingCurve::Buy::SIGNATURE_HASH {
        let e = IBondingCurve::Buy::decode_raw_log(log.topics.iter().copied(), &log.data, true)
            .map_err(|e| malformed(log, e.to_string()))?;
        trade(TradeDirection::Buy, e.token, e.buyer, e.baseAmount, e.tokenAmount, e.fee)
    } else if topic0 == IBondingCurve::Sell::SIGNATURE_HASH {
        let e = IBondingCurve::Sell::decode_raw_log(log.topics.iter().copied(), &log.data, true)
            .map_err(|e| malformed(log, e.to_string()))?;
        trade(TradeDirection::Sell, e.token, e.seller, e.baseAmount, e.tokenAmount, e.fee)
    } else if topic0 == IBondingCurve::RewardPayout::SIGNATURE_HASH {
        let e = IBondingCurve::RewardPayout::decode_raw_log(log.topics.iter().copied(), &log.data, true)
            .map_err(|e| malformed(log, e.to_string()))?;
        Ok(Some(ChainEvent::Reward(RewardPayout {
            token_address: token,
            recipient: e.recipient,
            amount: e.amount,
            block_number: log.block_number,
            transaction_hash: log.transaction_hash,
            log_index: log.log_index,
        })))
    } else {
        Ok(None)
    }
}

fn malformed(
    log: &ChainLog,
    reason: String,
) -> IngestError {
    IngestError::MalformedLog {
        tx_hash: log.transaction_hash,
        log_index: log.log_index,
        reason,
    }
}
