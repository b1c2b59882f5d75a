use std::collections::HashMap;
use std::collections::HashSet;

use alloy_primitives::Address;
use alloy_primitives::B256;
use alloy_primitives::U256;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::warn;

use super::batch::apply_to_state;
use super::batch::apply_transfer;
use super::BatchOutcome;
use super::CurveStore;
use super::IngestBatch;
use crate::err_with_loc;
use crate::error::IngestError;
use crate::error::RegistryError;
use crate::model::ChainEvent;
use crate::model::CurveState;
use crate::model::DeploymentReceipt;
use crate::model::DeploymentRecord;
use crate::model::DeploymentStatus;
use crate::model::EventKey;
use crate::model::HolderBalance;
use crate::model::IngestCursor;
use crate::model::Reservation;
use crate::model::ReserveOutcome;
use crate::model::RewardPayout;
use crate::model::TokenWatermark;
use crate::model::TradeEvent;
use crate::model::TransferEvent;
use crate::Result;

#[derive(Debug, Default)]
struct Inner {
    curves: HashMap<Address, CurveState>,
    deployments: HashMap<(Address, Address), DeploymentRecord>,
    cursors: HashMap<String, IngestCursor>,
    watermarks: HashMap<Address, u64>,
    applied: HashSet<EventKey>,
    trades: Vec<TradeEvent>,
    transfers: Vec<TransferEvent>,
    rewards: Vec<RewardPayout>,
    holders: HashMap<(Address, Address), HolderBalance>,
}

/// Process-local store with the same semantics as the Postgres one. Lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryCurveStore {
    inner: Mutex<Inner>,
}

impl InMemoryCurveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn trade_count(&self) -> usize {
        self.inner.lock().await.trades.len()
    }

    pub async fn reward_count(&self) -> usize {
        self.inner.lock().await.rewards.len()
    }
}

fn held_record<'a>(
    inner: &'a mut Inner,
    creator: Address,
    token: Address,
    reservation_id: &str,
) -> Result<&'a mut DeploymentRecord> {
    match inner.deployments.get_mut(&(creator, token)) {
        Some(record) if record.is_held_by(reservation_id) => Ok(record),
        _ => Err(err_with_loc!(RegistryError::StaleReservation {
            creator,
            token,
            reservation_id: reservation_id.to_string(),
        })),
    }
}

#[async_trait]
impl CurveStore for InMemoryCurveStore {
    async fn get_curve_state(
        &self,
        token: Address,
    ) -> Result<Option<CurveState>> {
        Ok(self.inner.lock().await.curves.get(&token).cloned())
    }

    async fn list_active_curves(&self) -> Result<Vec<CurveState>> {
        let inner = self.inner.lock().await;
        let mut curves: Vec<CurveState> = inner.curves.values().filter(|c| c.is_active).cloned().collect();
        curves.sort_by_key(|c| (c.deployment_block, c.token_address));
        Ok(curves)
    }

    async fn insert_curve_state(
        &self,
        state: &CurveState,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.curves.contains_key(&state.token_address) {
            return Ok(false);
        }
        inner.curves.insert(state.token_address, state.clone());
        Ok(true)
    }

    async fn deactivate_curve(
        &self,
        token: Address,
        now: u64,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.curves.get_mut(&token) {
            Some(state) => {
                state.is_active = false;
                state.updated_at = now;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn get_deployment(
        &self,
        creator: Address,
        token: Address,
    ) -> Result<Option<DeploymentRecord>> {
        Ok(self.inner.lock().await.deployments.get(&(creator, token)).cloned())
    }

    async fn try_reserve_deployment(
        &self,
        creator: Address,
        token: Address,
        reservation_id: &str,
        now: u64,
        stale_before: u64,
    ) -> Result<ReserveOutcome> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .deployments
            .entry((creator, token))
            .or_insert_with(|| DeploymentRecord::not_started(creator, token, now));

        match record.status {
            DeploymentStatus::Deploying if record.updated_at >= stale_before => {
                Ok(ReserveOutcome::AlreadyReserved(record.clone()))
            },
            DeploymentStatus::Deployed => Ok(ReserveOutcome::AlreadyDeployed(record.clone())),
            DeploymentStatus::NotStarted | DeploymentStatus::Failed | DeploymentStatus::Deploying => {
                if record.status == DeploymentStatus::Deploying {
                    warn!(
                        "taking_over_stale_deployment_claim::token::{}::holder::{:?}::last_seen::{}",
                        token, record.reservation_id, record.updated_at
                    );
                }
                record.status = DeploymentStatus::Deploying;
                record.reservation_id = Some(reservation_id.to_string());
                record.attempts += 1;
                record.last_error = None;
                record.updated_at = now;
                Ok(ReserveOutcome::Reserved(Reservation {
                    reservation_id: reservation_id.to_string(),
                    record: record.clone(),
                }))
            },
        }
    }

    async fn record_deployment_tx(
        &self,
        creator: Address,
        token: Address,
        reservation_id: &str,
        tx_hash: B256,
        now: u64,
    ) -> Result<DeploymentRecord> {
        let mut inner = self.inner.lock().await;
        let record = held_record(&mut inner, creator, token, reservation_id)?;
        record.tx_hash = Some(tx_hash);
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn complete_deployment(
        &self,
        creator: Address,
        token: Address,
        reservation_id: &str,
        receipt: DeploymentReceipt,
        initial_state: &CurveState,
        now: u64,
    ) -> Result<DeploymentRecord> {
        let mut inner = self.inner.lock().await;
        let record = held_record(&mut inner, creator, token, reservation_id)?;
        record.status = DeploymentStatus::Deployed;
        record.curve_address = Some(receipt.curve_address);
        if receipt.tx_hash.is_some() {
            record.tx_hash = receipt.tx_hash;
        }
        record.deployment_block = Some(receipt.deployment_block);
        record.last_error = None;
        record.updated_at = now;
        let record = record.clone();
        inner
            .curves
            .entry(initial_state.token_address)
            .or_insert_with(|| initial_state.clone());
        Ok(record)
    }

    async fn fail_deployment(
        &self,
        creator: Address,
        token: Address,
        reservation_id: &str,
        tx_hash: Option<B256>,
        error: &str,
        now: u64,
    ) -> Result<DeploymentRecord> {
        let mut inner = self.inner.lock().await;
        let record = held_record(&mut inner, creator, token, reservation_id)?;
        record.status = DeploymentStatus::Failed;
        if tx_hash.is_some() {
            record.tx_hash = tx_hash;
        }
        record.last_error = Some(error.to_string());
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn get_cursor(
        &self,
        ingester_id: &str,
    ) -> Result<Option<IngestCursor>> {
        Ok(self.inner.lock().await.cursors.get(ingester_id).cloned())
    }

    async fn get_watermarks(&self) -> Result<Vec<TokenWatermark>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .watermarks
            .iter()
            .map(|(token_address, last_scanned_block)| TokenWatermark {
                token_address: *token_address,
                last_scanned_block: *last_scanned_block,
            })
            .collect())
    }

    async fn apply_batch(
        &self,
        batch: &IngestBatch,
    ) -> Result<BatchOutcome> {
        let mut inner = self.inner.lock().await;
        let mut outcome = BatchOutcome::default();
        // Work on copies, commit only if every event applied.
        let mut states: HashMap<Address, CurveState> = HashMap::new();
        let mut holders: HashMap<(Address, Address), U256> = HashMap::new();
        let mut seen: HashSet<EventKey> = HashSet::new();

        for event in &batch.events {
            let key = event.key();
            if inner.applied.contains(&key) || !seen.insert(key) {
                outcome.duplicates += 1;
                continue;
            }

            let token = event.token_address();
            if !states.contains_key(&token) {
                match inner.curves.get(&token) {
                    Some(state) => {
                        states.insert(token, state.clone());
                    },
                    None => {
                        warn!("event_for_unknown_token::token::{}::tx::{}", token, key.transaction_hash);
                        outcome.skipped_unknown += 1;
                        continue;
                    },
                }
            }
            let Some(state) = states.get_mut(&token) else {
                continue;
            };

            match event {
                ChainEvent::Transfer(transfer) => {
                    let balance_of = |holder: Address| {
                        holders
                            .get(&(token, holder))
                            .copied()
                            .or_else(|| inner.holders.get(&(token, holder)).map(|h| h.balance))
                            .unwrap_or(U256::ZERO)
                    };
                    let from_before = balance_of(transfer.from);
                    let to_before = balance_of(transfer.to);
                    let effect = apply_transfer(state, transfer, from_before, to_before, batch.now);
                    if let Some(balance) = effect.from_balance {
                        holders.insert((token, transfer.from), balance);
                    }
                    if let Some(balance) = effect.to_balance {
                        holders.insert((token, transfer.to), balance);
                    }
                },
                other => {
                    apply_to_state(state, other, batch.now).map_err(|e: IngestError| err_with_loc!(e))?;
                },
            }
            outcome.applied.push(event.clone());
        }

        for event in &outcome.applied {
            inner.applied.insert(event.key());
            match event {
                ChainEvent::Trade(trade) => inner.trades.push(trade.clone()),
                ChainEvent::Transfer(transfer) => inner.transfers.push(transfer.clone()),
                ChainEvent::Reward(reward) => inner.rewards.push(reward.clone()),
            }
        }
        for ((token_address, holder_address), balance) in holders {
            inner.holders.insert((token_address, holder_address), HolderBalance {
                token_address,
                holder_address,
                balance,
                updated_at: batch.now,
            });
        }
        for (token, state) in states {
            outcome.states.push(state.clone());
            inner.curves.insert(token, state);
        }
        for watermark in &batch.watermarks {
            let entry = inner.watermarks.entry(watermark.token_address).or_insert(0);
            *entry = (*entry).max(watermark.last_scanned_block);
        }
        if let Some(cursor) = &batch.cursor {
            let next = match inner.cursors.get(&cursor.ingester_id) {
                Some(current) => current.advanced_to(cursor.last_processed_block, cursor.updated_at),
                None => cursor.clone(),
            };
            inner.cursors.insert(cursor.ingester_id.clone(), next);
        }

        debug!(
            "batch_applied::events::{}::duplicates::{}::unknown::{}",
            outcome.applied.len(),
            outcome.duplicates,
            outcome.skipped_unknown
        );
        Ok(outcome)
    }

    async fn list_trades(
        &self,
        token: Address,
        limit: usize,
    ) -> Result<Vec<TradeEvent>> {
        let inner = self.inner.lock().await;
        let mut trades: Vec<TradeEvent> = inner.trades.iter().filter(|t| t.token_address == token).cloned().collect();
        trades.sort_by(|a, b| (b.block_number, b.log_index).cmp(&(a.block_number, a.log_index)));
        trades.truncate(limit);
        Ok(trades)
    }

    async fn get_holder_balance(
        &self,
        token: Address,
        holder: Address,
    ) -> Result<Option<HolderBalance>> {
        Ok(self.inner.lock().await.holders.get(&(token, holder)).cloned())
    }
}
