use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use alloy_primitives::Address;
use alloy_primitives::B256;
use alloy_primitives::U256;
use async_trait::async_trait;
use bb8::PooledConnection;
use bb8_postgres::PostgresConnectionManager;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::GenericClient;
use tracing::debug;
use tracing::error;
use tracing::warn;

use super::model::address_text;
use super::model::curve_state_from_row;
use super::model::cursor_from_row;
use super::model::deployment_from_row;
use super::model::hash_text;
use super::model::holder_from_row;
use super::model::trade_from_row;
use super::PostgresPool;
use crate::err_with_loc;
use crate::error::PostgresClientError;
use crate::error::RegistryError;
use crate::error::Result;
use crate::model::ChainEvent;
use crate::model::CurveState;
use crate::model::DeploymentReceipt;
use crate::model::DeploymentRecord;
use crate::model::DeploymentStatus;
use crate::model::HolderBalance;
use crate::model::IngestCursor;
use crate::model::Reservation;
use crate::model::ReserveOutcome;
use crate::model::TokenWatermark;
use crate::model::TradeEvent;
use crate::storage::batch::apply_to_state;
use crate::storage::batch::apply_transfer;
use crate::storage::BatchOutcome;
use crate::storage::CurveStore;
use crate::storage::IngestBatch;

type PooledPostgres<'a> = PooledConnection<'a, PostgresConnectionManager<MakeTlsConnector>>;

const CURVE_COLUMNS: &str = "token_address, creator_address, platform_address, curve_address, \
                             virtual_base_reserve, virtual_token_reserve, curve_supply_cap, total_supply, fee_bps, \
                             circulating_supply, reserve_balance, current_price, market_cap, all_time_high_price, \
                             total_volume_base, total_rewards_paid, trade_count, holder_count, deployment_block, \
                             last_trade_block, is_active, created_at, updated_at";

const DEPLOYMENT_COLUMNS: &str = "creator_address, token_address, status, reservation_id, curve_address, tx_hash, \
                                  deployment_block, attempts, last_error, created_at, updated_at";

fn query_err(
    what: &str,
    e: tokio_postgres::Error,
) -> anyhow::Error {
    error!("{}::error::{}", what, e);
    err_with_loc!(PostgresClientError::QueryError(format!("{}::{}", what, e)))
}

fn stale(
    creator: Address,
    token: Address,
    reservation_id: &str,
) -> anyhow::Error {
    err_with_loc!(RegistryError::StaleReservation {
        creator,
        token,
        reservation_id: reservation_id.to_string(),
    })
}

async fn write_curve_state<C: GenericClient + Sync>(
    client: &C,
    state: &CurveState,
    overwrite: bool,
) -> Result<u64> {
    let conflict = if overwrite {
        "ON CONFLICT (token_address) DO UPDATE SET
            circulating_supply = EXCLUDED.circulating_supply,
            reserve_balance = EXCLUDED.reserve_balance,
            current_price = EXCLUDED.current_price,
            market_cap = EXCLUDED.market_cap,
            all_time_high_price = EXCLUDED.all_time_high_price,
            total_volume_base = EXCLUDED.total_volume_base,
            total_rewards_paid = EXCLUDED.total_rewards_paid,
            trade_count = EXCLUDED.trade_count,
            holder_count = EXCLUDED.holder_count,
            last_trade_block = EXCLUDED.last_trade_block,
            is_active = EXCLUDED.is_active,
            updated_at = EXCLUDED.updated_at"
    } else {
        "ON CONFLICT (token_address) DO NOTHING"
    };
    let sql = format!(
        "INSERT INTO curve_states ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
         $17, $18, $19, $20, $21, $22, $23) {}",
        CURVE_COLUMNS, conflict
    );
    client
        .execute(&sql, &[
            &address_text(&state.token_address),
            &address_text(&state.creator_address),
            &address_text(&state.platform_address),
            &address_text(&state.curve_address),
            &state.params.virtual_base_reserve.to_string(),
            &state.params.virtual_token_reserve.to_string(),
            &state.params.curve_supply_cap.to_string(),
            &state.params.total_supply.to_string(),
            &(state.params.fee_bps as i32),
            &state.circulating_supply.to_string(),
            &state.reserve_balance.to_string(),
            &state.current_price.to_string(),
            &state.market_cap.to_string(),
            &state.all_time_high_price.to_string(),
            &state.total_volume_base.to_string(),
            &state.total_rewards_paid.to_string(),
            &(state.trade_count as i64),
            &(state.holder_count as i64),
            &(state.deployment_block as i64),
            &state.last_trade_block.map(|b| b as i64),
            &state.is_active,
            &(state.created_at as i64),
            &(state.updated_at as i64),
        ])
        .await
        .map_err(|e| query_err("failed_to_write_curve_state", e))
}

/// Insert the event row; zero rows means its key was already applied.
async fn record_event<C: GenericClient + Sync>(
    client: &C,
    event: &ChainEvent,
    now: u64,
) -> Result<u64> {
    let result = match event {
        ChainEvent::Trade(t) => {
            client
                .execute(
                    "INSERT INTO trade_events (
                        tx_hash, log_index, token_address, curve_address, trader_address, direction,
                        base_amount, token_amount, fee, block_number, created_at
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                    ON CONFLICT (tx_hash, log_index) DO NOTHING",
                    &[
                        &hash_text(&t.transaction_hash),
                        &(t.log_index as i64),
                        &address_text(&t.token_address),
                        &address_text(&t.curve_address),
                        &address_text(&t.trader_address),
                        &t.direction.as_str(),
                        &t.base_amount.to_string(),
                        &t.token_amount.to_string(),
                        &t.fee.to_string(),
                        &(t.block_number as i64),
                        &(now as i64),
                    ],
                )
                .await
        },
        ChainEvent::Transfer(t) => {
            client
                .execute(
                    "INSERT INTO transfer_events (
                        tx_hash, log_index, token_address, from_address, to_address, value, block_number, created_at
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    ON CONFLICT (tx_hash, log_index) DO NOTHING",
                    &[
                        &hash_text(&t.transaction_hash),
                        &(t.log_index as i64),
                        &address_text(&t.token_address),
                        &address_text(&t.from),
                        &address_text(&t.to),
                        &t.value.to_string(),
                        &(t.block_number as i64),
                        &(now as i64),
                    ],
                )
                .await
        },
        ChainEvent::Reward(r) => {
            client
                .execute(
                    "INSERT INTO reward_payouts (
                        tx_hash, log_index, token_address, recipient_address, amount, block_number, created_at
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                    ON CONFLICT (tx_hash, log_index) DO NOTHING",
                    &[
                        &hash_text(&r.transaction_hash),
                        &(r.log_index as i64),
                        &address_text(&r.token_address),
                        &address_text(&r.recipient),
                        &r.amount.to_string(),
                        &(r.block_number as i64),
                        &(now as i64),
                    ],
                )
                .await
        },
    };
    result.map_err(|e| query_err("failed_to_record_event", e))
}

async fn holder_balance_for_update<C: GenericClient + Sync>(
    client: &C,
    token: Address,
    holder: Address,
) -> Result<U256> {
    let row = client
        .query_opt(
            "SELECT token_address, holder_address, balance, updated_at FROM token_holders
             WHERE token_address = $1 AND holder_address = $2 FOR UPDATE",
            &[&address_text(&token), &address_text(&holder)],
        )
        .await
        .map_err(|e| query_err("failed_to_select_holder_balance", e))?;
    match row {
        Some(row) => Ok(holder_from_row(&row).map_err(|e| err_with_loc!(e))?.balance),
        None => Ok(U256::ZERO),
    }
}

#[derive(Debug, Clone)]
pub struct PostgresCurveStore {
    pub pool: Arc<PostgresPool>,
}

impl PostgresCurveStore {
    pub fn new(pool: Arc<PostgresPool>) -> Self {
        Self { pool }
    }

    async fn get_connection(&self) -> Result<PooledPostgres<'_>> {
        self.pool.get().await.map_err(|e| {
            error!("failed_to_get_client_pool_connection: {}", e);
            err_with_loc!(PostgresClientError::PoolError(e))
        })
    }

    async fn select_deployment<C: GenericClient + Sync>(
        client: &C,
        creator: Address,
        token: Address,
    ) -> Result<Option<DeploymentRecord>> {
        let sql = format!(
            "SELECT {} FROM deployment_records WHERE creator_address = $1 AND token_address = $2",
            DEPLOYMENT_COLUMNS
        );
        let row = client
            .query_opt(&sql, &[&address_text(&creator), &address_text(&token)])
            .await
            .map_err(|e| query_err("failed_to_select_deployment", e))?;
        row.map(|row| deployment_from_row(&row).map_err(|e| err_with_loc!(e))).transpose()
    }
}

#[async_trait]
impl CurveStore for PostgresCurveStore {
    async fn get_curve_state(
        &self,
        token: Address,
    ) -> Result<Option<CurveState>> {
        let conn = self.get_connection().await?;
        let sql = format!("SELECT {} FROM curve_states WHERE token_address = $1", CURVE_COLUMNS);
        let row = conn
            .query_opt(&sql, &[&address_text(&token)])
            .await
            .map_err(|e| query_err("failed_to_select_curve_state", e))?;
        row.map(|row| curve_state_from_row(&row).map_err(|e| err_with_loc!(e))).transpose()
    }

    async fn list_active_curves(&self) -> Result<Vec<CurveState>> {
        let conn = self.get_connection().await?;
        let sql = format!(
            "SELECT {} FROM curve_states WHERE is_active ORDER BY deployment_block ASC, token_address ASC",
            CURVE_COLUMNS
        );
        let rows = conn
            .query(&sql, &[])
            .await
            .map_err(|e| query_err("failed_to_list_active_curves", e))?;
        rows.iter()
            .map(|row| curve_state_from_row(row).map_err(|e| err_with_loc!(e)))
            .collect()
    }

    async fn insert_curve_state(
        &self,
        state: &CurveState,
    ) -> Result<bool> {
        let conn = self.get_connection().await?;
        let inserted = write_curve_state(&*conn, state, false).await?;
        Ok(inserted == 1)
    }

    async fn deactivate_curve(
        &self,
        token: Address,
        now: u64,
    ) -> Result<bool> {
        let conn = self.get_connection().await?;
        let updated = conn
            .execute(
                "UPDATE curve_states SET is_active = FALSE, updated_at = $2 WHERE token_address = $1",
                &[&address_text(&token), &(now as i64)],
            )
            .await
            .map_err(|e| query_err("failed_to_deactivate_curve", e))?;
        debug!("deactivate_curve::{}::updated::{}", token, updated);
        Ok(updated == 1)
    }

    async fn get_deployment(
        &self,
        creator: Address,
        token: Address,
    ) -> Result<Option<DeploymentRecord>> {
        let conn = self.get_connection().await?;
        Self::select_deployment(&*conn, creator, token).await
    }

    async fn try_reserve_deployment(
        &self,
        creator: Address,
        token: Address,
        reservation_id: &str,
        now: u64,
        stale_before: u64,
    ) -> Result<ReserveOutcome> {
        let conn = self.get_connection().await?;
        let sql = format!(
            "INSERT INTO deployment_records (
                creator_address, token_address, status, reservation_id, attempts, created_at, updated_at
            ) VALUES ($1, $2, 'DEPLOYING', $3, 1, $4, $4)
            ON CONFLICT (creator_address, token_address) DO UPDATE SET
                status = 'DEPLOYING',
                reservation_id = EXCLUDED.reservation_id,
                attempts = deployment_records.attempts + 1,
                last_error = NULL,
                updated_at = EXCLUDED.updated_at
            WHERE deployment_records.status IN ('NOT_STARTED', 'FAILED')
                OR (deployment_records.status = 'DEPLOYING' AND deployment_records.updated_at < $5)
            RETURNING {}",
            DEPLOYMENT_COLUMNS
        );

        // A lost race against a concurrent fail can leave nothing to report; look again.
        for _ in 0..3 {
            let claimed = conn
                .query_opt(&sql, &[
                    &address_text(&creator),
                    &address_text(&token),
                    &reservation_id,
                    &(now as i64),
                    &(stale_before as i64),
                ])
                .await
                .map_err(|e| query_err("failed_to_reserve_deployment", e))?;
            if let Some(row) = claimed {
                let record = deployment_from_row(&row).map_err(|e| err_with_loc!(e))?;
                return Ok(ReserveOutcome::Reserved(Reservation {
                    reservation_id: reservation_id.to_string(),
                    record,
                }));
            }

            match Self::select_deployment(&*conn, creator, token).await? {
                Some(record) if record.status == DeploymentStatus::Deploying => {
                    return Ok(ReserveOutcome::AlreadyReserved(record));
                },
                Some(record) if record.status == DeploymentStatus::Deployed => {
                    return Ok(ReserveOutcome::AlreadyDeployed(record));
                },
                _ => continue,
            }
        }
        Err(err_with_loc!(PostgresClientError::TransactionError(format!(
            "reservation_contention::creator::{}::token::{}",
            creator, token
        ))))
    }

    async fn record_deployment_tx(
        &self,
        creator: Address,
        token: Address,
        reservation_id: &str,
        tx_hash: B256,
        now: u64,
    ) -> Result<DeploymentRecord> {
        let conn = self.get_connection().await?;
        let sql = format!(
            "UPDATE deployment_records SET tx_hash = $4, updated_at = $5
             WHERE creator_address = $1 AND token_address = $2 AND status = 'DEPLOYING' AND reservation_id = $3
             RETURNING {}",
            DEPLOYMENT_COLUMNS
        );
        let row = conn
            .query_opt(&sql, &[
                &address_text(&creator),
                &address_text(&token),
                &reservation_id,
                &hash_text(&tx_hash),
                &(now as i64),
            ])
            .await
            .map_err(|e| query_err("failed_to_record_deployment_tx", e))?
            .ok_or_else(|| stale(creator, token, reservation_id))?;
        deployment_from_row(&row).map_err(|e| err_with_loc!(e))
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
        let mut conn = self.get_connection().await?;
        let tx = conn.transaction().await.map_err(|e| query_err("failed_to_start_transaction", e))?;

        let sql = format!(
            "UPDATE deployment_records SET
                status = 'DEPLOYED', curve_address = $4, tx_hash = COALESCE($5, tx_hash), deployment_block = $6,
                last_error = NULL, updated_at = $7
             WHERE creator_address = $1 AND token_address = $2 AND status = 'DEPLOYING' AND reservation_id = $3
             RETURNING {}",
            DEPLOYMENT_COLUMNS
        );
        let row = tx
            .query_opt(&sql, &[
                &address_text(&creator),
                &address_text(&token),
                &reservation_id,
                &address_text(&receipt.curve_address),
                &receipt.tx_hash.as_ref().map(hash_text),
                &(receipt.deployment_block as i64),
                &(now as i64),
            ])
            .await
            .map_err(|e| query_err("failed_to_complete_deployment", e))?
            .ok_or_else(|| stale(creator, token, reservation_id))?;
        let record = deployment_from_row(&row).map_err(|e| err_with_loc!(e))?;

        write_curve_state(&tx, initial_state, false).await?;

        tx.commit().await.map_err(|e| query_err("failed_to_commit_transaction", e))?;
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
        let conn = self.get_connection().await?;
        let sql = format!(
            "UPDATE deployment_records SET
                status = 'FAILED', last_error = $4, updated_at = $5, tx_hash = COALESCE($6, tx_hash)
             WHERE creator_address = $1 AND token_address = $2 AND status = 'DEPLOYING' AND reservation_id = $3
             RETURNING {}",
            DEPLOYMENT_COLUMNS
        );
        let row = conn
            .query_opt(&sql, &[
                &address_text(&creator),
                &address_text(&token),
                &reservation_id,
                &error,
                &(now as i64),
                &tx_hash.as_ref().map(hash_text),
            ])
            .await
            .map_err(|e| query_err("failed_to_fail_deployment", e))?
            .ok_or_else(|| stale(creator, token, reservation_id))?;
        deployment_from_row(&row).map_err(|e| err_with_loc!(e))
    }

    async fn get_cursor(
        &self,
        ingester_id: &str,
    ) -> Result<Option<IngestCursor>> {
        let conn = self.get_connection().await?;
        let row = conn
            .query_opt(
                "SELECT ingester_id, last_processed_block, updated_at FROM ingest_cursors WHERE ingester_id = $1",
                &[&ingester_id],
            )
            .await
            .map_err(|e| query_err("failed_to_select_cursor", e))?;
        row.map(|row| cursor_from_row(&row).map_err(|e| err_with_loc!(e))).transpose()
    }

    async fn get_watermarks(&self) -> Result<Vec<TokenWatermark>> {
        let conn = self.get_connection().await?;
        let rows = conn
            .query("SELECT token_address, last_scanned_block FROM token_watermarks", &[])
            .await
            .map_err(|e| query_err("failed_to_select_watermarks", e))?;
        rows.iter()
            .map(|row| {
                let token: String = row.get(0);
                let block: i64 = row.get(1);
                let token_address = token.parse::<Address>().map_err(|e| {
                    err_with_loc!(PostgresClientError::CorruptRow {
                        table: "token_watermarks",
                        reason: e.to_string(),
                    })
                })?;
                Ok(TokenWatermark {
                    token_address,
                    last_scanned_block: block as u64,
                })
            })
            .collect()
    }

    async fn apply_batch(
        &self,
        batch: &IngestBatch,
    ) -> Result<BatchOutcome> {
        let mut conn = self.get_connection().await?;
        // Dropping the transaction without commit rolls everything back.
        let tx = conn.transaction().await.map_err(|e| query_err("failed_to_start_transaction", e))?;

        let mut outcome = BatchOutcome::default();
        let mut states: HashMap<Address, CurveState> = HashMap::new();
        let mut unknown: HashSet<Address> = HashSet::new();
        let mut holders: HashMap<(Address, Address), U256> = HashMap::new();
        let select_state = format!("SELECT {} FROM curve_states WHERE token_address = $1 FOR UPDATE", CURVE_COLUMNS);

        for event in &batch.events {
            let token = event.token_address();
            if unknown.contains(&token) {
                outcome.skipped_unknown += 1;
                continue;
            }
            if !states.contains_key(&token) {
                let row = tx
                    .query_opt(&select_state, &[&address_text(&token)])
                    .await
                    .map_err(|e| query_err("failed_to_lock_curve_state", e))?;
                match row {
                    Some(row) => {
                        states.insert(token, curve_state_from_row(&row).map_err(|e| err_with_loc!(e))?);
                    },
                    None => {
                        warn!("event_for_unknown_token::token::{}::tx::{}", token, event.key().transaction_hash);
                        unknown.insert(token);
                        outcome.skipped_unknown += 1;
                        continue;
                    },
                }
            }

            if record_event(&tx, event, batch.now).await? == 0 {
                outcome.duplicates += 1;
                continue;
            }

            let Some(state) = states.get_mut(&token) else {
                continue;
            };
            match event {
                ChainEvent::Transfer(transfer) => {
                    let from_before = match holders.get(&(token, transfer.from)) {
                        Some(balance) => *balance,
                        None => holder_balance_for_update(&tx, token, transfer.from).await?,
                    };
                    let to_before = match holders.get(&(token, transfer.to)) {
                        Some(balance) => *balance,
                        None => holder_balance_for_update(&tx, token, transfer.to).await?,
                    };
                    let effect = apply_transfer(state, transfer, from_before, to_before, batch.now);
                    if let Some(balance) = effect.from_balance {
                        holders.insert((token, transfer.from), balance);
                    }
                    if let Some(balance) = effect.to_balance {
                        holders.insert((token, transfer.to), balance);
                    }
                },
                other => {
                    if let Err(e) = apply_to_state(state, other, batch.now) {
                        error!("batch_rejected::{}", e);
                        return Err(err_with_loc!(e));
                    }
                },
            }
            outcome.applied.push(event.clone());
        }

        for ((token, holder), balance) in &holders {
            tx.execute(
                "INSERT INTO token_holders (token_address, holder_address, balance, updated_at)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (token_address, holder_address) DO UPDATE SET
                    balance = EXCLUDED.balance,
                    updated_at = EXCLUDED.updated_at",
                &[&address_text(token), &address_text(holder), &balance.to_string(), &(batch.now as i64)],
            )
            .await
            .map_err(|e| query_err("failed_to_upsert_holder", e))?;
        }

        for state in states.values() {
            write_curve_state(&tx, state, true).await?;
        }

        for watermark in &batch.watermarks {
            tx.execute(
                "INSERT INTO token_watermarks (token_address, last_scanned_block) VALUES ($1, $2)
                 ON CONFLICT (token_address) DO UPDATE SET
                    last_scanned_block = GREATEST(token_watermarks.last_scanned_block, EXCLUDED.last_scanned_block)",
                &[&address_text(&watermark.token_address), &(watermark.last_scanned_block as i64)],
            )
            .await
            .map_err(|e| query_err("failed_to_upsert_watermark", e))?;
        }

        if let Some(cursor) = &batch.cursor {
            tx.execute(
                "INSERT INTO ingest_cursors (ingester_id, last_processed_block, updated_at) VALUES ($1, $2, $3)
                 ON CONFLICT (ingester_id) DO UPDATE SET
                    last_processed_block = GREATEST(ingest_cursors.last_processed_block, EXCLUDED.last_processed_block),
                    updated_at = EXCLUDED.updated_at",
                &[&cursor.ingester_id, &(cursor.last_processed_block as i64), &(cursor.updated_at as i64)],
            )
            .await
            .map_err(|e| query_err("failed_to_advance_cursor", e))?;
        }

        tx.commit().await.map_err(|e| query_err("failed_to_commit_batch", e))?;

        outcome.states = states.into_values().collect();
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
        let conn = self.get_connection().await?;
        let rows = conn
            .query(
                "SELECT token_address, curve_address, trader_address, direction, base_amount, token_amount, fee,
                        block_number, tx_hash, log_index
                 FROM trade_events WHERE token_address = $1
                 ORDER BY block_number DESC, log_index DESC LIMIT $2",
                &[&address_text(&token), &(limit as i64)],
            )
            .await
            .map_err(|e| query_err("failed_to_list_trades", e))?;
        rows.iter()
            .map(|row| trade_from_row(row).map_err(|e| err_with_loc!(e)))
            .collect()
    }

    async fn get_holder_balance(
        &self,
        token: Address,
        holder: Address,
    ) -> Result<Option<HolderBalance>> {
        let conn = self.get_connection().await?;
        let row = conn
            .query_opt(
                "SELECT token_address, holder_address, balance, updated_at FROM token_holders
                 WHERE token_address = $1 AND holder_address = $2",
                &[&address_text(&token), &address_text(&holder)],
            )
            .await
            .map_err(|e| query_err("failed_to_select_holder", e))?;
        row.map(|row| holder_from_row(&row).map_err(|e| err_with_loc!(e))).transpose()
    }
}
