//! Row <-> model conversion. Addresses and hashes are stored as lowercase 0x-hex text,
//! uint256 amounts as decimal text.

use std::str::FromStr;

use alloy_primitives::Address;
use alloy_primitives::B256;
use alloy_primitives::U256;
use tokio_postgres::Row;

use crate::error::PostgresClientError;
use crate::model::CurveParams;
use crate::model::CurveState;
use crate::model::DeploymentRecord;
use crate::model::DeploymentStatus;
use crate::model::HolderBalance;
use crate::model::IngestCursor;
use crate::model::TradeDirection;
use crate::model::TradeEvent;
use crate::utils::serde_u256::parse_u256;

pub fn address_text(address: &Address) -> String {
    format!("{:#x}", address)
}

pub fn hash_text(hash: &B256) -> String {
    format!("{:#x}", hash)
}

fn corrupt(
    table: &'static str,
    reason: String,
) -> PostgresClientError {
    PostgresClientError::CorruptRow { table, reason }
}

fn address_col(
    row: &Row,
    table: &'static str,
    column: &str,
) -> Result<Address, PostgresClientError> {
    let raw: String = row.try_get(column).map_err(|e| corrupt(table, e.to_string()))?;
    Address::from_str(&raw).map_err(|e| corrupt(table, format!("{}: {}", column, e)))
}

fn opt_address_col(
    row: &Row,
    table: &'static str,
    column: &str,
) -> Result<Option<Address>, PostgresClientError> {
    let raw: Option<String> = row.try_get(column).map_err(|e| corrupt(table, e.to_string()))?;
    raw.map(|raw| Address::from_str(&raw).map_err(|e| corrupt(table, format!("{}: {}", column, e))))
        .transpose()
}

fn opt_hash_col(
    row: &Row,
    table: &'static str,
    column: &str,
) -> Result<Option<B256>, PostgresClientError> {
    let raw: Option<String> = row.try_get(column).map_err(|e| corrupt(table, e.to_string()))?;
    raw.map(|raw| B256::from_str(&raw).map_err(|e| corrupt(table, format!("{}: {}", column, e))))
        .transpose()
}

fn u256_col(
    row: &Row,
    table: &'static str,
    column: &str,
) -> Result<U256, PostgresClientError> {
    let raw: String = row.try_get(column).map_err(|e| corrupt(table, e.to_string()))?;
    parse_u256(&raw).map_err(|e| corrupt(table, format!("{}: {}", column, e)))
}

fn i64_col(
    row: &Row,
    table: &'static str,
    column: &str,
) -> Result<i64, PostgresClientError> {
    row.try_get(column).map_err(|e| corrupt(table, e.to_string()))
}

pub fn curve_state_from_row(row: &Row) -> Result<CurveState, PostgresClientError> {
    const T: &str = "curve_states";
    let fee_bps: i32 = row.try_get("fee_bps").map_err(|e| corrupt(T, e.to_string()))?;
    let last_trade_block: Option<i64> = row.try_get("last_trade_block").map_err(|e| corrupt(T, e.to_string()))?;
    Ok(CurveState {
        token_address: address_col(row, T, "token_address")?,
        creator_address: address_col(row, T, "creator_address")?,
        platform_address: address_col(row, T, "platform_address")?,
        curve_address: address_col(row, T, "curve_address")?,
        params: CurveParams {
            virtual_base_reserve: u256_col(row, T, "virtual_base_reserve")?,
            virtual_token_reserve: u256_col(row, T, "virtual_token_reserve")?,
            curve_supply_cap: u256_col(row, T, "curve_supply_cap")?,
            total_supply: u256_col(row, T, "total_supply")?,
            fee_bps: u16::try_from(fee_bps).map_err(|e| corrupt(T, format!("fee_bps: {}", e)))?,
        },
        circulating_supply: u256_col(row, T, "circulating_supply")?,
        reserve_balance: u256_col(row, T, "reserve_balance")?,
        current_price: u256_col(row, T, "current_price")?,
        market_cap: u256_col(row, T, "market_cap")?,
        all_time_high_price: u256_col(row, T, "all_time_high_price")?,
        total_volume_base: u256_col(row, T, "total_volume_base")?,
        total_rewards_paid: u256_col(row, T, "total_rewards_paid")?,
        trade_count: i64_col(row, T, "trade_count")? as u64,
        holder_count: i64_col(row, T, "holder_count")? as u64,
        deployment_block: i64_col(row, T, "deployment_block")? as u64,
        last_trade_block: last_trade_block.map(|b| b as u64),
        is_active: row.try_get("is_active").map_err(|e| corrupt(T, e.to_string()))?,
        created_at: i64_col(row, T, "created_at")? as u64,
        updated_at: i64_col(row, T, "updated_at")? as u64,
    })
}

pub fn deployment_from_row(row: &Row) -> Result<DeploymentRecord, PostgresClientError> {
    const T: &str = "deployment_records";
    let status: String = row.try_get("status").map_err(|e| corrupt(T, e.to_string()))?;
    let deployment_block: Option<i64> = row.try_get("deployment_block").map_err(|e| corrupt(T, e.to_string()))?;
    let attempts: i32 = row.try_get("attempts").map_err(|e| corrupt(T, e.to_string()))?;
    Ok(DeploymentRecord {
        creator_address: address_col(row, T, "creator_address")?,
        token_address: address_col(row, T, "token_address")?,
        status: DeploymentStatus::parse(&status).ok_or_else(|| corrupt(T, format!("unknown status {}", status)))?,
        reservation_id: row.try_get("reservation_id").map_err(|e| corrupt(T, e.to_string()))?,
        curve_address: opt_address_col(row, T, "curve_address")?,
        tx_hash: opt_hash_col(row, T, "tx_hash")?,
        deployment_block: deployment_block.map(|b| b as u64),
        attempts: attempts.max(0) as u32,
        last_error: row.try_get("last_error").map_err(|e| corrupt(T, e.to_string()))?,
        created_at: i64_col(row, T, "created_at")? as u64,
        updated_at: i64_col(row, T, "updated_at")? as u64,
    })
}

pub fn cursor_from_row(row: &Row) -> Result<IngestCursor, PostgresClientError> {
    const T: &str = "ingest_cursors";
    Ok(IngestCursor {
        ingester_id: row.try_get("ingester_id").map_err(|e| corrupt(T, e.to_string()))?,
        last_processed_block: i64_col(row, T, "last_processed_block")? as u64,
        updated_at: i64_col(row, T, "updated_at")? as u64,
    })
}

pub fn trade_from_row(row: &Row) -> Result<TradeEvent, PostgresClientError> {
    const T: &str = "trade_events";
    let direction: String = row.try_get("direction").map_err(|e| corrupt(T, e.to_string()))?;
    let direction = match direction.as_str() {
        "buy" => TradeDirection::Buy,
        "sell" => TradeDirection::Sell,
        other => return Err(corrupt(T, format!("unknown direction {}", other))),
    };
    let tx_hash: String = row.try_get("tx_hash").map_err(|e| corrupt(T, e.to_string()))?;
    Ok(TradeEvent {
        token_address: address_col(row, T, "token_address")?,
        curve_address: address_col(row, T, "curve_address")?,
        trader_address: address_col(row, T, "trader_address")?,
        direction,
        base_amount: u256_col(row, T, "base_amount")?,
        token_amount: u256_col(row, T, "token_amount")?,
        fee: u256_col(row, T, "fee")?,
        block_number: i64_col(row, T, "block_number")? as u64,
        transaction_hash: B256::from_str(&tx_hash).map_err(|e| corrupt(T, format!("tx_hash: {}", e)))?,
        log_index: i64_col(row, T, "log_index")? as u64,
    })
}

pub fn holder_from_row(row: &Row) -> Result<HolderBalance, PostgresClientError> {
    const T: &str = "token_holders";
    Ok(HolderBalance {
        token_address: address_col(row, T, "token_address")?,
        holder_address: address_col(row, T, "holder_address")?,
        balance: u256_col(row, T, "balance")?,
        updated_at: i64_col(row, T, "updated_at")? as u64,
    })
}
