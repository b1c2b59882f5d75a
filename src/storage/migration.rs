use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::err_with_loc;
use crate::error::PostgresClientError;
use crate::storage::postgres::PostgresPool;

pub const CURRENT_SCHEMA_VERSION: i64 = 6;

pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    /// Executed in order inside one transaction.
    pub sql: Vec<&'static str>,
}

pub struct Migrator {
    pool: Arc<PostgresPool>,
}

impl Migrator {
    pub fn new(pool: Arc<PostgresPool>) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        self.create_migrations_table().await?;
        let applied = self.applied_versions().await?;

        for migration in migrations() {
            if applied.contains(&migration.version) {
                continue;
            }
            info!("applying_migration::{}_{}", migration.version, migration.name);
            self.apply_migration(&migration).await?;
        }
        Ok(())
    }

    /// True when every known migration has been applied.
    pub async fn check_schema_version(&self) -> Result<bool> {
        self.create_migrations_table().await?;
        let current_version = self.applied_versions().await?.into_iter().max().unwrap_or(0);

        if current_version < CURRENT_SCHEMA_VERSION {
            warn!(
                "schema_version_behind::expected::{}::found::{}::run_migrate",
                CURRENT_SCHEMA_VERSION, current_version
            );
            return Ok(false);
        }
        info!("schema_version_ok::{}", current_version);
        Ok(true)
    }

    async fn create_migrations_table(&self) -> Result<()> {
        let conn = self.pool.get().await.map_err(|e| {
            error!("failed_to_get_client_pool_connection: {}", e);
            err_with_loc!(PostgresClientError::PoolError(e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS migrations (
                version BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TIMESTAMP WITH TIME ZONE NOT NULL
            )",
            &[],
        )
        .await
        .map_err(|e| {
            error!("failed_to_create_migrations_table: {}", e);
            err_with_loc!(PostgresClientError::TransactionError(format!("failed_to_create_migrations_table: {}", e)))
        })?;
        Ok(())
    }

    async fn applied_versions(&self) -> Result<Vec<i64>> {
        let conn = self.pool.get().await.map_err(|e| {
            error!("failed_to_get_client_pool_connection: {}", e);
            err_with_loc!(PostgresClientError::PoolError(e))
        })?;

        let rows = conn
            .query("SELECT version FROM migrations ORDER BY version ASC", &[])
            .await
            .map_err(|e| {
                error!("failed_to_get_applied_migrations: {}", e);
                err_with_loc!(PostgresClientError::QueryError(format!("failed_to_get_applied_migrations: {}", e)))
            })?;
        Ok(rows.iter().map(|row| row.get::<_, i64>(0)).collect())
    }

    async fn apply_migration(
        &self,
        migration: &Migration,
    ) -> Result<()> {
        let mut conn = self.pool.get().await.map_err(|e| {
            error!("failed_to_get_client_pool_connection: {}", e);
            err_with_loc!(PostgresClientError::PoolError(e))
        })?;
        let tx = conn.transaction().await.map_err(|e| {
            error!("failed_to_start_transaction: {}", e);
            err_with_loc!(PostgresClientError::TransactionError(format!("failed_to_start_transaction: {}", e)))
        })?;

        for (i, sql) in migration.sql.iter().enumerate() {
            tx.execute(*sql, &[]).await.map_err(|e| {
                error!("failed_migration_statement::{}::{}_{}::error::{}", i, migration.version, migration.name, e);
                err_with_loc!(PostgresClientError::QueryError(format!(
                    "failed_migration_statement::{}::{}_{}::{}",
                    i, migration.version, migration.name, e
                )))
            })?;
        }

        tx.execute("INSERT INTO migrations (version, name, applied_at) VALUES ($1, $2, $3)", &[
            &migration.version,
            &migration.name,
            &Utc::now(),
        ])
        .await
        .map_err(|e| {
            error!("failed_to_record_migration::{}_{}::error::{}", migration.version, migration.name, e);
            err_with_loc!(PostgresClientError::QueryError(format!("failed_to_record_migration: {}", e)))
        })?;

        tx.commit().await.map_err(|e| {
            error!("failed_to_commit_transaction: {}", e);
            err_with_loc!(PostgresClientError::TransactionError(format!("failed_to_commit_transaction: {}", e)))
        })?;

        info!("applied_migration::{}_{}", migration.version, migration.name);
        Ok(())
    }
}

// Amounts are uint256 and stored as decimal TEXT; addresses and hashes as lowercase 0x-hex TEXT.
pub fn migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "create_curve_states_table",
            sql: vec![
                r#"
                CREATE TABLE IF NOT EXISTS curve_states (
                    token_address TEXT PRIMARY KEY,
                    creator_address TEXT NOT NULL,
                    platform_address TEXT NOT NULL,
                    curve_address TEXT NOT NULL UNIQUE,
                    virtual_base_reserve TEXT NOT NULL,
                    virtual_token_reserve TEXT NOT NULL,
                    curve_supply_cap TEXT NOT NULL,
                    total_supply TEXT NOT NULL,
                    fee_bps INTEGER NOT NULL,
                    circulating_supply TEXT NOT NULL DEFAULT '0',
                    reserve_balance TEXT NOT NULL DEFAULT '0',
                    current_price TEXT NOT NULL DEFAULT '0',
                    market_cap TEXT NOT NULL DEFAULT '0',
                    all_time_high_price TEXT NOT NULL DEFAULT '0',
                    total_volume_base TEXT NOT NULL DEFAULT '0',
                    total_rewards_paid TEXT NOT NULL DEFAULT '0',
                    trade_count BIGINT NOT NULL DEFAULT 0,
                    holder_count BIGINT NOT NULL DEFAULT 0,
                    deployment_block BIGINT NOT NULL,
                    last_trade_block BIGINT DEFAULT NULL,
                    is_active BOOLEAN NOT NULL DEFAULT TRUE,
                    created_at BIGINT NOT NULL,
                    updated_at BIGINT NOT NULL
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_curve_states_active ON curve_states (is_active, deployment_block)",
            ],
        },
        Migration {
            version: 2,
            name: "create_deployment_records_table",
            sql: vec![
                r#"
                CREATE TABLE IF NOT EXISTS deployment_records (
                    creator_address TEXT NOT NULL,
                    token_address TEXT NOT NULL,
                    status TEXT NOT NULL CHECK (status IN ('NOT_STARTED', 'DEPLOYING', 'DEPLOYED', 'FAILED')),
                    reservation_id TEXT DEFAULT NULL,
                    curve_address TEXT DEFAULT NULL,
                    tx_hash TEXT DEFAULT NULL,
                    deployment_block BIGINT DEFAULT NULL,
                    attempts INTEGER NOT NULL DEFAULT 0,
                    last_error TEXT DEFAULT NULL,
                    created_at BIGINT NOT NULL,
                    updated_at BIGINT NOT NULL,
                    PRIMARY KEY (creator_address, token_address)
                )
                "#,
            ],
        },
        Migration {
            version: 3,
            name: "create_trade_events_table",
            sql: vec![
                r#"
                CREATE TABLE IF NOT EXISTS trade_events (
                    tx_hash TEXT NOT NULL,
                    log_index BIGINT NOT NULL,
                    token_address TEXT NOT NULL,
                    curve_address TEXT NOT NULL,
                    trader_address TEXT NOT NULL,
                    direction TEXT NOT NULL CHECK (direction IN ('buy', 'sell')),
                    base_amount TEXT NOT NULL,
                    token_amount TEXT NOT NULL,
                    fee TEXT NOT NULL,
                    block_number BIGINT NOT NULL,
                    created_at BIGINT NOT NULL,
                    PRIMARY KEY (tx_hash, log_index)
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_trade_events_token_block ON trade_events (token_address, block_number DESC, log_index DESC)",
            ],
        },
        Migration {
            version: 4,
            name: "create_transfer_and_reward_tables",
            sql: vec![
                r#"
                CREATE TABLE IF NOT EXISTS transfer_events (
                    tx_hash TEXT NOT NULL,
                    log_index BIGINT NOT NULL,
                    token_address TEXT NOT NULL,
                    from_address TEXT NOT NULL,
                    to_address TEXT NOT NULL,
                    value TEXT NOT NULL,
                    block_number BIGINT NOT NULL,
                    created_at BIGINT NOT NULL,
                    PRIMARY KEY (tx_hash, log_index)
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS reward_payouts (
                    tx_hash TEXT NOT NULL,
                    log_index BIGINT NOT NULL,
                    token_address TEXT NOT NULL,
                    recipient_address TEXT NOT NULL,
                    amount TEXT NOT NULL,
                    block_number BIGINT NOT NULL,
                    created_at BIGINT NOT NULL,
                    PRIMARY KEY (tx_hash, log_index)
                )
                "#,
            ],
        },
        Migration {
            version: 5,
            name: "create_token_holders_table",
            sql: vec![
                r#"
                CREATE TABLE IF NOT EXISTS token_holders (
                    token_address TEXT NOT NULL,
                    holder_address TEXT NOT NULL,
                    balance TEXT NOT NULL,
                    updated_at BIGINT NOT NULL,
                    PRIMARY KEY (token_address, holder_address)
                )
                "#,
            ],
        },
        Migration {
            version: 6,
            name: "create_ingest_cursor_tables",
            sql: vec![
                r#"
                CREATE TABLE IF NOT EXISTS ingest_cursors (
                    ingester_id TEXT PRIMARY KEY,
                    last_processed_block BIGINT NOT NULL,
                    updated_at BIGINT NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS token_watermarks (
                    token_address TEXT PRIMARY KEY,
                    last_scanned_block BIGINT NOT NULL
                )
                "#,
            ],
        },
    ]
}
