pub mod batch;
pub mod in_memory;
pub mod migration;
pub mod postgres;
pub mod redis;

use std::sync::Arc;

use alloy_primitives::Address;
use alloy_primitives::B256;
use anyhow::Result;
use async_trait::async_trait;
use postgres::PostgresClient;
use redis::RedisClient;
use tracing::info;
use tracing::instrument;

pub use batch::BatchOutcome;
pub use batch::IngestBatch;

use crate::config::Config;
use crate::model::CurveState;
use crate::model::DeploymentReceipt;
use crate::model::DeploymentRecord;
use crate::model::HolderBalance;
use crate::model::IngestCursor;
use crate::model::ReserveOutcome;
use crate::model::TokenWatermark;
use crate::model::TradeEvent;
use crate::storage::migration::Migrator;
use crate::storage::postgres::make_postgres_client;
use crate::storage::redis::make_redis_client;

/// Persistence of curve state, deployment records, ingested events and the ingest cursor.
///
/// `try_reserve_deployment` is the single cross-process coordination point and must be an
/// atomic compare-and-set. `apply_batch` is all-or-nothing and skips events whose
/// `(transaction_hash, log_index)` was already applied.
#[async_trait]
pub trait CurveStore: Send + Sync {
  async fn get_curve_state(
    &self,
    token: Address,
  ) -> Result<Option<CurveState>>;

  async fn list_active_curves(&self) -> Result<Vec<CurveState>>;

  /// Insert-if-absent. Returns false when a state for the token already exists.
  async fn insert_curve_state(
    &self,
    state: &CurveState,
  ) -> Result<bool>;

  /// Returns false when the token has no curve state.
  async fn deactivate_curve(
    &self,
    token: Address,
    now: u64,
  ) -> Result<bool>;

  async fn get_deployment(
    &self,
    creator: Address,
    token: Address,
  ) -> Result<Option<DeploymentRecord>>;

  /// NOT_STARTED or FAILED becomes DEPLOYING under `reservation_id`. A DEPLOYING claim whose
  /// `updated_at` is older than `stale_before` is taken over the same way; its `tx_hash` stays.
  async fn try_reserve_deployment(
    &self,
    creator: Address,
    token: Address,
    reservation_id: &str,
    now: u64,
    stale_before: u64,
  ) -> Result<ReserveOutcome>;

  async fn record_deployment_tx(
    &self,
    creator: Address,
    token: Address,
    reservation_id: &str,
    tx_hash: B256,
    now: u64,
  ) -> Result<DeploymentRecord>;

  /// DEPLOYING becomes DEPLOYED and the initial curve state is inserted, in one step.
  async fn complete_deployment(
    &self,
    creator: Address,
    token: Address,
    reservation_id: &str,
    receipt: DeploymentReceipt,
    initial_state: &CurveState,
    now: u64,
  ) -> Result<DeploymentRecord>;

  /// `tx_hash`, when given, replaces the recorded one; `None` keeps what is there.
  async fn fail_deployment(
    &self,
    creator: Address,
    token: Address,
    reservation_id: &str,
    tx_hash: Option<B256>,
    error: &str,
    now: u64,
  ) -> Result<DeploymentRecord>;

  async fn get_cursor(
    &self,
    ingester_id: &str,
  ) -> Result<Option<IngestCursor>>;

  async fn get_watermarks(&self) -> Result<Vec<TokenWatermark>>;

  async fn apply_batch(
    &self,
    batch: &IngestBatch,
  ) -> Result<BatchOutcome>;

  /// Most recent first.
  async fn list_trades(
    &self,
    token: Address,
    limit: usize,
  ) -> Result<Vec<TradeEvent>>;

  async fn get_holder_balance(
    &self,
    token: Address,
    holder: Address,
  ) -> Result<Option<HolderBalance>>;
}

#[derive(Clone)]
pub struct StorageEngine {
  pub postgres: Arc<PostgresClient>,
  pub redis:    Arc<RedisClient>,
}

impl StorageEngine {
  pub fn new(
    postgres: Arc<PostgresClient>,
    redis: Arc<RedisClient>,
  ) -> Self {
    Self { postgres, redis }
  }

  pub fn curve_store(&self) -> Arc<dyn CurveStore> { self.postgres.curves.clone() }

  pub async fn run_migrations(&self) -> Result<()> {
    let migrator = Migrator::new(self.postgres.pool.clone());
    migrator.run_migrations().await?;
    Ok(())
  }
}

#[instrument(level = "info", skip(config))]
pub async fn make_storage_engine(
  engine_name: &str,
  config: &Config,
) -> Result<StorageEngine> {
  let postgres = make_postgres_client(engine_name, &config.storage_postgres).await?;
  info!("postgres::created");
  let redis = make_redis_client(engine_name, &config.storage_redis).await?;
  info!("redis::created");

  let storage = StorageEngine::new(postgres, redis);

  storage.run_migrations().await?;
  info!("migrations::completed");

  Ok(storage)
}

/// Postgres only; used by the `migrate` binary before any service starts.
#[instrument(level = "info", skip(config))]
pub async fn run_database_migrations(
  engine_name: &str,
  config: &Config,
) -> Result<()> {
  let postgres = make_postgres_client(engine_name, &config.storage_postgres).await?;
  let migrator = Migrator::new(postgres.pool.clone());
  migrator.run_migrations().await?;
  info!("{}::migrations::completed", engine_name);
  Ok(())
}
