pub mod kv;
pub mod queue;

use std::sync::Arc;

use bb8::Pool;
use bb8_redis::redis;
use bb8_redis::RedisConnectionManager;
use tracing::error;
use tracing::info;
use tracing::instrument;

use crate::config::StorageRedisConfig;
use crate::err_with_loc;
use crate::error::RedisClientError;
use crate::storage::redis::kv::CurveKv;
use crate::storage::redis::queue::CurveQueue;
use crate::Result;

pub type RedisPool = Arc<Pool<RedisConnectionManager>>;

pub struct RedisClient {
  pub pool:  RedisPool,
  pub kv:    Arc<CurveKv>,
  pub queue: Arc<CurveQueue>,
}

#[instrument(level = "debug", skip(config))]
pub async fn make_redis_client(
  engine_name: &str,
  config: &StorageRedisConfig,
) -> Result<Arc<RedisClient>> {
  let redis_url = config.url();
  let manager = RedisConnectionManager::new(redis_url.as_str()).map_err(|e| {
    error!("failed_to_create_redis_manager: {}", e);
    err_with_loc!(RedisClientError::CreateConnectionManagerError(e))
  })?;
  let pool = Pool::builder().max_size(config.pool_size).build(manager).await.map_err(|e| {
    error!("failed_to_build_redis_pool: {}", e);
    err_with_loc!(RedisClientError::CreateConnectionManagerError(e))
  })?;
  let pool: RedisPool = Arc::new(pool);

  // pub/sub needs a dedicated connection outside the pool
  let pubsub_client = redis::Client::open(redis_url.as_str()).map_err(|e| {
    error!("failed_to_open_redis_client: {}", e);
    err_with_loc!(RedisClientError::CreateConnectionManagerError(e))
  })?;

  info!("{}::redis_client::connection_established: {}", engine_name, redis_url);
  Ok(Arc::new(RedisClient {
    kv: Arc::new(CurveKv::new(pool.clone())),
    queue: Arc::new(CurveQueue::new(pool.clone(), pubsub_client)),
    pool,
  }))
}
