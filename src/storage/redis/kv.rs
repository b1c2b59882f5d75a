use bb8::PooledConnection;
use bb8_redis::redis;
use bb8_redis::RedisConnectionManager;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use tracing::error;

use crate::err_with_loc;
use crate::error::RedisClientError;
use crate::storage::redis::RedisPool;
use crate::Result;

/// JSON values under plain string keys (ingester health).
#[derive(Debug, Clone)]
pub struct CurveKv {
  pub pool: RedisPool,
}

impl CurveKv {
  pub fn new(pool: RedisPool) -> Self { Self { pool } }

  pub async fn get_connection(&self) -> Result<PooledConnection<'_, RedisConnectionManager>> {
    self.pool.get().await.map_err(|e| {
      error!("failed_to_get_redis_connection: {}", e);
      err_with_loc!(RedisClientError::GetConnectionError(e))
    })
  }

  pub async fn get<T: DeserializeOwned + Send>(
    &self,
    key: &str,
  ) -> Result<Option<T>> {
    let mut conn = self.get_connection().await?;

    let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut *conn).await.map_err(|e| {
      error!("redis_get_failed::{}::error::{}", key, e);
      err_with_loc!(RedisClientError::RedisError(e))
    })?;

    match value {
      Some(json) => {
        serde_json::from_str::<T>(&json)
          .map_err(|e| {
            error!("redis_deserialize_failed::{}::error::{}", key, e);
            err_with_loc!(RedisClientError::DeserializeError(e))
          })
          .map(Some)
      },
      None => Ok(None),
    }
  }

  /// `ttl_secs` of `None` keeps the key until overwritten.
  pub async fn set<T: Serialize + Send + Sync>(
    &self,
    key: &str,
    value: &T,
    ttl_secs: Option<u64>,
  ) -> Result<()> {
    let mut conn = self.get_connection().await?;
    let json = serde_json::to_string(value).map_err(|e| {
      error!("serialize_failed::{}::error::{}", key, e);
      err_with_loc!(RedisClientError::SerializeError(e))
    })?;

    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(json);
    if let Some(ttl) = ttl_secs {
      cmd.arg("EX").arg(ttl);
    }
    let _: () = cmd.query_async(&mut *conn).await.map_err(|e| {
      error!("redis_set_failed::{}::error::{}", key, e);
      err_with_loc!(RedisClientError::RedisError(e))
    })?;

    debug!("redis_set_done::{}", key);
    Ok(())
  }
}
