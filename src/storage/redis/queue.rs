use bb8::PooledConnection;
use bb8_redis::redis;
use bb8_redis::redis::aio::PubSub;
use bb8_redis::RedisConnectionManager;
use serde::Serialize;
use tracing::debug;
use tracing::error;

use crate::err_with_loc;
use crate::error::RedisClientError;
use crate::storage::redis::RedisPool;
use crate::Result;

/// Redis pub/sub for trade notifications and deployment requests/results.
#[derive(Debug, Clone)]
pub struct CurveQueue {
  pub pool: RedisPool,
  client:   redis::Client,
}

impl CurveQueue {
  pub fn new(
    pool: RedisPool,
    client: redis::Client,
  ) -> Self {
    Self { pool, client }
  }

  async fn get_connection(&self) -> Result<PooledConnection<'_, RedisConnectionManager>> {
    self.pool.get().await.map_err(|e| {
      error!("failed_to_get_redis_connection: {}", e);
      err_with_loc!(RedisClientError::GetConnectionError(e))
    })
  }

  pub async fn publish<T: Serialize + Send + Sync>(
    &self,
    channel: &str,
    value: &T,
  ) -> Result<()> {
    let mut conn = self.get_connection().await?;
    let payload = serde_json::to_string(value).map_err(|e| err_with_loc!(RedisClientError::SerializeError(e)))?;

    let _: () = redis::cmd("PUBLISH")
      .arg(channel)
      .arg(payload)
      .query_async(&mut *conn)
      .await
      .map_err(|e| {
        error!("redis_publish_failed::{}::error::{}", channel, e);
        err_with_loc!(RedisClientError::RedisError(e))
      })?;

    debug!("redis_publish_done::{}", channel);
    Ok(())
  }

  /// A fresh pub/sub connection subscribed to `channel`; read it with `on_message()`.
  pub async fn subscribe(
    &self,
    channel: &str,
  ) -> Result<PubSub> {
    let mut pubsub = self.client.get_async_pubsub().await.map_err(|e| {
      error!("failed_to_open_pubsub::{}::error::{}", channel, e);
      err_with_loc!(RedisClientError::SubscribeError(format!("failed_to_open_pubsub::{}", e)))
    })?;
    pubsub.subscribe(channel).await.map_err(|e| {
      error!("failed_to_subscribe::{}::error::{}", channel, e);
      err_with_loc!(RedisClientError::SubscribeError(format!("failed_to_subscribe::{}::{}", channel, e)))
    })?;
    Ok(pubsub)
  }
}
