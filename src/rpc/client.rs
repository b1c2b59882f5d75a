use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use alloy_primitives::Address;
use alloy_primitives::Bytes;
use alloy_primitives::B256;
use alloy_primitives::U256;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_retry::strategy::jitter;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;
use tracing::debug;
use tracing::warn;

use super::types::quantity;
use super::types::ChainLog;
use super::types::TransactionReceipt;
use super::ChainClient;
use crate::config::RpcConfig;
use crate::config::RpcProviderConfig;
use crate::error::RpcError;

#[derive(Debug)]
struct RateLimiterState {
    last_reset: Instant,
    request_count: usize,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC over HTTP, rotating round-robin over the configured providers.
pub struct JsonRpcChainClient {
    http_client: Client,
    config: RpcConfig,
    next_provider: AtomicUsize,
    request_id: AtomicU64,
    rate_limiters: RwLock<HashMap<String, RateLimiterState>>,
}

impl JsonRpcChainClient {
    pub fn new(config: RpcConfig) -> Result<Self, RpcError> {
        if config.providers.is_empty() {
            return Err(RpcError::NoProviders);
        }
        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(Self {
            http_client,
            config,
            next_provider: AtomicUsize::new(0),
            request_id: AtomicU64::new(1),
            rate_limiters: RwLock::new(HashMap::new()),
        })
    }

    async fn next_provider(&self) -> &RpcProviderConfig {
        let providers = &self.config.providers;
        let mut attempts = 0;
        loop {
            let index = self.next_provider.fetch_add(1, Ordering::Relaxed) % providers.len();
            let provider = &providers[index];

            {
                let mut rate_limiters = self.rate_limiters.write().await;
                let state = rate_limiters
                    .entry(provider.name.clone())
                    .or_insert_with(|| RateLimiterState {
                        last_reset: Instant::now(),
                        request_count: 0,
                    });
                let now = Instant::now();
                if now.duration_since(state.last_reset) >= Duration::from_secs(1) {
                    state.last_reset = now;
                    state.request_count = 0;
                }
                // zero means unlimited
                if provider.rate_limit == 0 || state.request_count < provider.rate_limit {
                    state.request_count += 1;
                    return provider;
                }
            }

            attempts += 1;
            if attempts >= providers.len() {
                #[cfg(feature = "deep-trace")]
                debug!("all_providers_rate_limited::waiting");
                tokio::time::sleep(Duration::from_millis(100)).await;
                attempts = 0;
            }
        }
    }

    async fn request_once<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<Option<T>, RpcError> {
        let provider = self.next_provider().await;
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        #[cfg(feature = "deep-trace")]
        debug!("rpc_request::provider::{}::method::{}", provider.name, method);

        let timeout = self.config.request_timeout();
        let send = self.http_client.post(provider.get_http_url()).json(&body).send();
        let response = tokio::time::timeout(timeout, send)
            .await
            .map_err(|_| RpcError::Timeout(self.config.request_timeout_ms))?
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout(self.config.request_timeout_ms)
                } else {
                    RpcError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RpcError::Transport(format!("http {} from {}: {}", status, provider.name, text)));
        }

        let envelope: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| RpcError::InvalidResponse(format!("{}: {}", method, e)))?;
        if let Some(error) = envelope.error {
            return Err(RpcError::Node {
                code: error.code,
                message: error.message,
            });
        }
        Ok(envelope.result)
    }

    /// Retried on transport, timeout and rate-limit failures. `None` for a `null` result.
    async fn request_optional<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<Option<T>, RpcError> {
        let half_base = (self.config.base_retry_delay_ms / 2).max(1);
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(half_base)
            .max_delay(Duration::from_millis(self.config.max_retry_delay_ms))
            .map(jitter)
            .take(self.config.max_retries);

        RetryIf::spawn(
            strategy,
            || self.request_once::<T>(method, params.clone()),
            |e: &RpcError| {
                let retry = e.is_retryable();
                if retry {
                    warn!("rpc_request_retry::method::{}::error::{}", method, e);
                }
                retry
            },
        )
        .await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, RpcError> {
        self.request_optional(method, params)
            .await?
            .ok_or_else(|| RpcError::InvalidResponse(format!("{}: missing result", method)))
    }
}

#[async_trait]
impl ChainClient for JsonRpcChainClient {
    async fn get_block_number(&self) -> Result<u64, RpcError> {
        let raw: String = self.request("eth_blockNumber", json!([])).await?;
        quantity::parse(&raw).map_err(RpcError::InvalidResponse)
    }

    async fn get_logs(
        &self,
        addresses: Vec<Address>,
        topics0: Vec<B256>,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<ChainLog>, RpcError> {
        if addresses.is_empty() || from_block > to_block {
            return Ok(Vec::new());
        }
        let filter = json!({
            "address": addresses,
            "topics": [topics0],
            "fromBlock": quantity::encode(from_block),
            "toBlock": quantity::encode(to_block),
        });
        self.request("eth_getLogs", json!([filter])).await
    }

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        calldata: Bytes,
        value: U256,
    ) -> Result<B256, RpcError> {
        let tx = json!({
            "from": from,
            "to": to,
            "data": calldata,
            "value": format!("{:#x}", value),
        });
        // Not retried: a timed out submission may still have landed, the deployer reconciles instead.
        self.request_once("eth_sendTransaction", json!([tx]))
            .await?
            .ok_or_else(|| RpcError::InvalidResponse("eth_sendTransaction: missing result".to_string()))
    }

    async fn get_transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        self.request_optional("eth_getTransactionReceipt", json!([tx_hash])).await
    }

    async fn call(
        &self,
        to: Address,
        calldata: Bytes,
    ) -> Result<Bytes, RpcError> {
        let call = json!({
            "to": to,
            "data": calldata,
        });
        self.request("eth_call", json!([call, "latest"])).await
    }
}
