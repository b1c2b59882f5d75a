use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcProviderConfig {
    pub name: String,
    pub url: String,
    pub api_key: Option<String>,
    pub rate_limit: usize, // requests per second
}

impl RpcProviderConfig {
    pub fn get_http_url(&self) -> String {
        match &self.api_key {
            Some(api_key) => format!("{}/{}", self.url.trim_end_matches('/'), api_key),
            None => self.url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default)]
    pub providers: Vec<RpcProviderConfig>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_base_retry_delay_ms")]
    pub base_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_max_retries() -> usize {
    3
}

fn default_base_retry_delay_ms() -> u64 {
    250
}

fn default_max_retry_delay_ms() -> u64 {
    5_000
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            base_retry_delay_ms: default_base_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
        }
    }
}

impl RpcConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
