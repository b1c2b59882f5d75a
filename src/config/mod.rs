pub mod curve;
pub mod deployer;
pub mod ingester;
pub mod log;
pub mod quote;
pub mod rpc;
pub mod storage;

use std::path::Path;

use alloy_primitives::Address;
use serde::Deserialize;
use serde::Serialize;
use toml;
use tracing::warn;

pub use curve::CurveConfig;
pub use deployer::DeployerConfig;
pub use ingester::IngesterConfig;
pub use log::LoggingConfig;
pub use quote::QuoteConfig;
pub use rpc::RpcConfig;
pub use rpc::RpcProviderConfig;
pub use storage::StoragePostgresConfig;
pub use storage::StorageRedisConfig;

use crate::err_with_loc;
use crate::error::ConfigError;

pub const DEPLOYER_ADDRESS_ENV: &str = "CURVEKEEPER_DEPLOYER_ADDRESS";
pub const FACTORY_ADDRESS_ENV: &str = "CURVEKEEPER_FACTORY_ADDRESS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage_postgres: StoragePostgresConfig,
    pub storage_redis: StorageRedisConfig,
    pub rpc: RpcConfig,
    #[serde(default)]
    pub curve: CurveConfig,
    #[serde(default)]
    pub deployer: DeployerConfig,
    #[serde(default)]
    pub ingester: IngesterConfig,
    #[serde(default)]
    pub quote: QuoteConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

pub fn load_config(path: impl AsRef<Path>) -> crate::Result<Config> {
    let path = path.as_ref();
    let config_str = std::fs::read_to_string(path)
        .map_err(|e| err_with_loc!(ConfigError::OpenFileError(format!("{}: {}", path.display(), e))))?;
    parse_config(&config_str)
}

pub fn parse_config(config_str: &str) -> crate::Result<Config> {
    let mut config: Config =
        toml::from_str(config_str).map_err(|e| err_with_loc!(ConfigError::ParseError(e.to_string())))?;
    apply_env_overrides(&mut config)?;
    config.curve.validate().map_err(|e| err_with_loc!(e))?;
    Ok(config)
}

// Secrets-adjacent addresses may come from the environment (or a .env file loaded by the binaries).
fn apply_env_overrides(config: &mut Config) -> crate::Result<()> {
    if let Some(address) = address_from_env(DEPLOYER_ADDRESS_ENV)? {
        config.deployer.deployer_address = Some(address);
    }
    if let Some(address) = address_from_env(FACTORY_ADDRESS_ENV)? {
        config.deployer.factory_address = Some(address);
    }
    Ok(())
}

fn address_from_env(name: &'static str) -> crate::Result<Option<Address>> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => {
            let address = raw.trim().parse::<Address>().map_err(|e| {
                warn!("invalid_address_in_env::{}::error::{}", name, e);
                err_with_loc!(ConfigError::InvalidSetting {
                    name,
                    reason: e.to_string(),
                })
            })?;
            Ok(Some(address))
        },
        _ => Ok(None),
    }
}
