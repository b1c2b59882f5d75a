pub mod config;
pub mod curve;
pub mod deployer;
pub mod ingester;
pub mod postgres;
pub mod quote;
pub mod redis;
pub mod registry;
pub mod rpc;

pub use anyhow::anyhow;
pub use anyhow::Context;
pub use anyhow::Error;
pub use anyhow::Result;
pub use config::ConfigError;
pub use curve::CurveError;
pub use deployer::DeployError;
pub use ingester::IngestError;
pub use postgres::PostgresClientError;
pub use quote::QuoteError;
pub use redis::RedisClientError;
pub use registry::RegistryError;
pub use rpc::RpcError;

// For consistent error handling with location info
#[macro_export]
macro_rules! err_with_loc {
    ($err:expr) => {
        anyhow::anyhow!($err).context(format!("at {}:{}", file!(), line!()))
    };
}
