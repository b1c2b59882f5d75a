pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod handler;
pub mod math;
pub mod model;
pub mod pipeline;
pub mod rpc;
pub mod storage;
pub mod tracing;
pub mod utils;

pub use engine::DeployerEngine;
pub use engine::IngesterEngine;


pub use error::Result;
