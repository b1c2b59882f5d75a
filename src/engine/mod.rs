pub mod deployer;
pub mod ingester;

pub use deployer::DeployerEngine;
pub use ingester::IngesterEngine;
