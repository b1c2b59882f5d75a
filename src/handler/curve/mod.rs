pub mod deployer;
pub mod registry;

pub use deployer::CurveDeployer;
pub use registry::CurveRegistry;
