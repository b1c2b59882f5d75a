pub mod curve;
pub mod notify;
pub mod quote;
pub mod shutdown;
