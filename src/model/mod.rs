pub mod cursor;
pub mod curve;
pub mod deployment;
pub mod event;
pub mod holder;
pub mod quote;

pub use cursor::IngestCursor;
pub use cursor::TokenWatermark;
pub use curve::CurveParams;
pub use curve::CurveState;
pub use deployment::DeployRequest;
pub use deployment::DeploymentReceipt;
pub use deployment::DeployResponse;
pub use deployment::DeploymentRecord;
pub use deployment::DeploymentStatus;
pub use deployment::Reservation;
pub use deployment::ReserveOutcome;
pub use event::ChainEvent;
pub use event::EventKey;
pub use event::RewardPayout;
pub use event::TradeDirection;
pub use event::TradeEvent;
pub use event::TransferEvent;
pub use holder::HolderBalance;
pub use quote::PriceQuote;
pub use quote::Quote;
pub use quote::QuoteSource;
