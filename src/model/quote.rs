use alloy_primitives::Address;
use alloy_primitives::Bytes;
use alloy_primitives::U256;
use serde::Deserialize;
use serde::Serialize;

use super::event::TradeDirection;
use crate::utils::serde_u256;

/// Where the numbers of a response came from. Never mixed inside one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    Live,
    Cached,
    Default,
}

impl QuoteSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteSource::Live => "live",
            QuoteSource::Cached => "cached",
            QuoteSource::Default => "default",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub token_address: Address,
    pub direction: TradeDirection,
    #[serde(with = "serde_u256")]
    pub amount_in: U256,
    #[serde(with = "serde_u256")]
    pub amount_out: U256,
    #[serde(with = "serde_u256")]
    pub fee: U256,
    #[serde(with = "serde_u256")]
    pub price_before: U256,
    #[serde(with = "serde_u256")]
    pub price_after: U256,
    /// `amount_out` reduced by the configured slippage; encoded into `calldata`.
    #[serde(with = "serde_u256")]
    pub min_amount_out: U256,
    pub source: QuoteSource,
    /// Seconds since the last successful ingestion, for cached answers.
    pub staleness_secs: Option<u64>,
    pub curve_address: Option<Address>,
    pub calldata: Option<Bytes>,
    /// Native value to attach to the transaction (buys only).
    #[serde(with = "serde_u256")]
    pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub token_address: Address,
    #[serde(with = "serde_u256")]
    pub price: U256,
    #[serde(with = "serde_u256")]
    pub market_cap: U256,
    #[serde(with = "serde_u256")]
    pub circulating_supply: U256,
    #[serde(with = "serde_u256")]
    pub reserve_balance: U256,
    pub progress_bps: u16,
    pub source: QuoteSource,
    pub staleness_secs: Option<u64>,
}
