use alloy_primitives::U256;
use thiserror::Error;

/// Outcomes of the pricing functions that a caller is expected to branch on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurveError {
    #[error("insufficient liquidity: requested {requested} tokens, circulating supply is {available}")]
    InsufficientLiquidity { requested: U256, available: U256 },

    #[error("insufficient reserve: sell needs {required} base units, reserve holds {available}")]
    InsufficientReserve { required: U256, available: U256 },

    #[error("curve exhausted: {remaining} tokens left before the curve cap")]
    CurveExhausted { remaining: U256 },

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("amount too small to produce any output after fees and rounding")]
    DustAmount,

    #[error("invalid curve parameters: {0}")]
    InvalidParams(&'static str),

    #[error("arithmetic overflow in curve math")]
    Overflow,
}
