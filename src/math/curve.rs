//! Virtual constant-product bonding curve.
//!
//! With virtual reserves `V0` (base) and `T0` (token), `k = V0 * T0`. At circulating
//! supply `s` the token side is `y = T0 - s` and the base side `x = k / y`. The marginal
//! price is `k / y^2`, quoted in base units per whole token (`WAD` token units).
//!
//! All arithmetic is integer. Amounts paid out round down, amounts charged round up,
//! so a buy followed by selling the bought tokens never returns more than was paid.
//!
//! Market cap uses the fixed `total_supply` (fully diluted), not circulating supply.

use alloy_primitives::U256;

use crate::constants::BPS_DENOMINATOR;
use crate::constants::WAD;
use crate::error::CurveError;
use crate::model::curve::CurveParams;
use crate::model::curve::CurveState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuyQuote {
    pub tokens_out: U256,
    pub fee: U256,
    /// Base amount that lands in the reserve.
    pub net_base_in: U256,
    pub price_after: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SellQuote {
    /// Paid to the seller after the fee.
    pub base_out: U256,
    pub fee: U256,
    /// Leaves the reserve.
    pub gross_base_out: U256,
    pub price_after: U256,
}

fn wad() -> U256 {
    U256::from(WAD)
}

fn bps_denominator() -> U256 {
    U256::from(BPS_DENOMINATOR)
}

fn mul_div(
    a: U256,
    b: U256,
    d: U256,
) -> Result<U256, CurveError> {
    if d.is_zero() {
        return Err(CurveError::Overflow);
    }
    a.checked_mul(b).map(|p| p / d).ok_or(CurveError::Overflow)
}

fn div_ceil(
    a: U256,
    d: U256,
) -> Result<U256, CurveError> {
    if d.is_zero() {
        return Err(CurveError::Overflow);
    }
    let q = a / d;
    if q * d == a { Ok(q) } else { Ok(q + U256::from(1u8)) }
}

fn invariant(params: &CurveParams) -> Result<U256, CurveError> {
    params
        .virtual_base_reserve
        .checked_mul(params.virtual_token_reserve)
        .ok_or(CurveError::Overflow)
}

/// Token-side virtual reserve at `supply`. Positive for every supply below `T0`.
fn token_reserve(
    params: &CurveParams,
    supply: U256,
) -> Result<U256, CurveError> {
    match params.virtual_token_reserve.checked_sub(supply) {
        Some(y) if !y.is_zero() => Ok(y),
        _ => Err(CurveError::InvalidParams("supply at or beyond the virtual token reserve")),
    }
}

fn fee_on(
    amount: U256,
    fee_bps: u16,
) -> Result<U256, CurveError> {
    let charged = amount.checked_mul(U256::from(fee_bps)).ok_or(CurveError::Overflow)?;
    div_ceil(charged, bps_denominator())
}

fn price_at_supply(
    params: &CurveParams,
    supply: U256,
) -> Result<U256, CurveError> {
    let k = invariant(params)?;
    let y = token_reserve(params, supply)?;
    let y_squared = y.checked_mul(y).ok_or(CurveError::Overflow)?;
    mul_div(k, wad(), y_squared)
}

/// Marginal price in base units per whole token. At zero supply this is `V0 / T0`.
pub fn price_at(state: &CurveState) -> Result<U256, CurveError> {
    price_at_supply(&state.params, state.circulating_supply)
}

pub fn market_cap(state: &CurveState) -> Result<U256, CurveError> {
    mul_div(price_at(state)?, state.params.total_supply, wad())
}

/// Share of the curve cap already sold, in basis points.
pub fn progress_bps(state: &CurveState) -> u16 {
    let cap = state.params.curve_supply_cap;
    if cap.is_zero() {
        return BPS_DENOMINATOR;
    }
    let supply = state.circulating_supply.min(cap);
    let progress = supply * bps_denominator() / cap;
    progress.to::<u16>()
}

pub fn quote_buy(
    state: &CurveState,
    base_amount_in: U256,
) -> Result<BuyQuote, CurveError> {
    let params = &state.params;
    if base_amount_in.is_zero() {
        return Err(CurveError::ZeroAmount);
    }
    let supply = state.circulating_supply;
    let remaining = params.curve_supply_cap.saturating_sub(supply);
    if remaining.is_zero() {
        return Err(CurveError::CurveExhausted { remaining });
    }

    let fee = fee_on(base_amount_in, params.fee_bps)?;
    let net_base_in = match base_amount_in.checked_sub(fee) {
        Some(net) if !net.is_zero() => net,
        _ => return Err(CurveError::DustAmount),
    };

    let k = invariant(params)?;
    let y0 = token_reserve(params, supply)?;
    let x0 = k / y0;
    let x1 = x0.checked_add(net_base_in).ok_or(CurveError::Overflow)?;
    let y1 = div_ceil(k, x1)?;
    let tokens_out = y0.saturating_sub(y1);
    if tokens_out.is_zero() {
        return Err(CurveError::DustAmount);
    }
    if tokens_out > remaining {
        return Err(CurveError::CurveExhausted { remaining });
    }

    let price_after = price_at_supply(params, supply + tokens_out)?;
    Ok(BuyQuote {
        tokens_out,
        fee,
        net_base_in,
        price_after,
    })
}

pub fn quote_sell(
    state: &CurveState,
    token_amount_in: U256,
) -> Result<SellQuote, CurveError> {
    let params = &state.params;
    if token_amount_in.is_zero() {
        return Err(CurveError::ZeroAmount);
    }
    let supply = state.circulating_supply;
    if token_amount_in > supply {
        return Err(CurveError::InsufficientLiquidity {
            requested: token_amount_in,
            available: supply,
        });
    }

    let k = invariant(params)?;
    let y0 = token_reserve(params, supply)?;
    let y1 = y0.checked_add(token_amount_in).ok_or(CurveError::Overflow)?;
    let x0 = k / y0;
    let x1 = div_ceil(k, y1)?;
    let gross_base_out = x0.saturating_sub(x1);
    if gross_base_out > state.reserve_balance {
        return Err(CurveError::InsufficientReserve {
            required: gross_base_out,
            available: state.reserve_balance,
        });
    }

    let fee = fee_on(gross_base_out, params.fee_bps)?;
    let base_out = gross_base_out.saturating_sub(fee);
    if base_out.is_zero() {
        return Err(CurveError::DustAmount);
    }

    let price_after = price_at_supply(params, supply - token_amount_in)?;
    Ok(SellQuote {
        base_out,
        fee,
        gross_base_out,
        price_after,
    })
}

/// Gross base amount (fee included, rounded up) that buys at least `tokens_out`.
pub fn quote_buy_for_tokens(
    state: &CurveState,
    tokens_out: U256,
) -> Result<U256, CurveError> {
    let params = &state.params;
    if tokens_out.is_zero() {
        return Err(CurveError::ZeroAmount);
    }
    let supply = state.circulating_supply;
    let remaining = params.curve_supply_cap.saturating_sub(supply);
    if tokens_out > remaining {
        return Err(CurveError::CurveExhausted { remaining });
    }

    let k = invariant(params)?;
    let y0 = token_reserve(params, supply)?;
    let y1 = y0 - tokens_out;
    let x0 = k / y0;
    let net_needed = div_ceil(k, y1)?.saturating_sub(x0);

    let keep_bps = bps_denominator() - U256::from(params.fee_bps);
    let mut gross = div_ceil(net_needed.checked_mul(bps_denominator()).ok_or(CurveError::Overflow)?, keep_bps)?;
    // fee rounds up, so the first estimate can land one unit short
    while gross - fee_on(gross, params.fee_bps)? < net_needed {
        gross += U256::from(1u8);
    }
    Ok(gross)
}

pub fn apply_buy(
    state: &CurveState,
    base_amount_in: U256,
) -> Result<(CurveState, BuyQuote), CurveError> {
    let quote = quote_buy(state, base_amount_in)?;
    let mut next = state.clone();
    next.circulating_supply += quote.tokens_out;
    next.reserve_balance = next.reserve_balance.checked_add(quote.net_base_in).ok_or(CurveError::Overflow)?;
    next.refresh_derived();
    Ok((next, quote))
}

pub fn apply_sell(
    state: &CurveState,
    token_amount_in: U256,
) -> Result<(CurveState, SellQuote), CurveError> {
    let quote = quote_sell(state, token_amount_in)?;
    let mut next = state.clone();
    next.circulating_supply -= token_amount_in;
    next.reserve_balance -= quote.gross_base_out;
    next.refresh_derived();
    Ok((next, quote))
}

/// Lower bound a trade may execute at, rounded down.
pub fn min_out_with_slippage(
    amount_out: U256,
    slippage_bps: u16,
) -> U256 {
    let keep = BPS_DENOMINATOR.saturating_sub(slippage_bps);
    amount_out.saturating_mul(U256::from(keep)) / bps_denominator()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;
    use crate::test_utils::fixtures::TestFixtures;

    fn state_with_supply(supply: U256) -> CurveState {
        let mut state = TestFixtures::curve_state();
        state.circulating_supply = supply;
        state
    }

    #[test]
    fn zero_supply_price_is_base_price() {
        let state = TestFixtures::curve_state();
        let params = state.params;
        let expected = params.virtual_base_reserve * wad() / params.virtual_token_reserve;
        assert_eq!(price_at(&state).unwrap(), expected);
        assert!(!expected.is_zero());
    }

    #[test]
    fn buy_from_empty_curve_round_trips_minus_fees() {
        let state = TestFixtures::curve_state();
        let base_in = U256::from(1_000_000u64);
        let (after, buy) = apply_buy(&state, base_in).unwrap();
        assert!(buy.tokens_out > U256::ZERO);
        assert_eq!(buy.fee, U256::from(10_000u64));

        let sell = quote_sell(&after, buy.tokens_out).unwrap();
        assert!(sell.base_out <= base_in);
        // two 1% fees plus rounding
        assert!(sell.base_out >= U256::from(970_000u64));
    }

    #[test]
    fn sell_more_than_supply_is_insufficient_liquidity() {
        let state = state_with_supply(U256::from(1_000u64));
        let err = quote_sell(&state, U256::from(1_001u64)).unwrap_err();
        assert_eq!(err, CurveError::InsufficientLiquidity {
            requested: U256::from(1_001u64),
            available: U256::from(1_000u64),
        });
    }

    #[test]
    fn exhausted_curve_rejects_buys() {
        let cap = TestFixtures::curve_params().curve_supply_cap;
        let state = state_with_supply(cap);
        assert_eq!(quote_buy(&state, U256::from(WAD)).unwrap_err(), CurveError::CurveExhausted {
            remaining: U256::ZERO
        });
    }

    #[test]
    fn buy_past_cap_reports_remaining() {
        let cap = TestFixtures::curve_params().curve_supply_cap;
        let remaining = U256::from(1_000u64);
        let state = state_with_supply(cap - remaining);
        let err = quote_buy(&state, U256::from(100u64) * U256::from(WAD)).unwrap_err();
        assert_eq!(err, CurveError::CurveExhausted { remaining });
    }

    #[rstest]
    #[case(U256::ZERO)]
    fn zero_amounts_are_rejected(#[case] amount: U256) {
        let state = state_with_supply(U256::from(WAD));
        assert_eq!(quote_buy(&state, amount).unwrap_err(), CurveError::ZeroAmount);
        assert_eq!(quote_sell(&state, amount).unwrap_err(), CurveError::ZeroAmount);
    }

    #[test]
    fn exact_token_cost_buys_at_least_requested() {
        let state = state_with_supply(U256::from(5_000u64) * U256::from(WAD));
        let wanted = U256::from(12_345u64) * U256::from(WAD);
        let cost = quote_buy_for_tokens(&state, wanted).unwrap();
        let bought = quote_buy(&state, cost).unwrap();
        assert!(bought.tokens_out >= wanted);
    }

    #[rstest]
    #[case(0, 0)]
    #[case(5_000, 5_000)]
    #[case(10_000, 10_000)]
    fn progress_is_share_of_cap(
        #[case] numerator_bps: u64,
        #[case] expected: u16,
    ) {
        let cap = TestFixtures::curve_params().curve_supply_cap;
        let state = state_with_supply(cap * U256::from(numerator_bps) / U256::from(10_000u64));
        assert_eq!(progress_bps(&state), expected);
    }

    #[test]
    fn slippage_rounds_down() {
        assert_eq!(min_out_with_slippage(U256::from(999u64), 100), U256::from(989u64));
        assert_eq!(min_out_with_slippage(U256::from(1_000u64), 0), U256::from(1_000u64));
    }

    proptest! {
        #[test]
        fn price_is_monotonic_in_supply(a in 0u128..793_000_000u128, b in 0u128..793_000_000u128) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let lo_state = state_with_supply(U256::from(lo) * U256::from(WAD));
            let hi_state = state_with_supply(U256::from(hi) * U256::from(WAD));
            prop_assert!(price_at(&lo_state).unwrap() <= price_at(&hi_state).unwrap());
        }

        #[test]
        fn buy_output_grows_with_input(supply in 0u128..700_000_000u128, a in 1_000u128..10u128.pow(20), b in 1_000u128..10u128.pow(20)) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let state = state_with_supply(U256::from(supply) * U256::from(WAD));
            let hi_quote = quote_buy(&state, U256::from(hi));
            prop_assume!(!matches!(hi_quote, Err(CurveError::CurveExhausted { .. })));
            let lo_out = quote_buy(&state, U256::from(lo)).map(|q| q.tokens_out).unwrap_or(U256::ZERO);
            let hi_out = hi_quote.map(|q| q.tokens_out).unwrap_or(U256::ZERO);
            prop_assert!(lo_out <= hi_out);
        }

        #[test]
        fn round_trip_never_creates_value(supply in 0u128..700_000_000u128, base_in in 1u128..10u128.pow(21)) {
            let mut state = state_with_supply(U256::from(supply) * U256::from(WAD));
            // reserve consistent with the supply already sold
            let k = invariant(&state.params).unwrap();
            let y = token_reserve(&state.params, state.circulating_supply).unwrap();
            state.reserve_balance = (k / y).saturating_sub(state.params.virtual_base_reserve) + U256::from(1u8);

            let base_in = U256::from(base_in);
            match apply_buy(&state, base_in) {
                Ok((after, buy)) => match quote_sell(&after, buy.tokens_out) {
                    Ok(sell) => prop_assert!(sell.base_out <= base_in),
                    Err(CurveError::DustAmount) => {},
                    Err(other) => prop_assert!(false, "unexpected sell error {:?}", other),
                },
                Err(CurveError::DustAmount) | Err(CurveError::CurveExhausted { .. }) => {},
                Err(other) => prop_assert!(false, "unexpected buy error {:?}", other),
            }
        }
    }
}
