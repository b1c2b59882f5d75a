use alloy_primitives::Address;
use alloy_primitives::U256;
use curvekeeper::config::CurveConfig;
use curvekeeper::error::CurveError;
use curvekeeper::math::curve::apply_buy;
use curvekeeper::math::curve::apply_sell;
use curvekeeper::math::curve::price_at;
use curvekeeper::math::curve::quote_buy;
use curvekeeper::math::curve::quote_sell;
use curvekeeper::model::CurveState;
use proptest::prelude::*;

fn fresh() -> CurveState {
    CurveState::new_deployed(
        Address::repeat_byte(1),
        Address::repeat_byte(2),
        Address::repeat_byte(3),
        Address::repeat_byte(4),
        CurveConfig::default().params(),
        1,
        0,
    )
}

#[test]
fn small_buy_round_trips_to_less_than_paid() {
    let state = fresh();
    let paid = U256::from(1_000_000u64);

    let (after, buy) = apply_buy(&state, paid).unwrap();
    assert!(buy.tokens_out > U256::ZERO);

    let sell = quote_sell(&after, buy.tokens_out).unwrap();
    // two fees and rounding, never a profit
    assert!(sell.base_out < paid);
    let fee_budget = buy.fee + sell.fee + U256::from(2u8);
    assert!(sell.base_out + fee_budget >= paid);
}

#[test]
fn selling_more_than_circulating_is_insufficient_liquidity() {
    let (state, buy) = apply_buy(&fresh(), U256::from(10u64).pow(U256::from(17u8))).unwrap();

    let err = quote_sell(&state, buy.tokens_out + U256::from(1u8)).unwrap_err();

    assert_eq!(err, CurveError::InsufficientLiquidity {
        requested: buy.tokens_out + U256::from(1u8),
        available: buy.tokens_out,
    });
}

#[derive(Debug, Clone)]
enum Op {
    Buy(u128),
    /// Sell this many parts per thousand of the circulating supply.
    Sell(u16),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (10u128.pow(9)..10u128.pow(18)).prop_map(Op::Buy),
        (1u16..=1000).prop_map(Op::Sell),
    ]
}

proptest! {
    #[test]
    fn random_trading_keeps_the_curve_solvent(ops in prop::collection::vec(op(), 1..40)) {
        let mut state = fresh();
        for op in ops {
            let price_before = price_at(&state).unwrap();
            match op {
                Op::Buy(amount) => match apply_buy(&state, U256::from(amount)) {
                    Ok((next, _)) => {
                        prop_assert!(price_at(&next).unwrap() >= price_before);
                        state = next;
                    },
                    Err(CurveError::CurveExhausted { .. }) | Err(CurveError::DustAmount) => {},
                    Err(other) => prop_assert!(false, "unexpected buy error {:?}", other),
                },
                Op::Sell(per_mille) => {
                    let amount = state.circulating_supply * U256::from(per_mille) / U256::from(1000u16);
                    match apply_sell(&state, amount) {
                        Ok((next, _)) => {
                            prop_assert!(price_at(&next).unwrap() <= price_before);
                            state = next;
                        },
                        Err(CurveError::ZeroAmount) | Err(CurveError::DustAmount) => {},
                        Err(other) => prop_assert!(false, "unexpected sell error {:?}", other),
                    }
                },
            }
            prop_assert!(state.circulating_supply <= state.params.curve_supply_cap);
        }

        // whatever happened, everyone can still exit
        if !state.circulating_supply.is_zero() {
            let exit = quote_sell(&state, state.circulating_supply);
            prop_assert!(
                !matches!(exit, Err(CurveError::InsufficientReserve { .. })),
                "reserve {} cannot cover a full exit", state.reserve_balance
            );
        }
    }
}
