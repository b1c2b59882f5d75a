use alloy_primitives::Address;
use alloy_primitives::U256;
use tracing::warn;

use crate::error::IngestError;
use crate::model::ChainEvent;
use crate::model::CurveState;
use crate::model::IngestCursor;
use crate::model::TokenWatermark;
use crate::model::TransferEvent;

/// One atomic unit of ingestion.
#[derive(Debug, Clone, Default)]
pub struct IngestBatch {
    /// Already in `(block_number, log_index)` order.
    pub events: Vec<ChainEvent>,
    /// Committed together with the events. `None` leaves the cursor where it is.
    pub cursor: Option<IngestCursor>,
    pub watermarks: Vec<TokenWatermark>,
    pub now: u64,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Events applied for the first time, in application order.
    pub applied: Vec<ChainEvent>,
    pub duplicates: usize,
    /// Events for tokens with no curve state.
    pub skipped_unknown: usize,
    /// Final state of every curve the batch touched.
    pub states: Vec<CurveState>,
}

/// Balances before and after a transfer for the two sides. `None` marks a side that is not a
/// holder (mint/burn zero address or the curve contract itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferEffect {
    pub from_balance: Option<U256>,
    pub to_balance: Option<U256>,
}

pub fn is_holder_address(
    state: &CurveState,
    address: Address,
) -> bool {
    address != Address::ZERO && address != state.curve_address
}

/// Apply a trade or reward to curve state. Transfers only touch holders, see [`apply_transfer`].
pub fn apply_to_state(
    state: &mut CurveState,
    event: &ChainEvent,
    now: u64,
) -> Result<(), IngestError> {
    match event {
        ChainEvent::Trade(trade) => state.apply_trade(trade, now),
        ChainEvent::Reward(reward) => {
            state.apply_reward(reward, now);
            Ok(())
        },
        ChainEvent::Transfer(_) => Ok(()),
    }
}

/// Move `value` between two holders given their known balances and keep `holder_count` in step.
///
/// Holder balances are analytics: history may predate the curve, so a debit larger than the known
/// balance floors at zero instead of failing the batch.
pub fn apply_transfer(
    state: &mut CurveState,
    transfer: &TransferEvent,
    from_before: U256,
    to_before: U256,
    now: u64,
) -> TransferEffect {
    let mut effect = TransferEffect::default();

    if is_holder_address(state, transfer.from) {
        let after = match from_before.checked_sub(transfer.value) {
            Some(after) => after,
            None => {
                warn!(
                    "holder_balance_floored::token::{}::holder::{}::known::{}::debit::{}",
                    transfer.token_address, transfer.from, from_before, transfer.value
                );
                U256::ZERO
            },
        };
        if !from_before.is_zero() && after.is_zero() {
            state.holder_count = state.holder_count.saturating_sub(1);
        }
        effect.from_balance = Some(after);
    }

    if is_holder_address(state, transfer.to) {
        let after = to_before.saturating_add(transfer.value);
        if to_before.is_zero() && !after.is_zero() {
            state.holder_count += 1;
        }
        effect.to_balance = Some(after);
    }

    state.updated_at = now;
    effect
}

#[cfg(test)]
mod tests {
    use alloy_primitives::B256;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_utils::fixtures::TestFixtures;

    fn transfer(
        from: Address,
        to: Address,
        value: u64,
    ) -> TransferEvent {
        TransferEvent {
            token_address: TestFixtures::token(),
            from,
            to,
            value: U256::from(value),
            block_number: 1,
            transaction_hash: B256::repeat_byte(1),
            log_index: 0,
        }
    }

    #[test]
    fn mint_to_new_holder_counts_once() {
        let mut state = TestFixtures::curve_state();
        let holder = TestFixtures::trader();
        let effect = apply_transfer(&mut state, &transfer(Address::ZERO, holder, 10), U256::ZERO, U256::ZERO, 5);
        assert_eq!(effect.from_balance, None);
        assert_eq!(effect.to_balance, Some(U256::from(10u64)));
        assert_eq!(state.holder_count, 1);

        apply_transfer(&mut state, &transfer(Address::ZERO, holder, 5), U256::ZERO, U256::from(10u64), 6);
        assert_eq!(state.holder_count, 1);
    }

    #[test]
    fn emptying_a_balance_drops_the_holder() {
        let mut state = TestFixtures::curve_state();
        state.holder_count = 2;
        let from = TestFixtures::trader();
        let to = Address::repeat_byte(0x42);
        let effect = apply_transfer(&mut state, &transfer(from, to, 7), U256::from(7u64), U256::ZERO, 5);
        assert_eq!(effect.from_balance, Some(U256::ZERO));
        assert_eq!(effect.to_balance, Some(U256::from(7u64)));
        assert_eq!(state.holder_count, 2);
    }

    #[test]
    fn overdraw_floors_at_zero() {
        let mut state = TestFixtures::curve_state();
        state.holder_count = 1;
        let from = TestFixtures::trader();
        let curve = state.curve_address;
        let effect = apply_transfer(&mut state, &transfer(from, curve, 100), U256::from(40u64), U256::ZERO, 5);
        assert_eq!(effect.from_balance, Some(U256::ZERO));
        // the curve contract is not a holder
        assert_eq!(effect.to_balance, None);
        assert_eq!(state.holder_count, 0);
    }
}
