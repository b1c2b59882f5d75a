use alloy_primitives::Address;
use alloy_primitives::U256;
use serde::Deserialize;
use serde::Serialize;

use super::event::RewardPayout;
use super::event::TradeDirection;
use super::event::TradeEvent;
use crate::error::CurveError;
use crate::error::IngestError;
use crate::math::curve as curve_math;
use crate::utils::serde_u256;

/// Fixed shape of one bonding curve. Copied onto every CurveState at deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveParams {
    #[serde(with = "serde_u256")]
    pub virtual_base_reserve: U256,
    #[serde(with = "serde_u256")]
    pub virtual_token_reserve: U256,
    #[serde(with = "serde_u256")]
    pub curve_supply_cap: U256,
    #[serde(with = "serde_u256")]
    pub total_supply: U256,
    pub fee_bps: u16,
}

impl CurveParams {
    pub fn validate(&self) -> Result<(), CurveError> {
        if self.virtual_base_reserve.is_zero() {
            return Err(CurveError::InvalidParams("virtual base reserve must be positive"));
        }
        if self.curve_supply_cap >= self.virtual_token_reserve {
            return Err(CurveError::InvalidParams("curve cap must stay below the virtual token reserve"));
        }
        if self.curve_supply_cap > self.total_supply {
            return Err(CurveError::InvalidParams("curve cap exceeds total supply"));
        }
        if self.fee_bps >= crate::constants::BPS_DENOMINATOR {
            return Err(CurveError::InvalidParams("fee must be below 100%"));
        }
        self.virtual_base_reserve
            .checked_mul(self.virtual_token_reserve)
            .ok_or(CurveError::InvalidParams("virtual reserves overflow the invariant"))?;
        Ok(())
    }
}

/// Off-chain mirror of one deployed curve. `current_price` and `market_cap` are caches
/// and are recomputed from supply whenever fresher numbers arrive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveState {
    pub token_address: Address,
    pub creator_address: Address,
    pub platform_address: Address,
    pub curve_address: Address,
    pub params: CurveParams,
    #[serde(with = "serde_u256")]
    pub circulating_supply: U256,
    #[serde(with = "serde_u256")]
    pub reserve_balance: U256,
    #[serde(with = "serde_u256")]
    pub current_price: U256,
    #[serde(with = "serde_u256")]
    pub market_cap: U256,
    #[serde(with = "serde_u256")]
    pub all_time_high_price: U256,
    #[serde(with = "serde_u256")]
    pub total_volume_base: U256,
    #[serde(with = "serde_u256")]
    pub total_rewards_paid: U256,
    pub trade_count: u64,
    pub holder_count: u64,
    pub deployment_block: u64,
    pub last_trade_block: Option<u64>,
    pub is_active: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

impl CurveState {
    pub fn new_deployed(
        token_address: Address,
        creator_address: Address,
        platform_address: Address,
        curve_address: Address,
        params: CurveParams,
        deployment_block: u64,
        now: u64,
    ) -> Self {
        let mut state = Self {
            token_address,
            creator_address,
            platform_address,
            curve_address,
            params,
            circulating_supply: U256::ZERO,
            reserve_balance: U256::ZERO,
            current_price: U256::ZERO,
            market_cap: U256::ZERO,
            all_time_high_price: U256::ZERO,
            total_volume_base: U256::ZERO,
            total_rewards_paid: U256::ZERO,
            trade_count: 0,
            holder_count: 0,
            deployment_block,
            last_trade_block: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.refresh_derived();
        state.all_time_high_price = state.current_price;
        state
    }

    /// Recompute the cached price and market cap from supply.
    pub fn refresh_derived(&mut self) {
        self.current_price = curve_math::price_at(self).unwrap_or(self.current_price);
        self.market_cap = curve_math::market_cap(self).unwrap_or(self.market_cap);
    }

    /// Copy of this state with supply and reserve replaced by a fresher on-chain read.
    pub fn with_live_balances(
        &self,
        circulating_supply: U256,
        reserve_balance: U256,
    ) -> Self {
        let mut state = self.clone();
        state.circulating_supply = circulating_supply;
        state.reserve_balance = reserve_balance;
        state.refresh_derived();
        state
    }

    /// Apply one confirmed trade. Any underflow is an invariant violation and leaves `self` untouched.
    pub fn apply_trade(
        &mut self,
        trade: &TradeEvent,
        now: u64,
    ) -> Result<(), IngestError> {
        let violation = |reason: String| IngestError::InvariantViolation {
            token: trade.token_address,
            tx_hash: trade.transaction_hash,
            log_index: trade.log_index,
            reason,
        };

        let (supply, reserve) = match trade.direction {
            TradeDirection::Buy => {
                let net_in = trade
                    .base_amount
                    .checked_sub(trade.fee)
                    .ok_or_else(|| violation(format!("buy fee {} exceeds amount {}", trade.fee, trade.base_amount)))?;
                let supply = self
                    .circulating_supply
                    .checked_add(trade.token_amount)
                    .ok_or_else(|| violation("supply overflow".to_string()))?;
                let reserve = self
                    .reserve_balance
                    .checked_add(net_in)
                    .ok_or_else(|| violation("reserve overflow".to_string()))?;
                (supply, reserve)
            },
            TradeDirection::Sell => {
                let gross_out = trade
                    .base_amount
                    .checked_add(trade.fee)
                    .ok_or_else(|| violation("sell payout overflow".to_string()))?;
                let supply = self.circulating_supply.checked_sub(trade.token_amount).ok_or_else(|| {
                    violation(format!(
                        "sell of {} exceeds circulating supply {}",
                        trade.token_amount, self.circulating_supply
                    ))
                })?;
                let reserve = self.reserve_balance.checked_sub(gross_out).ok_or_else(|| {
                    violation(format!("payout {} exceeds reserve {}", gross_out, self.reserve_balance))
                })?;
                (supply, reserve)
            },
        };

        self.circulating_supply = supply;
        self.reserve_balance = reserve;
        self.total_volume_base = self.total_volume_base.saturating_add(trade.base_amount);
        self.trade_count += 1;
        self.last_trade_block = Some(self.last_trade_block.map_or(trade.block_number, |b| b.max(trade.block_number)));
        self.refresh_derived();
        if self.current_price > self.all_time_high_price {
            self.all_time_high_price = self.current_price;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn apply_reward(
        &mut self,
        reward: &RewardPayout,
        now: u64,
    ) {
        self.total_rewards_paid = self.total_rewards_paid.saturating_add(reward.amount);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::B256;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_utils::fixtures::TestFixtures;

    fn trade(
        direction: TradeDirection,
        base_amount: u64,
        token_amount: u64,
        fee: u64,
        log_index: u64,
    ) -> TradeEvent {
        TradeEvent {
            token_address: TestFixtures::token(),
            curve_address: TestFixtures::curve(),
            trader_address: TestFixtures::trader(),
            direction,
            base_amount: U256::from(base_amount),
            token_amount: U256::from(token_amount),
            fee: U256::from(fee),
            block_number: 10,
            transaction_hash: B256::repeat_byte(7),
            log_index,
        }
    }

    #[test]
    fn buy_then_sell_moves_balances() {
        let mut state = TestFixtures::curve_state();
        state.apply_trade(&trade(TradeDirection::Buy, 1_000, 500, 10, 0), 1).unwrap();
        assert_eq!(state.circulating_supply, U256::from(500u64));
        assert_eq!(state.reserve_balance, U256::from(990u64));

        state.apply_trade(&trade(TradeDirection::Sell, 400, 200, 5, 1), 2).unwrap();
        assert_eq!(state.circulating_supply, U256::from(300u64));
        assert_eq!(state.reserve_balance, U256::from(585u64));
        assert_eq!(state.trade_count, 2);
        assert_eq!(state.total_volume_base, U256::from(1_400u64));
    }

    #[test]
    fn oversell_is_rejected_without_mutation() {
        let mut state = TestFixtures::curve_state();
        let before = state.clone();
        let err = state.apply_trade(&trade(TradeDirection::Sell, 1, 1, 0, 0), 1).unwrap_err();
        assert!(matches!(err, IngestError::InvariantViolation { .. }));
        assert_eq!(state, before);
    }

    #[test]
    fn price_cache_tracks_supply() {
        let mut state = TestFixtures::curve_state();
        let start_price = state.current_price;
        state.apply_trade(&trade(TradeDirection::Buy, 1_000_000, 1_000_000_000, 0, 0), 1).unwrap();
        assert!(state.current_price >= start_price);
        assert_eq!(state.all_time_high_price, state.current_price);
    }

    #[test]
    fn invalid_params_are_reported() {
        let mut params = TestFixtures::curve_params();
        params.curve_supply_cap = params.virtual_token_reserve;
        assert!(params.validate().is_err());
    }
}
