use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use alloy_primitives::Bytes;
use alloy_primitives::U256;
use alloy_sol_types::SolCall;
use tracing::debug;
use tracing::warn;

use crate::config::QuoteConfig;
use crate::error::QuoteError;
use crate::error::RpcError;
use crate::math::curve as curve_math;
use crate::model::CurveParams;
use crate::model::CurveState;
use crate::model::PriceQuote;
use crate::model::Quote;
use crate::model::QuoteSource;
use crate::model::TradeDirection;
use crate::rpc::abi::IBondingCurve;
use crate::rpc::ChainClient;
use crate::storage::CurveStore;
use crate::utils::now_secs;

/// Curve state a response is computed from, with where it came from.
#[derive(Debug, Clone)]
struct ResolvedState {
    state: CurveState,
    source: QuoteSource,
    staleness_secs: Option<u64>,
}

/// Read side for the trading UI. Degrades live -> cached -> default and reports which one
/// answered; the only error it returns is a rejected quote.
#[derive(Clone)]
pub struct QuoteService {
    store: Arc<dyn CurveStore>,
    chain: Arc<dyn ChainClient>,
    config: QuoteConfig,
    default_params: CurveParams,
    ingester_id: String,
}

impl QuoteService {
    pub fn new(
        store: Arc<dyn CurveStore>,
        chain: Arc<dyn ChainClient>,
        config: QuoteConfig,
        default_params: CurveParams,
        ingester_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            chain,
            config,
            default_params,
            ingester_id: ingester_id.into(),
        }
    }

    pub async fn get_quote(
        &self,
        token: Address,
        direction: TradeDirection,
        amount: U256,
    ) -> Result<Quote, QuoteError> {
        let resolved = self.resolve(token).await;
        let state = &resolved.state;
        let price_before = curve_math::price_at(state)?;
        let slippage = self.config.slippage_bps;

        let (amount_out, fee, price_after, min_amount_out, value, calldata) = match direction {
            TradeDirection::Buy => {
                let quote = curve_math::quote_buy(state, amount)?;
                let min_out = curve_math::min_out_with_slippage(quote.tokens_out, slippage);
                let calldata = IBondingCurve::buyCall { minTokensOut: min_out }.abi_encode();
                (quote.tokens_out, quote.fee, quote.price_after, min_out, amount, calldata)
            },
            TradeDirection::Sell => {
                let quote = curve_math::quote_sell(state, amount)?;
                let min_out = curve_math::min_out_with_slippage(quote.base_out, slippage);
                let calldata = IBondingCurve::sellCall {
                    tokenAmount: amount,
                    minBaseOut: min_out,
                }
                .abi_encode();
                (quote.base_out, quote.fee, quote.price_after, min_out, U256::ZERO, calldata)
            },
        };

        let curve_address = deployed_curve(state);
        Ok(Quote {
            token_address: token,
            direction,
            amount_in: amount,
            amount_out,
            fee,
            price_before,
            price_after,
            min_amount_out,
            source: resolved.source,
            staleness_secs: resolved.staleness_secs,
            curve_address,
            calldata: curve_address.map(|_| Bytes::from(calldata)),
            value,
        })
    }

    /// Current price view. Never fails: math errors fall back to the state's cached numbers.
    pub async fn get_price(
        &self,
        token: Address,
    ) -> PriceQuote {
        let resolved = self.resolve(token).await;
        let state = resolved.state;
        PriceQuote {
            token_address: token,
            price: curve_math::price_at(&state).unwrap_or(state.current_price),
            market_cap: curve_math::market_cap(&state).unwrap_or(state.market_cap),
            circulating_supply: state.circulating_supply,
            reserve_balance: state.reserve_balance,
            progress_bps: curve_math::progress_bps(&state),
            source: resolved.source,
            staleness_secs: resolved.staleness_secs,
        }
    }

    async fn resolve(
        &self,
        token: Address,
    ) -> ResolvedState {
        let persisted = match self.store.get_curve_state(token).await {
            Ok(state) => state,
            Err(e) => {
                warn!("quote_store_read_failed::token::{}::error::{}", token, e);
                None
            },
        };

        let Some(persisted) = persisted else {
            debug!("quote_default_state::token::{}", token);
            return ResolvedState {
                state: self.bootstrap_state(token),
                source: QuoteSource::Default,
                staleness_secs: None,
            };
        };

        match self.read_live(persisted.curve_address).await {
            Ok((supply, reserve)) => ResolvedState {
                state: persisted.with_live_balances(supply, reserve),
                source: QuoteSource::Live,
                staleness_secs: None,
            },
            Err(e) => {
                warn!("quote_live_read_failed::token::{}::error::{}", token, e);
                let staleness_secs = self.staleness(&persisted).await;
                let mut state = persisted;
                state.refresh_derived();
                ResolvedState {
                    state,
                    source: QuoteSource::Cached,
                    staleness_secs: Some(staleness_secs),
                }
            },
        }
    }

    async fn read_live(
        &self,
        curve: Address,
    ) -> Result<(U256, U256), RpcError> {
        if curve.is_zero() {
            return Err(RpcError::InvalidResponse("curve address unknown".to_string()));
        }
        let budget = Duration::from_millis(self.config.live_read_timeout_ms);
        let call = self.chain.call(curve, IBondingCurve::getCurveStateCall {}.abi_encode().into());
        let data = tokio::time::timeout(budget, call)
            .await
            .map_err(|_| RpcError::Timeout(self.config.live_read_timeout_ms))??;
        let ret = IBondingCurve::getCurveStateCall::abi_decode_returns(&data, true)
            .map_err(|e| RpcError::AbiDecode(e.to_string()))?;
        Ok((ret.circulatingSupply, ret.reserveBalance))
    }

    /// Seconds since the ingester last committed; the state's own update time if it never has.
    async fn staleness(
        &self,
        state: &CurveState,
    ) -> u64 {
        let last_ingested = match self.store.get_cursor(&self.ingester_id).await {
            Ok(Some(cursor)) => cursor.updated_at,
            Ok(None) => state.updated_at,
            Err(e) => {
                warn!("quote_cursor_read_failed::error::{}", e);
                state.updated_at
            },
        };
        now_secs().saturating_sub(last_ingested)
    }

    /// Fresh curve with the configured shape and nothing sold.
    fn bootstrap_state(
        &self,
        token: Address,
    ) -> CurveState {
        CurveState::new_deployed(
            token,
            Address::ZERO,
            Address::ZERO,
            Address::ZERO,
            self.default_params,
            0,
            now_secs(),
        )
    }
}

fn deployed_curve(state: &CurveState) -> Option<Address> {
    (!state.curve_address.is_zero()).then_some(state.curve_address)
}
