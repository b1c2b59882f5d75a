mod common;

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use alloy_primitives::U256;
use common::CurveFixture;
use common::FakeChain;
use common::NOW;
use curvekeeper::config::CurveConfig;
use curvekeeper::config::QuoteConfig;
use curvekeeper::error::CurveError;
use curvekeeper::error::QuoteError;
use curvekeeper::handler::quote::QuoteService;
use curvekeeper::math::curve as curve_math;
use curvekeeper::model::IngestCursor;
use curvekeeper::model::QuoteSource;
use curvekeeper::model::TradeDirection;
use curvekeeper::storage::in_memory::InMemoryCurveStore;
use curvekeeper::storage::CurveStore;
use curvekeeper::storage::IngestBatch;
use pretty_assertions::assert_eq;
use rstest::rstest;

const WAD: u128 = 1_000_000_000_000_000_000;

/// A curve after a one-coin buy, as last committed by the ingester at `NOW`.
async fn ingested(fx: &CurveFixture) -> Arc<InMemoryCurveStore> {
    let store = Arc::new(InMemoryCurveStore::new());
    let mut state = fx.state(10);
    let (sold, _) = curve_math::apply_buy(&state, U256::from(WAD)).unwrap();
    state.circulating_supply = sold.circulating_supply;
    state.reserve_balance = sold.reserve_balance;
    state.refresh_derived();
    store.insert_curve_state(&state).await.unwrap();
    store
        .apply_batch(&IngestBatch {
            cursor: Some(IngestCursor::new("main", 50, NOW)),
            now: NOW,
            ..Default::default()
        })
        .await
        .unwrap();
    store
}

fn service(
    store: &Arc<InMemoryCurveStore>,
    chain: &Arc<FakeChain>,
) -> QuoteService {
    QuoteService::new(
        store.clone(),
        chain.clone(),
        QuoteConfig {
            live_read_timeout_ms: 100,
            slippage_bps: 100,
        },
        CurveConfig::default().params(),
        "main",
    )
}

#[tokio::test]
async fn live_balances_win_over_persisted_ones() {
    let fx = CurveFixture::new(0x31);
    let store = ingested(&fx).await;
    let chain = Arc::new(FakeChain::new(60));
    let live_supply = U256::from(2_000_000u64) * U256::from(WAD);
    let live_reserve = U256::from(3u64) * U256::from(WAD);
    chain.set_curve_balances(fx.curve, live_supply, live_reserve);

    let quote = service(&store, &chain)
        .get_quote(fx.token, TradeDirection::Buy, U256::from(WAD / 10))
        .await
        .unwrap();

    let persisted = store.get_curve_state(fx.token).await.unwrap().unwrap();
    let expected = curve_math::quote_buy(&persisted.with_live_balances(live_supply, live_reserve), U256::from(WAD / 10))
        .unwrap();
    assert_eq!(quote.source, QuoteSource::Live);
    assert_eq!(quote.staleness_secs, None);
    assert_eq!(quote.amount_out, expected.tokens_out);
    assert_eq!(quote.curve_address, Some(fx.curve));
    assert_eq!(quote.value, U256::from(WAD / 10));
    assert!(quote.calldata.is_some());
}

#[rstest]
#[case::offline(false)]
#[case::stalled(true)]
#[tokio::test]
async fn unreachable_chain_degrades_to_cached(#[case] stalled: bool) {
    let fx = CurveFixture::new(0x32);
    let store = ingested(&fx).await;
    let chain = Arc::new(FakeChain::new(60));
    if stalled {
        chain.set_stalled(true);
    } else {
        chain.set_offline(true);
    }

    let quote = tokio::time::timeout(
        Duration::from_secs(2),
        service(&store, &chain).get_quote(fx.token, TradeDirection::Buy, U256::from(WAD / 10)),
    )
    .await
    .expect("quote must not wait on the chain")
    .unwrap();

    let persisted = store.get_curve_state(fx.token).await.unwrap().unwrap();
    let expected = curve_math::quote_buy(&persisted, U256::from(WAD / 10)).unwrap();
    assert_eq!(quote.source, QuoteSource::Cached);
    assert_eq!(quote.amount_out, expected.tokens_out);
    // cursor committed at a fixed past time
    assert!(quote.staleness_secs.unwrap() > 0);
    assert_eq!(quote.curve_address, Some(fx.curve));
}

#[tokio::test]
async fn unknown_token_with_chain_down_gets_defaults() {
    let store = Arc::new(InMemoryCurveStore::new());
    let chain = Arc::new(FakeChain::new(60));
    chain.set_offline(true);
    let token = Address::repeat_byte(0x3F);

    let quote = service(&store, &chain)
        .get_quote(token, TradeDirection::Buy, U256::from(WAD))
        .await
        .unwrap();

    assert_eq!(quote.source, QuoteSource::Default);
    assert_eq!(quote.curve_address, None);
    assert_eq!(quote.calldata, None);
    assert!(quote.amount_out > U256::ZERO);

    let price = service(&store, &chain).get_price(token).await;
    assert_eq!(price.source, QuoteSource::Default);
    assert_eq!(price.circulating_supply, U256::ZERO);
    assert_eq!(price.progress_bps, 0);
}

#[tokio::test]
async fn price_view_answers_while_chain_is_down() {
    let fx = CurveFixture::new(0x33);
    let store = ingested(&fx).await;
    let chain = Arc::new(FakeChain::new(60));
    chain.set_offline(true);

    let price = service(&store, &chain).get_price(fx.token).await;

    let persisted = store.get_curve_state(fx.token).await.unwrap().unwrap();
    assert_eq!(price.source, QuoteSource::Cached);
    assert_eq!(price.price, curve_math::price_at(&persisted).unwrap());
    assert_eq!(price.market_cap, curve_math::market_cap(&persisted).unwrap());
    assert!(price.progress_bps > 0);
}

#[tokio::test]
async fn overselling_is_rejected_not_clamped() {
    let fx = CurveFixture::new(0x34);
    let store = ingested(&fx).await;
    let chain = Arc::new(FakeChain::new(60));
    chain.set_offline(true);
    let supply = store.get_curve_state(fx.token).await.unwrap().unwrap().circulating_supply;

    let err = service(&store, &chain)
        .get_quote(fx.token, TradeDirection::Sell, supply + U256::from(1u8))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        QuoteError::Rejected(CurveError::InsufficientLiquidity { requested, available })
            if requested == supply + U256::from(1u8) && available == supply
    ));
}
