//! Adversarial: stale, broken and unreachable price feeds.
//!
//! Anything that needs a USD value must fail outright. No cached or default price is ever used.

use chrono::Duration;
use peg_core::*;
use peg_tests::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn is_stale(result: Result<impl std::fmt::Debug, EngineError>) -> bool {
    matches!(result, Err(EngineError::StalePrice { .. }))
}

/// Alice (10 WETH / 9000) and a liquidator holding units, then the feeds go quiet.
fn stale_harness() -> Harness {
    let harness = Harness::new();
    harness
        .open_weth_position(&alice(), wad(10), wad(9_000))
        .unwrap();
    harness
        .open_weth_position(&liquidator(), wad(20), wad(5_000))
        .unwrap();
    harness.fund_weth(&alice(), wad(5));
    harness.let_prices_go_stale();
    harness
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn stale_price_fails_every_priced_operation() {
    let harness = stale_harness();
    let engine = &harness.engine;
    let before = harness.snapshot(&[alice(), liquidator()]);

    assert!(is_stale(engine.mint(&alice(), wad(1))));
    assert!(is_stale(engine.deposit_and_mint(&alice(), &weth(), wad(5), wad(1))));
    assert!(is_stale(engine.redeem_collateral(&alice(), &weth(), wad(1))));
    assert!(is_stale(engine.burn(&alice(), wad(1))));
    assert!(is_stale(engine.redeem_for_burn(&alice(), &weth(), wad(1), wad(1_000))));
    assert!(is_stale(engine.liquidate(&liquidator(), &weth(), &alice(), wad(1_000))));

    assert!(is_stale(engine.usd_value(&weth(), wad(1))));
    assert!(is_stale(engine.token_amount_from_usd(&weth(), wad(1))));
    assert!(is_stale(engine.price_quote(&weth())));
    assert!(is_stale(engine.health_factor(&alice())));
    assert!(is_stale(engine.get_account_information(&alice())));
    assert!(is_stale(engine.protocol_snapshot()));

    assert_eq!(harness.snapshot(&[alice(), liquidator()]), before);
}

#[test]
fn plain_deposits_do_not_need_a_price() {
    let harness = stale_harness();
    harness
        .engine
        .deposit_collateral(&alice(), &weth(), wad(5))
        .unwrap();
    assert_eq!(
        harness
            .engine
            .collateral_balance_of(&alice(), &weth())
            .unwrap(),
        wad(15)
    );
}

#[test]
fn stale_error_reports_the_age() {
    let harness = Harness::new();
    harness.clock.advance(Duration::hours(5));

    match harness.engine.usd_value(&wbtc(), wad(1)) {
        Err(EngineError::StalePrice { asset, age_secs }) => {
            assert_eq!(asset, wbtc());
            assert_eq!(age_secs, 5 * 3600);
        }
        other => panic!("expected StalePrice, got {other:?}"),
    }
}

#[test]
fn quote_exactly_at_the_timeout_is_fresh() {
    let harness = Harness::new();
    harness.clock.advance(harness.engine.config().price_timeout());
    assert_eq!(harness.engine.usd_value(&weth(), wad(1)).unwrap(), wad(2_000));

    harness.clock.advance(Duration::seconds(1));
    assert!(is_stale(harness.engine.usd_value(&weth(), wad(1))));
}

#[test]
fn a_new_round_restores_operations() {
    let harness = stale_harness();
    assert!(is_stale(harness.engine.mint(&alice(), wad(1))));

    harness.set_weth_price(2_000);
    harness.engine.mint(&alice(), wad(1)).unwrap();
    assert_eq!(harness.engine.debt_of(&alice()).unwrap(), wad(9_001));
}

#[test]
fn only_assets_with_deposits_are_priced() {
    let harness = Harness::new();
    harness
        .open_weth_position(&alice(), wad(10), wad(1_000))
        .unwrap();
    // WBTC goes stale; Alice holds none, so her operations never read it.
    harness.clock.advance(Duration::hours(4));
    harness.set_weth_price(2_000);

    harness.engine.mint(&alice(), wad(1_000)).unwrap();
    assert!(is_stale(harness.engine.usd_value(&wbtc(), wad(1))));
}

#[test]
fn quotes_from_the_future_are_accepted() {
    let harness = Harness::new();
    let ahead = harness.clock.now() + Duration::minutes(10);
    harness
        .weth_feed
        .update_round_data(7, usd_answer(2_500), ahead);

    let quote = harness.engine.price_quote(&weth()).unwrap();
    assert_eq!(quote.round_id, 7);
    assert_eq!(harness.engine.usd_value(&weth(), wad(2)).unwrap(), wad(5_000));
}

#[test]
fn non_positive_answers_are_rejected() {
    let harness = Harness::new();
    harness
        .open_weth_position(&alice(), wad(10), wad(1_000))
        .unwrap();
    let before = harness.snapshot(&[alice()]);

    for answer in [0, -usd_answer(1)] {
        harness.weth_feed.update_answer(answer);
        assert!(matches!(
            harness.engine.mint(&alice(), wad(1)),
            Err(EngineError::InvalidPrice { .. })
        ));
    }
    assert_eq!(harness.snapshot(&[alice()]), before);
}

#[test]
fn unreachable_feed_fails_priced_operations() {
    let harness = Harness::new();
    harness
        .open_weth_position(&alice(), wad(10), wad(1_000))
        .unwrap();
    harness.weth_feed.set_unavailable(true);

    let err = harness.engine.mint(&alice(), wad(1)).unwrap_err();
    assert!(matches!(err, EngineError::PriceSourceUnavailable { .. }));
    assert_eq!(err.category(), ErrorCategory::Oracle);

    harness.weth_feed.set_unavailable(false);
    harness.engine.mint(&alice(), wad(1)).unwrap();
}
