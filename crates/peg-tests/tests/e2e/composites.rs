//! Composite operations, multi-asset positions, value conversions and the event log.

use peg_core::*;
use peg_tests::*;

#[test]
fn deposit_and_mint_is_all_or_nothing() {
    let harness = Harness::new();
    harness.fund_weth(&alice(), wad(10));
    let before = harness.snapshot(&[alice()]);

    // The deposit alone would succeed; the mint breaks health and takes the deposit with it.
    let err = harness
        .engine
        .deposit_and_mint(&alice(), &weth(), wad(10), wad(10_001))
        .unwrap_err();
    assert!(matches!(err, EngineError::HealthFactorIsBroken { .. }));
    assert_eq!(harness.snapshot(&[alice()]), before);
    assert_eq!(harness.weth.balance_of(&alice()), wad(10));
    assert!(harness.engine.events().unwrap().is_empty());
}

#[test]
fn redeem_for_burn_closes_a_position() {
    let harness = Harness::new();
    harness
        .open_weth_position(&alice(), wad(10), wad(9_000))
        .unwrap();

    harness
        .engine
        .redeem_for_burn(&alice(), &weth(), wad(10), wad(9_000))
        .unwrap();

    assert_eq!(harness.engine.debt_of(&alice()).unwrap(), 0);
    assert!(harness.engine.positions(&alice()).unwrap().is_empty());
    assert_eq!(harness.weth.balance_of(&alice()), wad(10));
    assert_eq!(harness.unit.balance_of(&alice()), 0);
    assert_eq!(harness.unit.total_supply(), 0);

    let snapshot = harness.engine.protocol_snapshot().unwrap();
    assert_eq!(snapshot.total_collateral_value_usd, 0);
    assert_eq!(snapshot.total_debt, 0);
    assert_eq!(snapshot.unit_supply, 0);
}

#[test]
fn redeem_for_burn_that_leaves_the_position_unhealthy_restores_the_burn() {
    let harness = Harness::new();
    harness
        .open_weth_position(&alice(), wad(10), wad(9_000))
        .unwrap();
    let before = harness.snapshot(&[alice()]);

    // Burning 1000 leaves 8000 of debt, which 7 WETH ($7000 adjusted) cannot support.
    let err = harness
        .engine
        .redeem_for_burn(&alice(), &weth(), wad(3), wad(1_000))
        .unwrap_err();
    assert!(matches!(err, EngineError::HealthFactorIsBroken { .. }));

    let after = harness.snapshot(&[alice()]);
    assert_eq!(after, before);
    assert_eq!(harness.unit.balance_of(&alice()), wad(9_000));
    assert_eq!(harness.unit.total_supply(), wad(9_000));
}

#[test]
fn collateral_value_sums_every_asset() {
    let harness = Harness::new();
    harness.fund_weth(&alice(), wad(5));
    harness.fund_wbtc(&alice(), wad(10));
    harness.approve_unit(&alice());

    harness
        .engine
        .deposit_collateral(&alice(), &weth(), wad(5))
        .unwrap();
    harness
        .engine
        .deposit_and_mint(&alice(), &wbtc(), wad(10), wad(9_000))
        .unwrap();

    assert_eq!(
        harness.engine.account_collateral_value(&alice()).unwrap(),
        wad(20_000)
    );
    assert_eq!(
        harness.engine.positions(&alice()).unwrap(),
        vec![
            CollateralPosition {
                asset: weth(),
                amount: wad(5),
            },
            CollateralPosition {
                asset: wbtc(),
                amount: wad(10),
            },
        ]
    );

    let snapshot = harness.engine.protocol_snapshot().unwrap();
    assert_eq!(snapshot.total_collateral_value_usd, wad(20_000));
    assert_eq!(snapshot.total_debt, wad(9_000));
    assert_eq!(snapshot.unit_supply, wad(9_000));
    assert!(snapshot.is_overcollateralized());
}

#[test]
fn value_conversions_follow_the_feed() {
    let harness = Harness::new();
    let engine = &harness.engine;

    assert_eq!(engine.usd_value(&weth(), wad(15)).unwrap(), wad(30_000));
    assert_eq!(
        engine.token_amount_from_usd(&weth(), wad(100)).unwrap(),
        50_000_000_000_000_000
    );
    assert_eq!(engine.usd_value(&wbtc(), wad(2)).unwrap(), wad(2_000));

    harness.set_weth_price(4_000);
    assert_eq!(engine.usd_value(&weth(), wad(15)).unwrap(), wad(60_000));
    let quote = engine.price_quote(&weth()).unwrap();
    assert_eq!(quote.answer, usd_answer(4_000));
    assert_eq!(quote.decimals, FEED_DECIMALS);
    assert_eq!(quote.round_id, 2);
}

#[test]
fn calculate_health_factor_is_pure() {
    let harness = Harness::new();
    assert_eq!(
        harness
            .engine
            .calculate_health_factor(wad(20_000), wad(9_000))
            .unwrap(),
        1_111_111_111_111_111_111
    );
    assert_eq!(
        harness.engine.calculate_health_factor(wad(1), 0).unwrap(),
        UNBOUNDED_HEALTH_FACTOR
    );
}

#[test]
fn events_of_one_operation_share_an_id_and_chain_verifies() {
    let harness = Harness::new();
    harness
        .open_weth_position(&alice(), wad(10), wad(5_000))
        .unwrap();
    harness.engine.burn(&alice(), wad(1_000)).unwrap();

    let events = harness.engine.events().unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].operation, "deposit_and_mint");
    assert_eq!(events[0].operation_id, events[1].operation_id);
    assert_ne!(events[1].operation_id, events[2].operation_id);
    assert_eq!(events[2].operation, "burn");
    assert_eq!(events[1].previous_hash.as_deref(), Some(events[0].record_hash.as_str()));
    assert!(events.iter().enumerate().all(|(i, r)| r.index == i as u64));
    assert!(harness.engine.verify_event_chain().unwrap());

    let json = serde_json::to_value(&events[1].event).unwrap();
    assert_eq!(json["type"], "unit_minted");
    assert_eq!(json["amount"], "5000000000000000000000");
}
