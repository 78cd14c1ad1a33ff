//! Single-step operations: deposit, redeem, mint and burn against one account.

use peg_core::*;
use peg_tests::*;

#[test]
fn deposit_then_redeem_returns_the_collateral() {
    let harness = Harness::new();
    harness.fund_weth(&alice(), wad(5));

    harness
        .engine
        .deposit_collateral(&alice(), &weth(), wad(5))
        .unwrap();
    assert_eq!(
        harness.engine.collateral_balance_of(&alice(), &weth()).unwrap(),
        wad(5)
    );
    assert_eq!(harness.weth.balance_of(&custody()), wad(5));
    assert_eq!(
        harness.engine.positions(&alice()).unwrap(),
        vec![CollateralPosition {
            asset: weth(),
            amount: wad(5),
        }]
    );

    harness
        .engine
        .redeem_collateral(&alice(), &weth(), wad(5))
        .unwrap();
    assert_eq!(
        harness.engine.collateral_balance_of(&alice(), &weth()).unwrap(),
        0
    );
    assert_eq!(harness.weth.balance_of(&alice()), wad(5));
    assert_eq!(harness.weth.balance_of(&custody()), 0);
    assert!(harness.engine.positions(&alice()).unwrap().is_empty());

    let names: Vec<&str> = harness
        .engine
        .events()
        .unwrap()
        .iter()
        .map(|r| r.event.name())
        .collect();
    assert_eq!(names, vec!["collateral_deposited", "collateral_redeemed"]);
}

#[test]
fn zero_amounts_are_rejected_everywhere() {
    let harness = Harness::new();
    harness
        .open_weth_position(&alice(), wad(10), wad(1_000))
        .unwrap();
    let engine = &harness.engine;

    assert!(matches!(
        engine.deposit_collateral(&alice(), &weth(), 0),
        Err(EngineError::NeedsMoreThanZero)
    ));
    assert!(matches!(
        engine.mint(&alice(), 0),
        Err(EngineError::NeedsMoreThanZero)
    ));
    assert!(matches!(
        engine.burn(&alice(), 0),
        Err(EngineError::NeedsMoreThanZero)
    ));
    assert!(matches!(
        engine.redeem_collateral(&alice(), &weth(), 0),
        Err(EngineError::NeedsMoreThanZero)
    ));
    assert!(matches!(
        engine.deposit_and_mint(&alice(), &weth(), 0, wad(1)),
        Err(EngineError::NeedsMoreThanZero)
    ));
}

#[test]
fn unlisted_assets_are_rejected() {
    let harness = Harness::new();
    let doge = AssetId::new("DOGE");
    let before = harness.snapshot(&[alice()]);

    assert!(matches!(
        harness.engine.deposit_collateral(&alice(), &doge, wad(1)),
        Err(EngineError::NotAllowedToken(asset)) if asset == doge
    ));
    assert!(matches!(
        harness.engine.redeem_collateral(&alice(), &doge, wad(1)),
        Err(EngineError::NotAllowedToken(_))
    ));
    assert!(matches!(
        harness.engine.usd_value(&doge, wad(1)),
        Err(EngineError::NotAllowedToken(_))
    ));
    assert_eq!(harness.snapshot(&[alice()]), before);
}

#[test]
fn redeeming_more_than_deposited_is_rejected() {
    let harness = Harness::new();
    harness.fund_weth(&alice(), wad(5));
    harness
        .engine
        .deposit_collateral(&alice(), &weth(), wad(2))
        .unwrap();

    let err = harness
        .engine
        .redeem_collateral(&alice(), &weth(), wad(3))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientCollateral {
            requested,
            available,
            ..
        } if requested == wad(3) && available == wad(2)
    ));
    assert_eq!(harness.weth.balance_of(&alice()), wad(3));
}

#[test]
fn redeem_that_breaks_health_is_rejected() {
    let harness = Harness::new();
    harness
        .open_weth_position(&alice(), wad(10), wad(9_000))
        .unwrap();
    let before = harness.snapshot(&[alice()]);

    // 9 WETH at $2000 with threshold 50 supports exactly 9000.
    let err = harness
        .engine
        .redeem_collateral(&alice(), &weth(), wad(2))
        .unwrap_err();
    assert!(matches!(err, EngineError::HealthFactorIsBroken { .. }));
    assert_eq!(harness.snapshot(&[alice()]), before);

    harness
        .engine
        .redeem_collateral(&alice(), &weth(), wad(1))
        .unwrap();
    assert_eq!(harness.engine.health_factor(&alice()).unwrap(), PRECISION);
}

#[test]
fn mint_exactly_at_the_threshold_is_allowed() {
    let harness = Harness::new();
    harness
        .open_weth_position(&alice(), wad(10), wad(9_000))
        .unwrap();

    harness.engine.mint(&alice(), wad(1_000)).unwrap();
    assert_eq!(harness.engine.health_factor(&alice()).unwrap(), PRECISION);
    assert!(matches!(
        harness.engine.mint(&alice(), 1),
        Err(EngineError::HealthFactorIsBroken { .. })
    ));
}

#[test]
fn burn_reduces_debt_and_supply() {
    let harness = Harness::new();
    harness
        .open_weth_position(&alice(), wad(10), wad(9_000))
        .unwrap();

    harness.engine.burn(&alice(), wad(4_000)).unwrap();
    assert_eq!(harness.engine.debt_of(&alice()).unwrap(), wad(5_000));
    assert_eq!(harness.unit.balance_of(&alice()), wad(5_000));
    assert_eq!(harness.unit.balance_of(&custody()), 0);
    assert_eq!(harness.unit.total_supply(), wad(5_000));
    assert_eq!(
        harness.engine.health_factor(&alice()).unwrap(),
        2 * PRECISION
    );

    harness.engine.burn(&alice(), wad(5_000)).unwrap();
    assert_eq!(
        harness.engine.health_factor(&alice()).unwrap(),
        UNBOUNDED_HEALTH_FACTOR
    );
}

#[test]
fn burning_more_than_owed_is_rejected() {
    let harness = Harness::new();
    harness
        .open_weth_position(&alice(), wad(10), wad(1_000))
        .unwrap();
    // Alice holds extra units from elsewhere but owes only 1000.
    harness
        .open_weth_position(&bob(), wad(10), wad(1_000))
        .unwrap();
    harness.unit.transfer(&bob(), &alice(), wad(1_000)).unwrap();
    let before = harness.snapshot(&[alice(), bob()]);

    let err = harness.engine.burn(&alice(), wad(1_500)).unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientDebt {
            requested,
            outstanding,
            ..
        } if requested == wad(1_500) && outstanding == wad(1_000)
    ));
    assert_eq!(harness.snapshot(&[alice(), bob()]), before);
}

#[test]
fn accounts_without_debt_have_an_unbounded_health_factor() {
    let harness = Harness::new();
    assert_eq!(
        harness.engine.health_factor(&alice()).unwrap(),
        UNBOUNDED_HEALTH_FACTOR
    );
    let info = harness.engine.get_account_information(&alice()).unwrap();
    assert_eq!(info.total_debt, 0);
    assert_eq!(info.collateral_value_usd, 0);
}
