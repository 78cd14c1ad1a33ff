//! Adversarial: token calls that fail part-way through an operation.
//!
//! Every failure must unwind the whole operation, including token effects that already
//! happened (pulled collateral, pulled and burned units).

use std::sync::Arc;

use peg_adapters::{FailingToken, ManualClock, MockPriceFeed, UnitToken};
use peg_core::*;
use peg_tests::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn transfer_failed(result: Result<impl std::fmt::Debug, EngineError>) -> bool {
    matches!(result, Err(EngineError::TransferFailed { .. }))
}

fn open_alice() -> Harness {
    let harness = Harness::new();
    harness
        .open_weth_position(&alice(), wad(10), wad(1_000))
        .unwrap();
    harness
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn token_that_rejects_transfers_cannot_be_deposited() {
    let clock = Arc::new(ManualClock::starting_now());
    let bad = Arc::new(FailingToken::new("BAD", "transfers disabled"));
    let engine = AccountingEngine::new(EngineDeployment {
        config: EngineConfig::default(),
        custody_account: custody(),
        collateral: vec![CollateralListing::new("BAD", bad.clone())],
        price_sources: vec![Arc::new(MockPriceFeed::new(
            FEED_DECIMALS,
            usd_answer(1),
            clock.clone(),
        )) as Arc<dyn PriceSource>],
        unit_token: Arc::new(UnitToken::new("pUSD")),
        clock,
    })
    .unwrap();
    bad.faucet(&alice(), wad(10)).unwrap();
    bad.approve(&alice(), &custody(), Amount::MAX).unwrap();

    let err = engine
        .deposit_collateral(&alice(), &AssetId::new("BAD"), wad(1))
        .unwrap_err();
    match err {
        EngineError::TransferFailed { token, source } => {
            assert_eq!(token, "BAD");
            assert_eq!(source, TokenError::Rejected("transfers disabled".to_string()));
        }
        other => panic!("expected TransferFailed, got {other:?}"),
    }
    assert_eq!(
        engine
            .collateral_balance_of(&alice(), &AssetId::new("BAD"))
            .unwrap(),
        0
    );
    assert!(engine.events().unwrap().is_empty());
}

#[test]
fn deposit_without_allowance_is_rejected() {
    let harness = Harness::new();
    harness.weth.faucet(&alice(), wad(5)).unwrap();

    let err = harness
        .engine
        .deposit_collateral(&alice(), &weth(), wad(5))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::TransferFailed {
            source: TokenError::InsufficientAllowance { .. },
            ..
        }
    ));
    assert_eq!(err.category(), ErrorCategory::External);
    assert_eq!(
        harness.engine.collateral_balance_of(&alice(), &weth()).unwrap(),
        0
    );
}

#[test]
fn frozen_depositor_is_rejected_until_unfrozen() {
    let harness = Harness::new();
    harness.fund_weth(&alice(), wad(5));
    harness.weth.freeze(&alice());
    let before = harness.snapshot(&[alice()]);

    assert!(transfer_failed(
        harness.engine.deposit_collateral(&alice(), &weth(), wad(5))
    ));
    assert_eq!(harness.snapshot(&[alice()]), before);

    harness.weth.unfreeze(&alice());
    harness
        .engine
        .deposit_collateral(&alice(), &weth(), wad(5))
        .unwrap();
}

#[test]
fn failed_payout_restores_the_deposit() {
    let harness = open_alice();
    harness.weth.freeze(&alice());
    let before = harness.snapshot(&[alice()]);

    assert!(transfer_failed(
        harness.engine.redeem_collateral(&alice(), &weth(), wad(1))
    ));
    assert_eq!(harness.snapshot(&[alice()]), before);
}

#[test]
fn failed_payout_after_a_burn_remints_the_units() {
    let harness = open_alice();
    harness.weth.freeze(&alice());
    let before = harness.snapshot(&[alice()]);

    assert!(transfer_failed(harness.engine.redeem_for_burn(
        &alice(),
        &weth(),
        wad(1),
        wad(500)
    )));

    let after = harness.snapshot(&[alice()]);
    assert_eq!(after, before);
    assert_eq!(harness.unit.balance_of(&alice()), wad(1_000));
    assert_eq!(harness.unit.balance_of(&custody()), 0);
    assert_eq!(harness.unit.total_supply(), wad(1_000));
}

#[test]
fn paused_mint_returns_the_collateral() {
    let harness = Harness::new();
    harness.fund_weth(&alice(), wad(10));
    harness.unit.set_mint_paused(true);
    let before = harness.snapshot(&[alice()]);

    let err = harness
        .engine
        .deposit_and_mint(&alice(), &weth(), wad(10), wad(1_000))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::MintFailed(TokenError::Rejected(_))
    ));
    assert_eq!(harness.snapshot(&[alice()]), before);
    assert_eq!(harness.weth.balance_of(&alice()), wad(10));

    harness.unit.set_mint_paused(false);
    harness
        .engine
        .deposit_and_mint(&alice(), &weth(), wad(10), wad(1_000))
        .unwrap();
}

#[test]
fn frozen_unit_holder_cannot_burn() {
    let harness = open_alice();
    harness.unit.freeze(&alice());
    let before = harness.snapshot(&[alice()]);

    assert!(transfer_failed(harness.engine.burn(&alice(), wad(100))));
    assert_eq!(harness.snapshot(&[alice()]), before);
}

#[test]
fn failed_liquidation_payout_restores_both_sides() {
    let harness = Harness::with_config(EngineConfig {
        liquidation_bonus: 10,
        ..EngineConfig::default()
    });
    harness
        .open_weth_position(&alice(), wad(10), wad(9_000))
        .unwrap();
    harness
        .open_weth_position(&liquidator(), wad(20), wad(9_000))
        .unwrap();
    harness.set_weth_price(1_500);
    harness.weth.freeze(&liquidator());
    let before = harness.snapshot(&[alice(), liquidator()]);

    assert!(transfer_failed(harness.engine.liquidate(
        &liquidator(),
        &weth(),
        &alice(),
        wad(9_000)
    )));
    assert_eq!(harness.snapshot(&[alice(), liquidator()]), before);

    harness.weth.unfreeze(&liquidator());
    harness
        .engine
        .liquidate(&liquidator(), &weth(), &alice(), wad(9_000))
        .unwrap();
}
