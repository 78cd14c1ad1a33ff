//! Property tests: a failed operation leaves ledgers, token balances and the event log exactly
//! as they were.

use peg_core::*;
use peg_tests::*;
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// An open WETH position: (collateral in whole WETH, debt in whole units) with HF >= 1 at $2000.
fn arb_position() -> impl Strategy<Value = (Amount, Amount)> {
    (1u128..=50).prop_flat_map(|weth_units| {
        let max_debt = weth_units * 1_000;
        (Just(weth_units), 1u128..=max_debt)
    })
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any redeem either keeps the account healthy or is reverted in full.
    #[test]
    fn failed_redeems_leave_state_unchanged(
        (weth_units, debt_units) in arb_position(),
        redeem_milli in 1u128..=100_000,
    ) {
        let harness = Harness::new();
        harness.open_weth_position(&alice(), wad(weth_units), wad(debt_units)).unwrap();
        let redeem = redeem_milli * 1_000_000_000_000_000;
        let before = harness.snapshot(&[alice()]);

        match harness.engine.redeem_collateral(&alice(), &weth(), redeem) {
            Ok(()) => {
                let health_factor = harness.engine.health_factor(&alice()).unwrap();
                prop_assert!(health_factor >= harness.engine.min_health_factor());
                prop_assert_eq!(
                    harness.engine.collateral_balance_of(&alice(), &weth()).unwrap(),
                    wad(weth_units) - redeem
                );
                prop_assert_eq!(harness.weth.balance_of(&alice()), redeem);
            }
            Err(err) => {
                let expected = matches!(
                    err,
                    EngineError::HealthFactorIsBroken { .. }
                        | EngineError::InsufficientCollateral { .. }
                );
                prop_assert!(expected, "unexpected error: {:?}", err);
                prop_assert_eq!(harness.snapshot(&[alice()]), before);
            }
        }
    }

    /// A mint that breaks health inside deposit_and_mint also reverts the deposit.
    #[test]
    fn failed_composite_mints_revert_the_deposit(
        weth_units in 1u128..=50,
        excess in 1u128..=10_000,
    ) {
        let harness = Harness::new();
        harness.fund_weth(&alice(), wad(weth_units));
        let before = harness.snapshot(&[alice()]);

        let debt = wad(weth_units * 1_000 + excess);
        let result = harness.engine.deposit_and_mint(&alice(), &weth(), wad(weth_units), debt);
        let is_broken = matches!(result, Err(EngineError::HealthFactorIsBroken { .. }));
        prop_assert!(is_broken);
        prop_assert_eq!(harness.snapshot(&[alice()]), before);
    }
}
