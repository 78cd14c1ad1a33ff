//! Shared fixtures for the end-to-end, property and adversarial suites.

use std::sync::Arc;

use chrono::Duration;
use peg_adapters::{InMemoryToken, ManualClock, MockPriceFeed, UnitToken};
use peg_core::{
    AccountId, AccountingEngine, Amount, AssetId, CollateralListing, EngineConfig,
    EngineDeployment, EngineError, FungibleToken, PriceSource, PRECISION,
};

/// Feed answers carry 8 decimals.
pub const FEED_DECIMALS: u8 = 8;

pub fn wad(units: u128) -> Amount {
    units * PRECISION
}

pub fn usd_answer(dollars: i128) -> i128 {
    dollars * 100_000_000
}

pub fn weth() -> AssetId {
    AssetId::new("WETH")
}

pub fn wbtc() -> AssetId {
    AssetId::new("WBTC")
}

pub fn alice() -> AccountId {
    AccountId::new("alice")
}

pub fn bob() -> AccountId {
    AccountId::new("bob")
}

pub fn liquidator() -> AccountId {
    AccountId::new("liquidator")
}

pub fn custody() -> AccountId {
    AccountId::new("peg-engine")
}

/// An engine over in-memory WETH ($2000) and WBTC ($1000) with a manual clock.
pub struct Harness {
    pub engine: AccountingEngine,
    pub weth: Arc<InMemoryToken>,
    pub wbtc: Arc<InMemoryToken>,
    pub weth_feed: Arc<MockPriceFeed>,
    pub wbtc_feed: Arc<MockPriceFeed>,
    pub unit: Arc<UnitToken>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::try_with_config(config).expect("engine construction")
    }

    pub fn try_with_config(config: EngineConfig) -> Result<Self, EngineError> {
        let clock = Arc::new(ManualClock::starting_now());
        let weth = Arc::new(InMemoryToken::new("WETH"));
        let wbtc = Arc::new(InMemoryToken::new("WBTC"));
        let weth_feed = Arc::new(MockPriceFeed::new(
            FEED_DECIMALS,
            usd_answer(2_000),
            clock.clone(),
        ));
        let wbtc_feed = Arc::new(MockPriceFeed::new(
            FEED_DECIMALS,
            usd_answer(1_000),
            clock.clone(),
        ));
        let unit = Arc::new(UnitToken::new("pUSD"));

        let engine = AccountingEngine::new(EngineDeployment {
            config,
            custody_account: custody(),
            collateral: vec![
                CollateralListing::new("WETH", weth.clone()),
                CollateralListing::new("WBTC", wbtc.clone()),
            ],
            price_sources: vec![
                weth_feed.clone() as Arc<dyn PriceSource>,
                wbtc_feed.clone() as Arc<dyn PriceSource>,
            ],
            unit_token: unit.clone(),
            clock: clock.clone(),
        })?;

        Ok(Self {
            engine,
            weth,
            wbtc,
            weth_feed,
            wbtc_feed,
            unit,
            clock,
        })
    }

    /// Give `account` WETH and an unlimited allowance for the custody account.
    pub fn fund_weth(&self, account: &AccountId, amount: Amount) {
        self.weth.faucet(account, amount).expect("faucet");
        self.weth
            .approve(account, &custody(), Amount::MAX)
            .expect("approve");
    }

    pub fn fund_wbtc(&self, account: &AccountId, amount: Amount) {
        self.wbtc.faucet(account, amount).expect("faucet");
        self.wbtc
            .approve(account, &custody(), Amount::MAX)
            .expect("approve");
    }

    /// Let the custody account pull `account`'s unit of account (burns, liquidations).
    pub fn approve_unit(&self, account: &AccountId) {
        self.unit
            .approve(account, &custody(), Amount::MAX)
            .expect("approve");
    }

    /// Fund, deposit `collateral` WETH and mint `debt` for `account`.
    pub fn open_weth_position(
        &self,
        account: &AccountId,
        collateral: Amount,
        debt: Amount,
    ) -> Result<(), EngineError> {
        self.fund_weth(account, collateral);
        self.approve_unit(account);
        self.engine
            .deposit_and_mint(account, &weth(), collateral, debt)
    }

    /// Publish a new WETH price stamped at the clock's current time.
    pub fn set_weth_price(&self, dollars: i128) {
        self.weth_feed.update_answer(usd_answer(dollars));
    }

    /// Move the clock past the staleness timeout without publishing new rounds.
    pub fn let_prices_go_stale(&self) {
        let timeout = self.engine.config().price_timeout();
        self.clock.advance(timeout + Duration::seconds(1));
    }

    pub fn snapshot(&self, accounts: &[AccountId]) -> StateSnapshot {
        let mut all = accounts.to_vec();
        all.push(custody());
        StateSnapshot {
            positions: all
                .iter()
                .map(|account| PositionSnapshot {
                    account: account.clone(),
                    weth_deposit: self
                        .engine
                        .collateral_balance_of(account, &weth())
                        .expect("state readable"),
                    wbtc_deposit: self
                        .engine
                        .collateral_balance_of(account, &wbtc())
                        .expect("state readable"),
                    debt: self.engine.debt_of(account).expect("state readable"),
                    weth_balance: self.weth.balance_of(account),
                    wbtc_balance: self.wbtc.balance_of(account),
                    unit_balance: self.unit.balance_of(account),
                })
                .collect(),
            unit_supply: self.unit.total_supply(),
            events: self.engine.events().expect("state readable").len(),
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Ledger entries and token balances of a set of accounts, for before/after comparisons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    pub positions: Vec<PositionSnapshot>,
    pub unit_supply: Amount,
    pub events: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionSnapshot {
    pub account: AccountId,
    pub weth_deposit: Amount,
    pub wbtc_deposit: Amount,
    pub debt: Amount,
    pub weth_balance: Amount,
    pub wbtc_balance: Amount,
    pub unit_balance: Amount,
}
