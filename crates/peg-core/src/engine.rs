//! The accounting engine: collateral and debt ledgers, health enforcement and liquidation.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, LIQUIDATION_PRECISION};
use crate::error::EngineError;
use crate::events::{EngineEvent, EventLog, EventRecord};
use crate::health::HealthFactorCalculator;
use crate::journal::Settlement;
use crate::ledger::{CollateralLedger, CollateralPosition, DebtLedger};
use crate::lock::ReentrancyLock;
use crate::math::{checked_add, mul_div};
use crate::oracle::{Clock, PriceOracleAdapter, PriceSource};
use crate::registry::{CollateralAsset, CollateralListing, CollateralRegistry};
use crate::token::{MintAuthority, UnitOfAccountToken};
use crate::transaction::Transaction;
use crate::types::{
    serde_amount, AccountId, AccountInformation, Amount, AssetId, PriceQuote, ProtocolSnapshot,
};

/// Everything needed to stand up an engine. `collateral[i]` is priced by `price_sources[i]`.
pub struct EngineDeployment {
    pub config: EngineConfig,
    /// Account that holds deposited collateral and the mint authority.
    pub custody_account: AccountId,
    pub collateral: Vec<CollateralListing>,
    pub price_sources: Vec<Arc<dyn PriceSource>>,
    pub unit_token: Arc<dyn UnitOfAccountToken>,
    pub clock: Arc<dyn Clock>,
}

/// Result of a successful liquidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationOutcome {
    #[serde(with = "serde_amount")]
    pub debt_covered: Amount,
    #[serde(with = "serde_amount")]
    pub collateral_seized: Amount,
    #[serde(with = "serde_amount")]
    pub bonus_collateral: Amount,
    #[serde(with = "serde_amount")]
    pub health_factor_before: Amount,
    #[serde(with = "serde_amount")]
    pub health_factor_after: Amount,
}

#[derive(Debug, Default)]
pub(crate) struct EngineState {
    pub(crate) collateral: CollateralLedger,
    pub(crate) debts: DebtLedger,
    pub(crate) events: EventLog,
}

pub struct AccountingEngine {
    config: EngineConfig,
    health: HealthFactorCalculator,
    registry: CollateralRegistry,
    unit_token: Arc<dyn UnitOfAccountToken>,
    authority: MintAuthority,
    custody: AccountId,
    state: RwLock<EngineState>,
    lock: ReentrancyLock,
}

impl AccountingEngine {
    pub fn new(deployment: EngineDeployment) -> Result<Self, EngineError> {
        let EngineDeployment {
            config,
            custody_account,
            collateral,
            price_sources,
            unit_token,
            clock,
        } = deployment;

        config.validate()?;
        if custody_account.is_null() {
            return Err(EngineError::InvalidConfig(
                "custody account must not be null".to_string(),
            ));
        }
        if collateral.len() != price_sources.len() {
            return Err(EngineError::AssetFeedLengthMismatch {
                assets: collateral.len(),
                feeds: price_sources.len(),
            });
        }

        let assets = collateral
            .into_iter()
            .zip(price_sources)
            .map(|(listing, source)| CollateralAsset {
                oracle: PriceOracleAdapter::new(
                    listing.asset.clone(),
                    source,
                    Arc::clone(&clock),
                    config.price_timeout(),
                    config.precision,
                ),
                id: listing.asset,
                token: listing.token,
            })
            .collect();
        let registry = CollateralRegistry::new(assets)?;

        let authority = unit_token
            .grant_mint_authority(&custody_account)
            .map_err(EngineError::AuthorityUnavailable)?;

        info!(
            custody = %custody_account,
            assets = registry.len(),
            unit = unit_token.symbol(),
            liquidation_threshold = config.liquidation_threshold,
            liquidation_bonus = config.liquidation_bonus,
            "Accounting engine initialized"
        );

        Ok(Self {
            health: HealthFactorCalculator::new(&config),
            config,
            registry,
            unit_token,
            authority,
            custody: custody_account,
            state: RwLock::new(EngineState::default()),
            lock: ReentrancyLock::new(),
        })
    }

    // ----- Mutating operations -----

    pub fn deposit_collateral(
        &self,
        caller: &AccountId,
        asset: &AssetId,
        amount: Amount,
    ) -> Result<(), EngineError> {
        self.atomic("deposit_collateral", |tx| {
            self.deposit_in(tx, caller, asset, amount)
        })?;
        info!(account = %caller, asset = %asset, amount, "Collateral deposited");
        Ok(())
    }

    pub fn mint(&self, caller: &AccountId, amount: Amount) -> Result<(), EngineError> {
        self.atomic("mint", |tx| self.mint_in(tx, caller, amount))?;
        info!(account = %caller, amount, "Unit of account minted");
        Ok(())
    }

    /// Deposit then mint as one operation; the mint's health check sees the new collateral.
    pub fn deposit_and_mint(
        &self,
        caller: &AccountId,
        asset: &AssetId,
        collateral_amount: Amount,
        mint_amount: Amount,
    ) -> Result<(), EngineError> {
        self.atomic("deposit_and_mint", |tx| {
            self.deposit_in(tx, caller, asset, collateral_amount)?;
            self.mint_in(tx, caller, mint_amount)
        })?;
        info!(
            account = %caller,
            asset = %asset,
            collateral_amount,
            mint_amount,
            "Collateral deposited and unit of account minted"
        );
        Ok(())
    }

    pub fn burn(&self, caller: &AccountId, amount: Amount) -> Result<(), EngineError> {
        self.atomic("burn", |tx| {
            self.burn_in(tx, caller, caller, amount)?;
            self.ensure_healthy(caller)
        })?;
        info!(account = %caller, amount, "Unit of account burned");
        Ok(())
    }

    pub fn redeem_collateral(
        &self,
        caller: &AccountId,
        asset: &AssetId,
        amount: Amount,
    ) -> Result<(), EngineError> {
        self.atomic("redeem_collateral", |tx| {
            self.redeem_in(tx, caller, caller, asset, amount)?;
            self.ensure_healthy(caller)
        })?;
        info!(account = %caller, asset = %asset, amount, "Collateral redeemed");
        Ok(())
    }

    /// Burn then redeem as one operation.
    pub fn redeem_for_burn(
        &self,
        caller: &AccountId,
        asset: &AssetId,
        collateral_amount: Amount,
        burn_amount: Amount,
    ) -> Result<(), EngineError> {
        self.atomic("redeem_for_burn", |tx| {
            self.burn_in(tx, caller, caller, burn_amount)?;
            self.redeem_in(tx, caller, caller, asset, collateral_amount)?;
            self.ensure_healthy(caller)
        })?;
        info!(
            account = %caller,
            asset = %asset,
            collateral_amount,
            burn_amount,
            "Debt burned and collateral redeemed"
        );
        Ok(())
    }

    /// Cover `debt_to_cover` of an undercollateralized `account` and seize its collateral plus
    /// the liquidation bonus. The liquidator funds the burn from its own unit balance.
    pub fn liquidate(
        &self,
        liquidator: &AccountId,
        asset: &AssetId,
        account: &AccountId,
        debt_to_cover: Amount,
    ) -> Result<LiquidationOutcome, EngineError> {
        let outcome = self.atomic("liquidate", |tx| {
            if debt_to_cover == 0 {
                return Err(EngineError::NeedsMoreThanZero);
            }
            let collateral = self.registry.require(asset)?;

            let before = self.health_factor(account)?;
            if self.health.is_healthy(before) {
                return Err(EngineError::HealthFactorOk {
                    account: account.clone(),
                    health_factor: before,
                });
            }

            let seized = collateral.oracle.token_amount_from_usd(debt_to_cover)?;
            let bonus = mul_div(seized, self.config.liquidation_bonus, LIQUIDATION_PRECISION)?;
            let total = checked_add(seized, bonus)?;
            debug!(
                account = %account,
                asset = %asset,
                debt_to_cover,
                seized,
                bonus,
                "Computed liquidation seizure"
            );

            self.redeem_in(tx, account, liquidator, asset, total)?;
            self.burn_in(tx, account, liquidator, debt_to_cover)?;

            let after = self.health_factor(account)?;
            if after <= before {
                return Err(EngineError::HealthFactorNotImproved {
                    account: account.clone(),
                    before,
                    after,
                });
            }
            self.ensure_healthy(liquidator)?;

            tx.emit(EngineEvent::PositionLiquidated {
                account: account.clone(),
                liquidator: liquidator.clone(),
                asset: asset.clone(),
                debt_covered: debt_to_cover,
                collateral_seized: total,
            });
            Ok(LiquidationOutcome {
                debt_covered: debt_to_cover,
                collateral_seized: total,
                bonus_collateral: bonus,
                health_factor_before: before,
                health_factor_after: after,
            })
        })?;
        info!(
            account = %account,
            liquidator = %liquidator,
            asset = %asset,
            debt_covered = outcome.debt_covered,
            collateral_seized = outcome.collateral_seized,
            "Position liquidated"
        );
        Ok(outcome)
    }

    // ----- Queries -----

    pub fn get_account_information(
        &self,
        account: &AccountId,
    ) -> Result<AccountInformation, EngineError> {
        Ok(AccountInformation {
            total_debt: self.debt_of(account)?,
            collateral_value_usd: self.account_collateral_value(account)?,
        })
    }

    pub fn usd_value(&self, asset: &AssetId, amount: Amount) -> Result<Amount, EngineError> {
        self.registry.require(asset)?.oracle.usd_value(amount)
    }

    pub fn token_amount_from_usd(
        &self,
        asset: &AssetId,
        usd_amount: Amount,
    ) -> Result<Amount, EngineError> {
        self.registry
            .require(asset)?
            .oracle
            .token_amount_from_usd(usd_amount)
    }

    pub fn price_quote(&self, asset: &AssetId) -> Result<PriceQuote, EngineError> {
        self.registry.require(asset)?.oracle.fresh_quote()
    }

    pub fn health_factor(&self, account: &AccountId) -> Result<Amount, EngineError> {
        let debt = self.debt_of(account)?;
        let value = self.account_collateral_value(account)?;
        self.health.compute(value, debt)
    }

    pub fn calculate_health_factor(
        &self,
        collateral_value_usd: Amount,
        debt: Amount,
    ) -> Result<Amount, EngineError> {
        self.health.compute(collateral_value_usd, debt)
    }

    /// USD value of everything `account` has deposited. Zero balances are not priced.
    pub fn account_collateral_value(&self, account: &AccountId) -> Result<Amount, EngineError> {
        let holdings: Vec<(&CollateralAsset, Amount)> = {
            let state = self.read_state()?;
            let holdings = self
                .registry
                .iter()
                .map(|asset| (asset, state.collateral.balance(account, &asset.id)))
                .filter(|(_, amount)| *amount > 0)
                .collect();
            holdings
        };
        holdings
            .into_iter()
            .try_fold(0, |total, (asset, amount)| {
                checked_add(total, asset.oracle.usd_value(amount)?)
            })
    }

    pub fn collateral_balance_of(
        &self,
        account: &AccountId,
        asset: &AssetId,
    ) -> Result<Amount, EngineError> {
        Ok(self.read_state()?.collateral.balance(account, asset))
    }

    /// Non-zero deposits of `account`, in listing order.
    pub fn positions(&self, account: &AccountId) -> Result<Vec<CollateralPosition>, EngineError> {
        let state = self.read_state()?;
        Ok(self
            .registry
            .iter()
            .map(|asset| CollateralPosition {
                asset: asset.id.clone(),
                amount: state.collateral.balance(account, &asset.id),
            })
            .filter(|position| position.amount > 0)
            .collect())
    }

    pub fn debt_of(&self, account: &AccountId) -> Result<Amount, EngineError> {
        Ok(self.read_state()?.debts.debt(account))
    }

    pub fn collateral_assets(&self) -> Vec<AssetId> {
        self.registry.ids()
    }

    pub fn is_allowed(&self, asset: &AssetId) -> bool {
        self.registry.is_allowed(asset)
    }

    /// Protocol-wide totals. Prices every asset with deposits, so a stale feed fails the call.
    pub fn protocol_snapshot(&self) -> Result<ProtocolSnapshot, EngineError> {
        let (totals, total_debt): (Vec<(&CollateralAsset, Amount)>, Amount) = {
            let state = self.read_state()?;
            let totals = self
                .registry
                .iter()
                .map(|asset| (asset, state.collateral.total(&asset.id)))
                .filter(|(_, amount)| *amount > 0)
                .collect();
            (totals, state.debts.total())
        };
        let total_collateral_value_usd = totals
            .into_iter()
            .try_fold(0, |acc, (asset, amount)| {
                checked_add(acc, asset.oracle.usd_value(amount)?)
            })?;
        Ok(ProtocolSnapshot {
            total_collateral_value_usd,
            total_debt,
            unit_supply: self.unit_token.total_supply(),
        })
    }

    pub fn events(&self) -> Result<Vec<EventRecord>, EngineError> {
        Ok(self.read_state()?.events.records().to_vec())
    }

    pub fn verify_event_chain(&self) -> Result<bool, EngineError> {
        Ok(self.read_state()?.events.verify_chain())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn custody_account(&self) -> &AccountId {
        &self.custody
    }

    pub fn min_health_factor(&self) -> Amount {
        self.health.min_health_factor()
    }

    // ----- Internals -----

    pub(crate) fn registry(&self) -> &CollateralRegistry {
        &self.registry
    }

    pub(crate) fn unit_token(&self) -> &Arc<dyn UnitOfAccountToken> {
        &self.unit_token
    }

    pub(crate) fn mint_authority(&self) -> &MintAuthority {
        &self.authority
    }

    pub(crate) fn state(&self) -> &RwLock<EngineState> {
        &self.state
    }

    pub(crate) fn read_state(&self) -> Result<RwLockReadGuard<'_, EngineState>, EngineError> {
        self.state.read().map_err(|_| EngineError::LockPoisoned)
    }

    pub(crate) fn write_state(&self) -> Result<RwLockWriteGuard<'_, EngineState>, EngineError> {
        self.state.write().map_err(|_| EngineError::LockPoisoned)
    }

    /// Run `body` under the reentrancy lock; settle and commit on success, roll back on failure.
    fn atomic<T>(
        &self,
        operation: &'static str,
        body: impl FnOnce(&mut Transaction<'_>) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let _guard = self.lock.enter(operation)?;
        let mut tx = Transaction::begin(self, operation);
        match body(&mut tx).and_then(|value| tx.settle().map(|()| value)) {
            Ok(value) => {
                let records = tx.commit();
                debug!(operation, events = records.len(), "Operation committed");
                Ok(value)
            }
            Err(err) => {
                warn!(operation, error = %err, "Operation reverted");
                tx.rollback();
                Err(err)
            }
        }
    }

    fn ensure_healthy(&self, account: &AccountId) -> Result<(), EngineError> {
        let health_factor = self.health_factor(account)?;
        if !self.health.is_healthy(health_factor) {
            return Err(EngineError::HealthFactorIsBroken {
                account: account.clone(),
                health_factor,
            });
        }
        Ok(())
    }

    fn deposit_in(
        &self,
        tx: &mut Transaction<'_>,
        caller: &AccountId,
        asset: &AssetId,
        amount: Amount,
    ) -> Result<(), EngineError> {
        if amount == 0 {
            return Err(EngineError::NeedsMoreThanZero);
        }
        let collateral = self.registry.require(asset)?;
        tx.credit_collateral(caller, asset, amount)?;
        tx.emit(EngineEvent::CollateralDeposited {
            account: caller.clone(),
            asset: asset.clone(),
            amount,
        });
        tx.pull_collateral(collateral, caller, amount)
    }

    fn mint_in(
        &self,
        tx: &mut Transaction<'_>,
        caller: &AccountId,
        amount: Amount,
    ) -> Result<(), EngineError> {
        if amount == 0 {
            return Err(EngineError::NeedsMoreThanZero);
        }
        tx.increase_debt(caller, amount)?;
        self.ensure_healthy(caller)?;
        tx.schedule(Settlement::Mint {
            to: caller.clone(),
            amount,
        })?;
        tx.emit(EngineEvent::UnitMinted {
            account: caller.clone(),
            amount,
        });
        Ok(())
    }

    /// Retire `amount` of `on_behalf_of`'s debt using units pulled from `payer`.
    fn burn_in(
        &self,
        tx: &mut Transaction<'_>,
        on_behalf_of: &AccountId,
        payer: &AccountId,
        amount: Amount,
    ) -> Result<(), EngineError> {
        if amount == 0 {
            return Err(EngineError::NeedsMoreThanZero);
        }
        let outstanding = self.debt_of(on_behalf_of)?;
        if outstanding < amount {
            return Err(EngineError::InsufficientDebt {
                account: on_behalf_of.clone(),
                requested: amount,
                outstanding,
            });
        }
        tx.pull_unit(payer, amount)?;
        tx.burn_unit(amount)?;
        tx.decrease_debt(on_behalf_of, amount)?;
        tx.emit(EngineEvent::UnitBurned {
            on_behalf_of: on_behalf_of.clone(),
            payer: payer.clone(),
            amount,
        });
        Ok(())
    }

    /// Move `amount` of `from`'s collateral out of the ledger and schedule its payout to `to`.
    fn redeem_in(
        &self,
        tx: &mut Transaction<'_>,
        from: &AccountId,
        to: &AccountId,
        asset: &AssetId,
        amount: Amount,
    ) -> Result<(), EngineError> {
        if amount == 0 {
            return Err(EngineError::NeedsMoreThanZero);
        }
        self.registry.require(asset)?;
        tx.debit_collateral(from, asset, amount)?;
        tx.emit(EngineEvent::CollateralRedeemed {
            from: from.clone(),
            to: to.clone(),
            asset: asset.clone(),
            amount,
        });
        tx.schedule(Settlement::Payout {
            asset: asset.clone(),
            to: to.clone(),
            amount,
        })
    }
}

impl std::fmt::Debug for AccountingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountingEngine")
            .field("config", &self.config)
            .field("custody", &self.custody)
            .field("registry", &self.registry)
            .field("unit", &self.unit_token.symbol())
            .finish()
    }
}
