//! Journaled execution of one engine operation.
//!
//! Ledger mutations are applied immediately (under short write-lock sections, never across a
//! token call) and journaled. Outbound transfers and mints are deferred until the operation's
//! checks have all passed. Failure replays the journal in reverse.
//!
//! Ledger state is not isolated: queries from other threads read balances and debts of an
//! operation still in flight, including effects that a later failure rolls back. Only the event
//! log is committed atomically. Callers that need a consistent view read events, or retry
//! queries after the mutating call has returned.

use std::sync::RwLock;

use tracing::{debug, error};

use crate::engine::{AccountingEngine, EngineState};
use crate::error::EngineError;
use crate::events::{EngineEvent, EventRecord};
use crate::journal::{Journal, JournalEntry, Settlement};
use crate::registry::CollateralAsset;
use crate::types::{AccountId, Amount, AssetId};

pub(crate) struct Transaction<'e> {
    engine: &'e AccountingEngine,
    operation: &'static str,
    journal: Journal,
    settlement: Option<Settlement>,
    events: Vec<EngineEvent>,
}

impl<'e> Transaction<'e> {
    pub(crate) fn begin(engine: &'e AccountingEngine, operation: &'static str) -> Self {
        Self {
            engine,
            operation,
            journal: Journal::new(),
            settlement: None,
            events: Vec::new(),
        }
    }

    pub(crate) fn emit(&mut self, event: EngineEvent) {
        self.events.push(event);
    }

    // ----- Ledger effects -----

    pub(crate) fn credit_collateral(
        &mut self,
        account: &AccountId,
        asset: &AssetId,
        amount: Amount,
    ) -> Result<(), EngineError> {
        self.engine
            .write_state()?
            .collateral
            .credit(account, asset, amount)?;
        self.journal.record(JournalEntry::CollateralCredited {
            account: account.clone(),
            asset: asset.clone(),
            amount,
        });
        Ok(())
    }

    pub(crate) fn debit_collateral(
        &mut self,
        account: &AccountId,
        asset: &AssetId,
        amount: Amount,
    ) -> Result<(), EngineError> {
        self.engine
            .write_state()?
            .collateral
            .debit(account, asset, amount)?;
        self.journal.record(JournalEntry::CollateralDebited {
            account: account.clone(),
            asset: asset.clone(),
            amount,
        });
        Ok(())
    }

    pub(crate) fn increase_debt(
        &mut self,
        account: &AccountId,
        amount: Amount,
    ) -> Result<(), EngineError> {
        self.engine.write_state()?.debts.increase(account, amount)?;
        self.journal.record(JournalEntry::DebtIncreased {
            account: account.clone(),
            amount,
        });
        Ok(())
    }

    pub(crate) fn decrease_debt(
        &mut self,
        account: &AccountId,
        amount: Amount,
    ) -> Result<(), EngineError> {
        self.engine.write_state()?.debts.decrease(account, amount)?;
        self.journal.record(JournalEntry::DebtDecreased {
            account: account.clone(),
            amount,
        });
        Ok(())
    }

    // ----- Token effects -----

    /// Pull collateral from `from` into custody using the allowance granted to the custody account.
    pub(crate) fn pull_collateral(
        &mut self,
        asset: &CollateralAsset,
        from: &AccountId,
        amount: Amount,
    ) -> Result<(), EngineError> {
        let custody = self.engine.custody_account();
        asset
            .token
            .transfer_from(custody, from, custody, amount)
            .map_err(|source| EngineError::TransferFailed {
                token: asset.token.symbol().to_string(),
                source,
            })?;
        self.journal.record(JournalEntry::AssetReceived {
            asset: asset.id.clone(),
            from: from.clone(),
            amount,
        });
        Ok(())
    }

    pub(crate) fn pull_unit(&mut self, from: &AccountId, amount: Amount) -> Result<(), EngineError> {
        let custody = self.engine.custody_account();
        let unit = self.engine.unit_token();
        unit.transfer_from(custody, from, custody, amount)
            .map_err(|source| EngineError::TransferFailed {
                token: unit.symbol().to_string(),
                source,
            })?;
        self.journal.record(JournalEntry::UnitReceived {
            from: from.clone(),
            amount,
        });
        Ok(())
    }

    pub(crate) fn burn_unit(&mut self, amount: Amount) -> Result<(), EngineError> {
        self.engine
            .unit_token()
            .burn(self.engine.mint_authority(), amount)
            .map_err(EngineError::BurnFailed)?;
        self.journal.record(JournalEntry::UnitBurned { amount });
        Ok(())
    }

    // ----- Settlement -----

    pub(crate) fn schedule(&mut self, settlement: Settlement) -> Result<(), EngineError> {
        if self.settlement.is_some() {
            return Err(EngineError::SettlementAlreadyScheduled);
        }
        self.settlement = Some(settlement);
        Ok(())
    }

    /// Execute the deferred outbound effect, if any.
    pub(crate) fn settle(&mut self) -> Result<(), EngineError> {
        // A settled effect is final; it must not happen once its events cannot be recorded.
        ensure_writable(self.engine.state())?;
        let Some(settlement) = self.settlement.take() else {
            return Ok(());
        };
        debug!(operation = self.operation, ?settlement, "Executing settlement");
        match settlement {
            Settlement::Payout { asset, to, amount } => {
                let collateral = self.engine.registry().require(&asset)?;
                collateral
                    .token
                    .transfer(self.engine.custody_account(), &to, amount)
                    .map_err(|source| EngineError::TransferFailed {
                        token: collateral.token.symbol().to_string(),
                        source,
                    })
            }
            Settlement::Mint { to, amount } => self
                .engine
                .unit_token()
                .mint(self.engine.mint_authority(), &to, amount)
                .map_err(EngineError::MintFailed),
        }
    }

    /// Publish buffered events. Effects are already in place, so this cannot fail.
    pub(crate) fn commit(self) -> Vec<EventRecord> {
        append_committed(self.engine.state(), self.operation, self.events)
    }

    /// Undo every journaled effect, newest first. Buffered events are discarded.
    pub(crate) fn rollback(mut self) {
        let engine = self.engine;
        let operation = self.operation;
        let undone = self.journal.len();
        for entry in self.journal.drain_for_undo() {
            if let Err(err) = undo(engine, &entry) {
                error!(
                    operation,
                    step = entry.kind(),
                    error = %err,
                    "Compensation failed during rollback"
                );
            }
        }
        debug!(operation, undone, "Rolled back operation");
    }
}

fn ensure_writable(state: &RwLock<EngineState>) -> Result<(), EngineError> {
    if state.is_poisoned() {
        return Err(EngineError::LockPoisoned);
    }
    Ok(())
}

fn append_committed(
    state: &RwLock<EngineState>,
    operation: &str,
    events: Vec<EngineEvent>,
) -> Vec<EventRecord> {
    let mut state = state.write().unwrap_or_else(|poisoned| {
        error!(operation, "Engine state lock poisoned after settlement; recording events");
        poisoned.into_inner()
    });
    state.events.append_batch(operation, events)
}

fn undo(engine: &AccountingEngine, entry: &JournalEntry) -> Result<(), EngineError> {
    let custody = engine.custody_account();
    match entry {
        JournalEntry::CollateralCredited {
            account,
            asset,
            amount,
        } => engine
            .write_state()?
            .collateral
            .debit(account, asset, *amount)
            .map(|_| ()),
        JournalEntry::CollateralDebited {
            account,
            asset,
            amount,
        } => engine
            .write_state()?
            .collateral
            .credit(account, asset, *amount)
            .map(|_| ()),
        JournalEntry::DebtIncreased { account, amount } => engine
            .write_state()?
            .debts
            .decrease(account, *amount)
            .map(|_| ()),
        JournalEntry::DebtDecreased { account, amount } => engine
            .write_state()?
            .debts
            .increase(account, *amount)
            .map(|_| ()),
        JournalEntry::AssetReceived {
            asset,
            from,
            amount,
        } => {
            let collateral = engine.registry().require(asset)?;
            collateral
                .token
                .transfer(custody, from, *amount)
                .map_err(|source| EngineError::TransferFailed {
                    token: collateral.token.symbol().to_string(),
                    source,
                })
        }
        JournalEntry::UnitReceived { from, amount } => {
            let unit = engine.unit_token();
            unit.transfer(custody, from, *amount)
                .map_err(|source| EngineError::TransferFailed {
                    token: unit.symbol().to_string(),
                    source,
                })
        }
        JournalEntry::UnitBurned { amount } => engine
            .unit_token()
            .mint(engine.mint_authority(), custody, *amount)
            .map_err(EngineError::MintFailed),
    }
}
