//! Inverse-action journal for one engine operation.

use crate::types::{AccountId, Amount, AssetId};

/// One applied effect, recorded so it can be undone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    CollateralCredited {
        account: AccountId,
        asset: AssetId,
        amount: Amount,
    },
    CollateralDebited {
        account: AccountId,
        asset: AssetId,
        amount: Amount,
    },
    DebtIncreased {
        account: AccountId,
        amount: Amount,
    },
    DebtDecreased {
        account: AccountId,
        amount: Amount,
    },
    /// Collateral pulled into custody; undone by transferring it back.
    AssetReceived {
        asset: AssetId,
        from: AccountId,
        amount: Amount,
    },
    /// Unit of account pulled into custody; undone by transferring it back.
    UnitReceived { from: AccountId, amount: Amount },
    /// Unit of account destroyed from custody; undone by re-minting to custody.
    UnitBurned { amount: Amount },
}

impl JournalEntry {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CollateralCredited { .. } => "collateral_credited",
            Self::CollateralDebited { .. } => "collateral_debited",
            Self::DebtIncreased { .. } => "debt_increased",
            Self::DebtDecreased { .. } => "debt_decreased",
            Self::AssetReceived { .. } => "asset_received",
            Self::UnitReceived { .. } => "unit_received",
            Self::UnitBurned { .. } => "unit_burned",
        }
    }
}

/// Outbound effect the engine cannot take back on its own authority.
///
/// Executed once, after every check of the operation has passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Payout {
        asset: AssetId,
        to: AccountId,
        amount: Amount,
    },
    Mint {
        to: AccountId,
        amount: Amount,
    },
}

#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries newest first, the order in which they must be undone.
    pub fn drain_for_undo(&mut self) -> impl Iterator<Item = JournalEntry> + '_ {
        self.entries.drain(..).rev()
    }
}
