//! Internal position book-keeping: collateral per (account, asset) and debt per account.
//!
//! Absent entries read as zero and zero balances are dropped, so the maps only ever hold
//! live positions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::{serde_amount, AccountId, Amount, AssetId};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollateralLedger {
    balances: HashMap<(AccountId, AssetId), Amount>,
}

impl CollateralLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, account: &AccountId, asset: &AssetId) -> Amount {
        self.balances
            .get(&(account.clone(), asset.clone()))
            .copied()
            .unwrap_or(0)
    }

    pub fn credit(
        &mut self,
        account: &AccountId,
        asset: &AssetId,
        amount: Amount,
    ) -> Result<Amount, EngineError> {
        let entry = self
            .balances
            .entry((account.clone(), asset.clone()))
            .or_insert(0);
        *entry = entry.checked_add(amount).ok_or(EngineError::MathOverflow)?;
        Ok(*entry)
    }

    /// Remove `amount` from the position; fails without mutating when the balance is short.
    pub fn debit(
        &mut self,
        account: &AccountId,
        asset: &AssetId,
        amount: Amount,
    ) -> Result<Amount, EngineError> {
        let key = (account.clone(), asset.clone());
        let available = self.balances.get(&key).copied().unwrap_or(0);
        let remaining =
            available
                .checked_sub(amount)
                .ok_or_else(|| EngineError::InsufficientCollateral {
                    account: account.clone(),
                    asset: asset.clone(),
                    requested: amount,
                    available,
                })?;
        if remaining == 0 {
            self.balances.remove(&key);
        } else {
            self.balances.insert(key, remaining);
        }
        Ok(remaining)
    }

    /// Sum of all accounts' deposits of `asset`.
    pub fn total(&self, asset: &AssetId) -> Amount {
        self.balances
            .iter()
            .filter(|((_, a), _)| a == asset)
            .fold(0u128, |acc, (_, amount)| acc.saturating_add(*amount))
    }

}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DebtLedger {
    debts: HashMap<AccountId, Amount>,
}

impl DebtLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debt(&self, account: &AccountId) -> Amount {
        self.debts.get(account).copied().unwrap_or(0)
    }

    pub fn increase(&mut self, account: &AccountId, amount: Amount) -> Result<Amount, EngineError> {
        let entry = self.debts.entry(account.clone()).or_insert(0);
        *entry = entry.checked_add(amount).ok_or(EngineError::MathOverflow)?;
        Ok(*entry)
    }

    pub fn decrease(&mut self, account: &AccountId, amount: Amount) -> Result<Amount, EngineError> {
        let outstanding = self.debt(account);
        let remaining =
            outstanding
                .checked_sub(amount)
                .ok_or_else(|| EngineError::InsufficientDebt {
                    account: account.clone(),
                    requested: amount,
                    outstanding,
                })?;
        if remaining == 0 {
            self.debts.remove(account);
        } else {
            self.debts.insert(account.clone(), remaining);
        }
        Ok(remaining)
    }

    pub fn total(&self) -> Amount {
        self.debts
            .values()
            .fold(0u128, |acc, amount| acc.saturating_add(*amount))
    }
}

/// One row of a position listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralPosition {
    pub asset: AssetId,
    #[serde(with = "serde_amount")]
    pub amount: Amount,
}
