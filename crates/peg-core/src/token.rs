//! Token collaborators: fungible collateral assets and the mintable unit of account.

use uuid::Uuid;

use crate::error::TokenError;
use crate::types::{AccountId, Amount};

/// Standard fungible-token ledger (balances, allowances, transfers).
///
/// Implementations live outside the engine; the engine only calls through this trait.
pub trait FungibleToken: Send + Sync {
    fn symbol(&self) -> &str;

    fn decimals(&self) -> u8 {
        18
    }

    fn total_supply(&self) -> Amount;

    fn balance_of(&self, account: &AccountId) -> Amount;

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount;

    fn approve(
        &self,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError>;

    fn transfer(&self, from: &AccountId, to: &AccountId, amount: Amount)
        -> Result<(), TokenError>;

    /// Move `amount` from `from` to `to`, spending `spender`'s allowance.
    fn transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError>;
}

/// Unit-of-account token. Minting and burning require the [`MintAuthority`] handle.
pub trait UnitOfAccountToken: FungibleToken {
    /// Issue the mint authority to `holder`. Succeeds at most once per token.
    fn grant_mint_authority(&self, holder: &AccountId) -> Result<MintAuthority, TokenError>;

    fn mint(&self, authority: &MintAuthority, to: &AccountId, amount: Amount)
        -> Result<(), TokenError>;

    /// Destroy `amount` from the authority holder's own balance.
    fn burn(&self, authority: &MintAuthority, amount: Amount) -> Result<(), TokenError>;
}

/// Capability to mint and burn one unit-of-account token.
///
/// Neither `Clone` nor serializable: whoever holds the value holds the authority.
#[derive(Debug)]
pub struct MintAuthority {
    grant_id: Uuid,
    holder: AccountId,
}

impl MintAuthority {
    /// Create a fresh authority for `holder`. Token implementations call this inside
    /// [`UnitOfAccountToken::grant_mint_authority`] and remember [`MintAuthority::grant_id`].
    pub fn issue(holder: AccountId) -> Self {
        Self {
            grant_id: Uuid::new_v4(),
            holder,
        }
    }

    pub fn grant_id(&self) -> Uuid {
        self.grant_id
    }

    pub fn holder(&self) -> &AccountId {
        &self.holder
    }

    /// Whether this handle is the one recorded by the token at grant time.
    pub fn matches(&self, recorded: Option<Uuid>) -> bool {
        recorded == Some(self.grant_id)
    }
}
