//! In-memory collaborators for the peg engine: fungible tokens, the unit-of-account token,
//! round-based price feeds and a manually driven clock.

#![deny(unsafe_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use peg_core::{
    AccountId, Amount, Clock, FungibleToken, MintAuthority, OracleError, PriceQuote, PriceSource,
    TokenError, UnitOfAccountToken,
};
use tracing::debug;
use uuid::Uuid;

fn recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ----- Fungible tokens -----

#[derive(Debug, Default)]
struct TokenBook {
    balances: HashMap<AccountId, Amount>,
    allowances: HashMap<(AccountId, AccountId), Amount>,
    total_supply: Amount,
    frozen: HashSet<AccountId>,
}

impl TokenBook {
    fn balance(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn move_balance(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError> {
        if to.is_null() {
            return Err(TokenError::NullAccount);
        }
        for account in [from, to] {
            if self.frozen.contains(account) {
                return Err(TokenError::Rejected(format!("account {account} is frozen")));
            }
        }
        let available = self.balance(from);
        if available < amount {
            return Err(TokenError::InsufficientBalance {
                account: from.clone(),
                needed: amount,
                available,
            });
        }
        self.balances.insert(from.clone(), available - amount);
        let credited = self
            .balance(to)
            .checked_add(amount)
            .ok_or(TokenError::Overflow)?;
        self.balances.insert(to.clone(), credited);
        Ok(())
    }

    fn create(&mut self, to: &AccountId, amount: Amount) -> Result<(), TokenError> {
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(TokenError::Overflow)?;
        let balance = self
            .balance(to)
            .checked_add(amount)
            .ok_or(TokenError::Overflow)?;
        self.total_supply = supply;
        self.balances.insert(to.clone(), balance);
        Ok(())
    }

    fn destroy(&mut self, from: &AccountId, amount: Amount) -> Result<(), TokenError> {
        let available = self.balance(from);
        if available < amount {
            return Err(TokenError::InsufficientBalance {
                account: from.clone(),
                needed: amount,
                available,
            });
        }
        self.balances.insert(from.clone(), available - amount);
        self.total_supply -= amount;
        Ok(())
    }
}

/// Allowance-based fungible token held entirely in memory.
///
/// A `spender` allowance of `Amount::MAX` is treated as unlimited and never decremented.
#[derive(Debug)]
pub struct InMemoryToken {
    symbol: String,
    decimals: u8,
    book: Mutex<TokenBook>,
}

impl InMemoryToken {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self::with_decimals(symbol, 18)
    }

    pub fn with_decimals(symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            decimals,
            book: Mutex::new(TokenBook::default()),
        }
    }

    /// Create `amount` out of thin air for `to`. Test and sandbox collateral only.
    pub fn faucet(&self, to: &AccountId, amount: Amount) -> Result<(), TokenError> {
        if to.is_null() {
            return Err(TokenError::NullAccount);
        }
        recover(&self.book).create(to, amount)?;
        debug!(token = %self.symbol, to = %to, amount, "Faucet mint");
        Ok(())
    }

    /// Reject every transfer touching `account` until [`InMemoryToken::unfreeze`] is called.
    pub fn freeze(&self, account: &AccountId) {
        recover(&self.book).frozen.insert(account.clone());
    }

    pub fn unfreeze(&self, account: &AccountId) {
        recover(&self.book).frozen.remove(account);
    }

    fn create(&self, to: &AccountId, amount: Amount) -> Result<(), TokenError> {
        recover(&self.book).create(to, amount)
    }

    fn destroy(&self, from: &AccountId, amount: Amount) -> Result<(), TokenError> {
        recover(&self.book).destroy(from, amount)
    }
}

impl FungibleToken for InMemoryToken {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn total_supply(&self) -> Amount {
        recover(&self.book).total_supply
    }

    fn balance_of(&self, account: &AccountId) -> Amount {
        recover(&self.book).balance(account)
    }

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        recover(&self.book)
            .allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(0)
    }

    fn approve(
        &self,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError> {
        if owner.is_null() || spender.is_null() {
            return Err(TokenError::NullAccount);
        }
        recover(&self.book)
            .allowances
            .insert((owner.clone(), spender.clone()), amount);
        Ok(())
    }

    fn transfer(&self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<(), TokenError> {
        recover(&self.book).move_balance(from, to, amount)
    }

    fn transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError> {
        let mut book = recover(&self.book);
        let key = (from.clone(), spender.clone());
        let allowed = book.allowances.get(&key).copied().unwrap_or(0);
        if allowed < amount {
            return Err(TokenError::InsufficientAllowance {
                owner: from.clone(),
                spender: spender.clone(),
                needed: amount,
                available: allowed,
            });
        }
        book.move_balance(from, to, amount)?;
        if allowed != Amount::MAX {
            book.allowances.insert(key, allowed - amount);
        }
        Ok(())
    }
}

/// Token that rejects every transfer. Balances and allowances still work.
#[derive(Debug)]
pub struct FailingToken {
    inner: InMemoryToken,
    reason: String,
}

impl FailingToken {
    pub fn new(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            inner: InMemoryToken::new(symbol),
            reason: reason.into(),
        }
    }

    pub fn faucet(&self, to: &AccountId, amount: Amount) -> Result<(), TokenError> {
        self.inner.faucet(to, amount)
    }
}

impl FungibleToken for FailingToken {
    fn symbol(&self) -> &str {
        self.inner.symbol()
    }

    fn total_supply(&self) -> Amount {
        self.inner.total_supply()
    }

    fn balance_of(&self, account: &AccountId) -> Amount {
        self.inner.balance_of(account)
    }

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.inner.allowance(owner, spender)
    }

    fn approve(
        &self,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError> {
        self.inner.approve(owner, spender, amount)
    }

    fn transfer(&self, _from: &AccountId, _to: &AccountId, _amount: Amount) -> Result<(), TokenError> {
        Err(TokenError::Rejected(self.reason.clone()))
    }

    fn transfer_from(
        &self,
        _spender: &AccountId,
        _from: &AccountId,
        _to: &AccountId,
        _amount: Amount,
    ) -> Result<(), TokenError> {
        Err(TokenError::Rejected(self.reason.clone()))
    }
}

// ----- Unit of account -----

/// The unit-of-account token. Mint authority can be granted exactly once.
#[derive(Debug)]
pub struct UnitToken {
    ledger: InMemoryToken,
    authority: Mutex<Option<Uuid>>,
    mint_paused: AtomicBool,
}

impl UnitToken {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            ledger: InMemoryToken::new(symbol),
            authority: Mutex::new(None),
            mint_paused: AtomicBool::new(false),
        }
    }

    /// While paused every mint is rejected. Burns are unaffected.
    pub fn set_mint_paused(&self, paused: bool) {
        self.mint_paused.store(paused, Ordering::SeqCst);
    }

    pub fn freeze(&self, account: &AccountId) {
        self.ledger.freeze(account);
    }

    pub fn unfreeze(&self, account: &AccountId) {
        self.ledger.unfreeze(account);
    }

    pub fn authority_granted(&self) -> bool {
        recover(&self.authority).is_some()
    }

    fn authorize(&self, authority: &MintAuthority) -> Result<(), TokenError> {
        if authority.matches(*recover(&self.authority)) {
            Ok(())
        } else {
            Err(TokenError::Unauthorized)
        }
    }
}

impl FungibleToken for UnitToken {
    fn symbol(&self) -> &str {
        self.ledger.symbol()
    }

    fn total_supply(&self) -> Amount {
        self.ledger.total_supply()
    }

    fn balance_of(&self, account: &AccountId) -> Amount {
        self.ledger.balance_of(account)
    }

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.ledger.allowance(owner, spender)
    }

    fn approve(
        &self,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError> {
        self.ledger.approve(owner, spender, amount)
    }

    fn transfer(&self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<(), TokenError> {
        self.ledger.transfer(from, to, amount)
    }

    fn transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError> {
        self.ledger.transfer_from(spender, from, to, amount)
    }
}

impl UnitOfAccountToken for UnitToken {
    fn grant_mint_authority(&self, holder: &AccountId) -> Result<MintAuthority, TokenError> {
        if holder.is_null() {
            return Err(TokenError::NullAccount);
        }
        let mut recorded = recover(&self.authority);
        if recorded.is_some() {
            return Err(TokenError::AuthorityAlreadyGranted);
        }
        let authority = MintAuthority::issue(holder.clone());
        *recorded = Some(authority.grant_id());
        debug!(token = %self.symbol(), holder = %holder, "Mint authority granted");
        Ok(authority)
    }

    fn mint(
        &self,
        authority: &MintAuthority,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError> {
        self.authorize(authority)?;
        if to.is_null() {
            return Err(TokenError::NullAccount);
        }
        if amount == 0 {
            return Err(TokenError::ZeroAmount);
        }
        if self.mint_paused.load(Ordering::SeqCst) {
            return Err(TokenError::Rejected("minting is paused".to_string()));
        }
        self.ledger.create(to, amount)
    }

    fn burn(&self, authority: &MintAuthority, amount: Amount) -> Result<(), TokenError> {
        self.authorize(authority)?;
        if amount == 0 {
            return Err(TokenError::ZeroAmount);
        }
        self.ledger.destroy(authority.holder(), amount)
    }
}

// ----- Price feeds and time -----

#[derive(Debug, Clone)]
struct Round {
    round_id: u64,
    answer: i128,
    updated_at: DateTime<Utc>,
}

/// Round-based price feed whose answers are pushed by the caller.
pub struct MockPriceFeed {
    decimals: u8,
    clock: Arc<dyn Clock>,
    round: Mutex<Round>,
    unavailable: AtomicBool,
}

impl MockPriceFeed {
    /// Start at round 1 with `initial_answer`, stamped with the clock's current time.
    pub fn new(decimals: u8, initial_answer: i128, clock: Arc<dyn Clock>) -> Self {
        let updated_at = clock.now();
        Self {
            decimals,
            clock,
            round: Mutex::new(Round {
                round_id: 1,
                answer: initial_answer,
                updated_at,
            }),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Publish a new round with `answer` at the clock's current time.
    pub fn update_answer(&self, answer: i128) {
        let now = self.clock.now();
        let mut round = recover(&self.round);
        round.round_id += 1;
        round.answer = answer;
        round.updated_at = now;
    }

    pub fn update_round_data(&self, round_id: u64, answer: i128, updated_at: DateTime<Utc>) {
        *recover(&self.round) = Round {
            round_id,
            answer,
            updated_at,
        };
    }

    /// Simulate an outage: `latest_round` fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn answer(&self) -> i128 {
        recover(&self.round).answer
    }
}

impl std::fmt::Debug for MockPriceFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPriceFeed")
            .field("decimals", &self.decimals)
            .field("round", &*recover(&self.round))
            .finish()
    }
}

impl PriceSource for MockPriceFeed {
    fn latest_round(&self) -> Result<PriceQuote, OracleError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(OracleError::Unreachable("feed offline".to_string()));
        }
        let round = recover(&self.round);
        Ok(PriceQuote {
            round_id: round.round_id,
            answer: round.answer,
            decimals: self.decimals,
            updated_at: round.updated_at,
        })
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn advance(&self, by: Duration) {
        let mut now = recover(&self.now);
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *recover(&self.now) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *recover(&self.now)
    }
}
