use thiserror::Error;

use crate::types::{AccountId, Amount, AssetId};

/// Errors from the accounting engine.
///
/// Every variant aborts the enclosing operation; all of its effects are rolled back.
#[derive(Debug, Error)]
pub enum EngineError {
    // --- Validation ---
    #[error("amount must be more than zero")]
    NeedsMoreThanZero,

    #[error("collateral asset not allowed: {0}")]
    NotAllowedToken(AssetId),

    #[error("asset and price source lists differ in length: {assets} assets, {feeds} price sources")]
    AssetFeedLengthMismatch { assets: usize, feeds: usize },

    #[error("collateral asset listed more than once: {0}")]
    DuplicateCollateralAsset(AssetId),

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    // --- Invariant violations ---
    #[error("health factor of {account} is broken: {health_factor}")]
    HealthFactorIsBroken {
        account: AccountId,
        health_factor: Amount,
    },

    #[error("health factor of {account} is ok ({health_factor}); position cannot be liquidated")]
    HealthFactorOk {
        account: AccountId,
        health_factor: Amount,
    },

    #[error("liquidation did not improve health factor of {account}: {before} -> {after}")]
    HealthFactorNotImproved {
        account: AccountId,
        before: Amount,
        after: Amount,
    },

    #[error("insufficient {asset} collateral for {account}: requested {requested}, deposited {available}")]
    InsufficientCollateral {
        account: AccountId,
        asset: AssetId,
        requested: Amount,
        available: Amount,
    },

    #[error("insufficient debt for {account}: requested {requested}, outstanding {outstanding}")]
    InsufficientDebt {
        account: AccountId,
        requested: Amount,
        outstanding: Amount,
    },

    // --- External-call failures ---
    #[error("transfer of {token} failed: {source}")]
    TransferFailed { token: String, source: TokenError },

    #[error("unit-of-account mint failed: {0}")]
    MintFailed(#[source] TokenError),

    #[error("unit-of-account burn failed: {0}")]
    BurnFailed(#[source] TokenError),

    #[error("mint authority could not be obtained: {0}")]
    AuthorityUnavailable(#[source] TokenError),

    // --- Oracle failures ---
    #[error("price for {asset} is stale: last update {age_secs}s ago")]
    StalePrice { asset: AssetId, age_secs: i64 },

    #[error("price source for {asset} reported a non-positive answer: {answer}")]
    InvalidPrice { asset: AssetId, answer: i128 },

    #[error("price source for {asset} unavailable: {source}")]
    PriceSourceUnavailable { asset: AssetId, source: OracleError },

    // --- Engine internals ---
    #[error("reentrant call rejected")]
    ReentrantCall,

    #[error("arithmetic overflow")]
    MathOverflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("engine state lock poisoned")]
    LockPoisoned,

    #[error("a settlement is already scheduled for this operation")]
    SettlementAlreadyScheduled,
}

/// Error taxonomy used by callers that need to classify failures (e.g. HTTP mapping).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Invariant,
    External,
    Oracle,
    Internal,
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NeedsMoreThanZero
            | Self::NotAllowedToken(_)
            | Self::AssetFeedLengthMismatch { .. }
            | Self::DuplicateCollateralAsset(_)
            | Self::InvalidConfig(_) => ErrorCategory::Validation,
            Self::HealthFactorIsBroken { .. }
            | Self::HealthFactorOk { .. }
            | Self::HealthFactorNotImproved { .. }
            | Self::InsufficientCollateral { .. }
            | Self::InsufficientDebt { .. } => ErrorCategory::Invariant,
            Self::TransferFailed { .. }
            | Self::MintFailed(_)
            | Self::BurnFailed(_)
            | Self::AuthorityUnavailable(_) => ErrorCategory::External,
            Self::StalePrice { .. }
            | Self::InvalidPrice { .. }
            | Self::PriceSourceUnavailable { .. } => ErrorCategory::Oracle,
            Self::ReentrantCall
            | Self::MathOverflow
            | Self::DivisionByZero
            | Self::LockPoisoned
            | Self::SettlementAlreadyScheduled => ErrorCategory::Internal,
        }
    }
}

/// Failures reported by fungible-token collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("insufficient balance for {account}: needed {needed}, available {available}")]
    InsufficientBalance {
        account: AccountId,
        needed: Amount,
        available: Amount,
    },

    #[error("insufficient allowance from {owner} to {spender}: needed {needed}, available {available}")]
    InsufficientAllowance {
        owner: AccountId,
        spender: AccountId,
        needed: Amount,
        available: Amount,
    },

    #[error("null account not permitted")]
    NullAccount,

    #[error("amount must be more than zero")]
    ZeroAmount,

    #[error("caller does not hold the mint authority")]
    Unauthorized,

    #[error("mint authority has already been granted")]
    AuthorityAlreadyGranted,

    #[error("token supply overflow")]
    Overflow,

    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// Failures reported by price sources.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("no round data available")]
    NoData,

    #[error("price source unreachable: {0}")]
    Unreachable(String),
}
