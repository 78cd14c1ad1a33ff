//! Collateral-backed synthetic-dollar accounting engine.
//!
//! Accounts deposit approved collateral assets, mint a unit-of-account token against it and
//! must stay above a minimum health factor. Undercollateralized positions can be liquidated
//! by anyone for a bonus. Every mutating operation is reentrancy-guarded and all-or-nothing.

#![deny(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod health;
pub mod journal;
pub mod ledger;
pub mod lock;
pub mod math;
pub mod oracle;
pub mod registry;
pub mod token;
mod transaction;
pub mod types;

pub use config::{
    EngineConfig, LIQUIDATION_BONUS, LIQUIDATION_PRECISION, LIQUIDATION_THRESHOLD,
    MIN_HEALTH_FACTOR, PRECISION, PRICE_TIMEOUT_SECS,
};
pub use engine::{AccountingEngine, EngineDeployment, LiquidationOutcome};
pub use error::{EngineError, ErrorCategory, OracleError, TokenError};
pub use events::{EngineEvent, EventLog, EventRecord};
pub use health::{HealthFactorCalculator, UNBOUNDED_HEALTH_FACTOR};
pub use ledger::{CollateralLedger, CollateralPosition, DebtLedger};
pub use oracle::{Clock, PriceOracleAdapter, PriceSource, SystemClock};
pub use registry::{CollateralAsset, CollateralListing, CollateralRegistry};
pub use token::{FungibleToken, MintAuthority, UnitOfAccountToken};
pub use types::{serde_amount, AccountId, AccountInformation, Amount, AssetId, PriceQuote, ProtocolSnapshot};
