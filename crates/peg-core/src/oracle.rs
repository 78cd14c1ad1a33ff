use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{EngineError, OracleError};
use crate::math::{decimal_exponent, mul_div, pow10};
use crate::types::{Amount, AssetId, PriceQuote};

/// External price source for one asset. Calls block and may fail.
/// Quotes carry their own decimal count.
pub trait PriceSource: Send + Sync {
    fn latest_round(&self) -> Result<PriceQuote, OracleError>;
}

/// Wall-clock abstraction so staleness can be evaluated deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wraps one price source and refuses to hand out stale or non-positive quotes.
///
/// Every USD conversion in the engine goes through [`PriceOracleAdapter::fresh_quote`].
#[derive(Clone)]
pub struct PriceOracleAdapter {
    asset: AssetId,
    source: Arc<dyn PriceSource>,
    clock: Arc<dyn Clock>,
    timeout: chrono::Duration,
    precision: Amount,
}

impl PriceOracleAdapter {
    pub fn new(
        asset: AssetId,
        source: Arc<dyn PriceSource>,
        clock: Arc<dyn Clock>,
        timeout: chrono::Duration,
        precision: Amount,
    ) -> Self {
        Self {
            asset,
            source,
            clock,
            timeout,
            precision,
        }
    }

    /// Latest quote, or `StalePrice` when `now - updated_at` exceeds the timeout.
    pub fn fresh_quote(&self) -> Result<PriceQuote, EngineError> {
        let quote = self
            .source
            .latest_round()
            .map_err(|source| EngineError::PriceSourceUnavailable {
                asset: self.asset.clone(),
                source,
            })?;

        let age = self.clock.now().signed_duration_since(quote.updated_at);
        if age > self.timeout {
            warn!(
                asset = %self.asset,
                age_secs = age.num_seconds(),
                round_id = quote.round_id,
                "Rejected stale price"
            );
            return Err(EngineError::StalePrice {
                asset: self.asset.clone(),
                age_secs: age.num_seconds(),
            });
        }

        if quote.answer <= 0 {
            return Err(EngineError::InvalidPrice {
                asset: self.asset.clone(),
                answer: quote.answer,
            });
        }

        debug!(
            asset = %self.asset,
            answer = quote.answer,
            round_id = quote.round_id,
            "Fresh price read"
        );
        Ok(quote)
    }

    /// Fresh price scaled to the engine's precision (18 decimals by default).
    pub fn price(&self) -> Result<Amount, EngineError> {
        let quote = self.fresh_quote()?;
        self.scale(&quote)
    }

    /// USD value (engine precision) of `amount` units of the asset.
    pub fn usd_value(&self, amount: Amount) -> Result<Amount, EngineError> {
        let price = self.price()?;
        mul_div(price, amount, self.precision)
    }

    /// Asset amount worth `usd_amount` (engine precision), truncating.
    pub fn token_amount_from_usd(&self, usd_amount: Amount) -> Result<Amount, EngineError> {
        let price = self.price()?;
        mul_div(usd_amount, self.precision, price)
    }

    fn scale(&self, quote: &PriceQuote) -> Result<Amount, EngineError> {
        // answer > 0 was checked in fresh_quote
        let answer = quote.answer as Amount;
        let target_decimals = decimal_exponent(self.precision).ok_or_else(|| {
            EngineError::InvalidConfig(format!(
                "precision must be a power of ten, got {}",
                self.precision
            ))
        })?;
        let decimals = u32::from(quote.decimals);
        if decimals <= target_decimals {
            answer
                .checked_mul(pow10(target_decimals - decimals)?)
                .ok_or(EngineError::MathOverflow)
        } else {
            Ok(answer / pow10(decimals - target_decimals)?)
        }
    }
}

impl std::fmt::Debug for PriceOracleAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceOracleAdapter")
            .field("asset", &self.asset)
            .field("timeout", &self.timeout)
            .finish()
    }
}
