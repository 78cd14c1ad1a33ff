use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::EngineError;
use crate::math::decimal_exponent;
use crate::types::Amount;

pub const PRECISION: Amount = 1_000_000_000_000_000_000;
pub const LIQUIDATION_THRESHOLD: Amount = 50;
pub const LIQUIDATION_BONUS: Amount = 150;
pub const LIQUIDATION_PRECISION: Amount = 100;
pub const MIN_HEALTH_FACTOR: Amount = PRECISION;
pub const PRICE_TIMEOUT_SECS: u64 = 3 * 60 * 60;

/// Risk and oracle parameters of one engine deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Percentage of raw collateral value counted toward solvency.
    pub liquidation_threshold: Amount,
    /// Extra collateral, in percent of the covered debt's asset equivalent, paid to liquidators.
    pub liquidation_bonus: Amount,
    /// Fixed-point scale of USD values and health factors.
    pub precision: Amount,
    /// Health factors strictly below this value are liquidatable.
    pub min_health_factor: Amount,
    /// Quotes older than this are stale and unusable.
    pub price_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            liquidation_threshold: LIQUIDATION_THRESHOLD,
            liquidation_bonus: LIQUIDATION_BONUS,
            precision: PRECISION,
            min_health_factor: MIN_HEALTH_FACTOR,
            price_timeout_secs: PRICE_TIMEOUT_SECS,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.liquidation_threshold == 0 || self.liquidation_threshold > LIQUIDATION_PRECISION {
            return Err(EngineError::InvalidConfig(format!(
                "liquidation_threshold must be within 1..=100, got {}",
                self.liquidation_threshold
            )));
        }
        if decimal_exponent(self.precision).is_none() {
            return Err(EngineError::InvalidConfig(format!(
                "precision must be a power of ten, got {}",
                self.precision
            )));
        }
        if self.min_health_factor == 0 {
            return Err(EngineError::InvalidConfig(
                "min_health_factor must be non-zero".to_string(),
            ));
        }
        if self.price_timeout_secs == 0 || self.price_timeout_secs > i64::MAX as u64 {
            return Err(EngineError::InvalidConfig(format!(
                "price_timeout_secs out of range: {}",
                self.price_timeout_secs
            )));
        }

        if !self.bonus_is_coverable() {
            warn!(
                liquidation_bonus = self.liquidation_bonus,
                liquidation_threshold = self.liquidation_threshold,
                "Liquidation bonus exceeds collateral available at the liquidation boundary; \
                 full-debt liquidations will fail with insufficient collateral"
            );
        }
        Ok(())
    }

    /// Whether seizing `100 + bonus` percent of the covered debt fits inside the collateral an
    /// account holds when it sits exactly at the liquidation boundary.
    pub fn bonus_is_coverable(&self) -> bool {
        if self.liquidation_threshold == 0 {
            return false;
        }
        let boundary_collateral =
            LIQUIDATION_PRECISION * LIQUIDATION_PRECISION / self.liquidation_threshold;
        LIQUIDATION_PRECISION.saturating_add(self.liquidation_bonus) <= boundary_collateral
    }

    pub fn price_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.price_timeout_secs.min(i64::MAX as u64) as i64)
    }
}
