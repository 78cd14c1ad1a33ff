//! Health factor: risk-adjusted collateral value over debt, scaled by `precision`.

use tracing::debug;

use crate::config::{EngineConfig, LIQUIDATION_PRECISION};
use crate::error::EngineError;
use crate::math::{mul_div, mul_div_saturating};
use crate::types::Amount;

/// Health factor reported for positions without debt.
pub const UNBOUNDED_HEALTH_FACTOR: Amount = Amount::MAX;

/// Stateless calculator bound to one set of risk parameters.
#[derive(Debug, Clone, Copy)]
pub struct HealthFactorCalculator {
    liquidation_threshold: Amount,
    precision: Amount,
    min_health_factor: Amount,
}

impl HealthFactorCalculator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            liquidation_threshold: config.liquidation_threshold,
            precision: config.precision,
            min_health_factor: config.min_health_factor,
        }
    }

    /// `collateral * threshold / 100 * precision / debt`; unbounded when `debt == 0`.
    pub fn compute(&self, collateral_value_usd: Amount, debt: Amount) -> Result<Amount, EngineError> {
        if debt == 0 {
            return Ok(UNBOUNDED_HEALTH_FACTOR);
        }
        let adjusted = mul_div(
            collateral_value_usd,
            self.liquidation_threshold,
            LIQUIDATION_PRECISION,
        )?;
        let ratio = mul_div_saturating(adjusted, self.precision, debt)?;
        debug!(
            collateral_value_usd,
            adjusted_collateral = adjusted,
            debt,
            health_factor = ratio,
            "Computed health factor"
        );
        Ok(ratio)
    }

    pub fn is_healthy(&self, health_factor: Amount) -> bool {
        health_factor >= self.min_health_factor
    }

    pub fn min_health_factor(&self) -> Amount {
        self.min_health_factor
    }
}
