//! Fixed-point helpers. Products are formed in 256 bits so `amount * price` cannot wrap.

use primitive_types::U256;

use crate::error::EngineError;
use crate::types::Amount;

/// `a * b / denominator`, truncating. Fails when the quotient does not fit in 128 bits.
pub fn mul_div(a: Amount, b: Amount, denominator: Amount) -> Result<Amount, EngineError> {
    let quotient = wide_mul_div(a, b, denominator)?;
    narrow(quotient)
}

/// Like [`mul_div`] but clamps an oversized quotient to `Amount::MAX`.
pub fn mul_div_saturating(
    a: Amount,
    b: Amount,
    denominator: Amount,
) -> Result<Amount, EngineError> {
    let quotient = wide_mul_div(a, b, denominator)?;
    Ok(narrow(quotient).unwrap_or(Amount::MAX))
}

pub fn pow10(exponent: u32) -> Result<Amount, EngineError> {
    10u128.checked_pow(exponent).ok_or(EngineError::MathOverflow)
}

/// `k` such that `value == 10^k`, or `None` when `value` is not a power of ten.
pub fn decimal_exponent(value: Amount) -> Option<u32> {
    if value == 0 {
        return None;
    }
    let mut exponent = 0;
    let mut remaining = value;
    while remaining % 10 == 0 {
        remaining /= 10;
        exponent += 1;
    }
    (remaining == 1).then_some(exponent)
}

pub fn checked_add(a: Amount, b: Amount) -> Result<Amount, EngineError> {
    a.checked_add(b).ok_or(EngineError::MathOverflow)
}

fn wide_mul_div(a: Amount, b: Amount, denominator: Amount) -> Result<U256, EngineError> {
    if denominator == 0 {
        return Err(EngineError::DivisionByZero);
    }
    let product = U256::from(a)
        .checked_mul(U256::from(b))
        .ok_or(EngineError::MathOverflow)?;
    Ok(product / U256::from(denominator))
}

fn narrow(value: U256) -> Result<Amount, EngineError> {
    if value > U256::from(Amount::MAX) {
        return Err(EngineError::MathOverflow);
    }
    Ok(value.as_u128())
}
