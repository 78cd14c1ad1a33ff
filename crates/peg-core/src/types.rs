use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token amounts, 18-decimal USD values, debts and health factors.
pub type Amount = u128;

/// Account identifier.
///
/// The empty identifier is the null account: tokens refuse to mint to it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn null() -> Self {
        Self(String::new())
    }

    pub fn is_null(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Collateral asset identifier (e.g. "WETH", "WBTC").
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One price observation as reported by an external price source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub round_id: u64,
    /// Raw answer in `decimals` fixed point. Non-positive answers are rejected by the adapter.
    pub answer: i128,
    pub decimals: u8,
    pub updated_at: DateTime<Utc>,
}

/// Read-only view of a position: outstanding debt and collateral value in USD (18 decimals).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInformation {
    #[serde(with = "serde_amount")]
    pub total_debt: Amount,
    #[serde(with = "serde_amount")]
    pub collateral_value_usd: Amount,
}

/// Protocol-wide totals used to observe over-collateralization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolSnapshot {
    #[serde(with = "serde_amount")]
    pub total_collateral_value_usd: Amount,
    #[serde(with = "serde_amount")]
    pub total_debt: Amount,
    #[serde(with = "serde_amount")]
    pub unit_supply: Amount,
}

impl ProtocolSnapshot {
    pub fn is_overcollateralized(&self) -> bool {
        self.total_collateral_value_usd >= self.unit_supply
    }
}

/// Amounts travel as decimal strings: 18-decimal values routinely exceed what JSON numbers
/// carry faithfully. Plain integers are still accepted on input.
pub mod serde_amount {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    use super::Amount;

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(amount)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }

    struct AmountVisitor;

    impl<'de> Visitor<'de> for AmountVisitor {
        type Value = Amount;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("a non-negative integer or decimal string")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Amount, E> {
            Ok(Amount::from(value))
        }

        fn visit_u128<E: de::Error>(self, value: u128) -> Result<Amount, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Amount, E> {
            Amount::try_from(value).map_err(|_| E::custom("amount must be non-negative"))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Amount, E> {
            value
                .trim()
                .parse::<Amount>()
                .map_err(|e| E::custom(format!("invalid amount {value:?}: {e}")))
        }
    }
}
