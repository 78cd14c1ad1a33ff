//! Observable engine events and their append-only, hash-chained log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{serde_amount, AccountId, Amount, AssetId};

/// Events emitted by successful operations. Failed operations emit nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    CollateralDeposited {
        account: AccountId,
        asset: AssetId,
        #[serde(with = "serde_amount")]
        amount: Amount,
    },
    CollateralRedeemed {
        from: AccountId,
        to: AccountId,
        asset: AssetId,
        #[serde(with = "serde_amount")]
        amount: Amount,
    },
    UnitMinted {
        account: AccountId,
        #[serde(with = "serde_amount")]
        amount: Amount,
    },
    UnitBurned {
        on_behalf_of: AccountId,
        payer: AccountId,
        #[serde(with = "serde_amount")]
        amount: Amount,
    },
    PositionLiquidated {
        account: AccountId,
        liquidator: AccountId,
        asset: AssetId,
        #[serde(with = "serde_amount")]
        debt_covered: Amount,
        #[serde(with = "serde_amount")]
        collateral_seized: Amount,
    },
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CollateralDeposited { .. } => "collateral_deposited",
            Self::CollateralRedeemed { .. } => "collateral_redeemed",
            Self::UnitMinted { .. } => "unit_minted",
            Self::UnitBurned { .. } => "unit_burned",
            Self::PositionLiquidated { .. } => "position_liquidated",
        }
    }
}

/// Hash-chained record of one committed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub record_id: String,
    pub index: u64,
    /// Identifier shared by all events of one engine operation.
    pub operation_id: String,
    pub operation: String,
    pub timestamp: DateTime<Utc>,
    pub event: EngineEvent,
    pub previous_hash: Option<String>,
    pub record_hash: String,
}

/// Append-only event log. Records are only ever added, never edited.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append every event of one committed operation under a shared operation id.
    pub fn append_batch(&mut self, operation: &str, events: Vec<EngineEvent>) -> Vec<EventRecord> {
        let operation_id = Uuid::new_v4().to_string();
        let timestamp = Utc::now();
        events
            .into_iter()
            .map(|event| self.append(&operation_id, operation, timestamp, event))
            .collect()
    }

    pub fn verify_chain(&self) -> bool {
        let mut previous_hash: Option<String> = None;
        for (position, record) in self.records.iter().enumerate() {
            if record.index != position as u64 || record.previous_hash != previous_hash {
                return false;
            }
            let expected = compute_record_hash(
                record.index,
                &record.operation_id,
                &record.operation,
                record.timestamp,
                &record.event,
                previous_hash.as_deref(),
            );
            if record.record_hash != expected {
                return false;
            }
            previous_hash = Some(record.record_hash.clone());
        }
        true
    }

    fn append(
        &mut self,
        operation_id: &str,
        operation: &str,
        timestamp: DateTime<Utc>,
        event: EngineEvent,
    ) -> EventRecord {
        let index = self.records.len() as u64;
        let previous_hash = self.records.last().map(|r| r.record_hash.clone());
        let record_hash = compute_record_hash(
            index,
            operation_id,
            operation,
            timestamp,
            &event,
            previous_hash.as_deref(),
        );
        let record = EventRecord {
            record_id: Uuid::new_v4().to_string(),
            index,
            operation_id: operation_id.to_string(),
            operation: operation.to_string(),
            timestamp,
            event,
            previous_hash,
            record_hash,
        };
        self.records.push(record.clone());
        record
    }
}

fn compute_record_hash(
    index: u64,
    operation_id: &str,
    operation: &str,
    timestamp: DateTime<Utc>,
    event: &EngineEvent,
    previous_hash: Option<&str>,
) -> String {
    let material = serde_json::json!({
        "index": index,
        "operation_id": operation_id,
        "operation": operation,
        "timestamp": timestamp,
        "event": event,
        "previous_hash": previous_hash,
    });

    let bytes = serde_json::to_vec(&material).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}
