// Persisted history entry
// Flat record shape stored per payout: date, address, amount, txHash or
// error, and the networks involved
//
// Numan Thabit 2025 Nov

use crate::networks::{deserialize_lenient, NetworkId};
use crate::payout::{OutcomeResult, PayoutOutcome};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub date: DateTime<Utc>,
    pub address: String,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Destination network; `None` when the stored chain id is not recognised
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub network: Option<NetworkId>,
    #[serde(
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub from_network: Option<NetworkId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HistoryEntry {
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Explorer link for successful entries on a known network.
    pub fn explorer_url(&self) -> Option<String> {
        match (&self.tx_hash, self.network) {
            (Some(hash), Some(network)) => Some(network.explorer_tx_url(hash)),
            _ => None,
        }
    }
}

impl From<&PayoutOutcome> for HistoryEntry {
    fn from(outcome: &PayoutOutcome) -> Self {
        let (tx_hash, error) = match &outcome.result {
            OutcomeResult::Sent { tx_hash } => (Some(tx_hash.clone()), None),
            OutcomeResult::Failed { error } => (None, Some(error.clone())),
        };
        Self {
            date: outcome.timestamp,
            address: outcome.request.recipient().to_string(),
            amount: outcome.request.amount(),
            tx_hash,
            network: Some(outcome.to_network),
            from_network: Some(outcome.from_network),
            error,
        }
    }
}
