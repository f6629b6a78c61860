// Dashboard aggregation
// Pure functions over loaded history: per-destination totals, failure
// filtering and overall summary
//
// Numan Thabit 2025 Nov

use crate::history::HistoryEntry;
use crate::networks::NetworkId;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Grouping key for totals; entries without a recognised network land in `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Destination {
    Network(NetworkId),
    Unknown,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Network(network) => write!(f, "{network}"),
            Destination::Unknown => f.write_str("Unknown"),
        }
    }
}

impl From<Option<NetworkId>> for Destination {
    fn from(network: Option<NetworkId>) -> Self {
        network.map_or(Destination::Unknown, Destination::Network)
    }
}

pub fn totals_by_destination(history: &[HistoryEntry]) -> BTreeMap<Destination, Decimal> {
    history.iter().fold(BTreeMap::new(), |mut acc, entry| {
        *acc.entry(Destination::from(entry.network))
            .or_insert(Decimal::ZERO) += entry.amount;
        acc
    })
}

pub fn failed_only(history: &[HistoryEntry]) -> Vec<HistoryEntry> {
    history.iter().filter(|e| e.is_failed()).cloned().collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub total_transactions: usize,
    pub failed_transactions: usize,
    pub total_amount: Decimal,
}

pub fn summary(history: &[HistoryEntry]) -> HistorySummary {
    HistorySummary {
        total_transactions: history.len(),
        failed_transactions: history.iter().filter(|e| e.is_failed()).count(),
        total_amount: history.iter().map(|e| e.amount).sum(),
    }
}
