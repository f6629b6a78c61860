// History store seam and in-memory implementation
//
// Numan Thabit 2025 Nov

use crate::errors::PayoutError;
use crate::history::entry::HistoryEntry;
use crate::payout::AccountId;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Retention cap per account.
pub const MAX_HISTORY_ENTRIES: usize = 100;

/// Account-keyed, append-only, capped payout log.
///
/// Stored order is insertion order (newest last); `load` returns the view
/// order, newest first.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append `entries` in order, keeping only the most recent entries up to the cap.
    async fn append(&self, account: &AccountId, entries: &[HistoryEntry]) -> Result<(), PayoutError>;

    /// Entries newest first. Missing or unreadable logs load as empty.
    async fn load(&self, account: &AccountId) -> Vec<HistoryEntry>;

    /// Remove the account's log. Clearing an absent log is a no-op.
    async fn clear(&self, account: &AccountId) -> Result<(), PayoutError>;
}

/// Drop the oldest entries so that at most `limit` remain.
pub(crate) fn retain_latest(log: &mut Vec<HistoryEntry>, limit: usize) {
    if log.len() > limit {
        let excess = log.len() - limit;
        log.drain(..excess);
    }
}

pub struct MemoryHistoryStore {
    logs: Mutex<HashMap<AccountId, Vec<HistoryEntry>>>,
    limit: usize,
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self::with_limit(MAX_HISTORY_ENTRIES)
    }
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            logs: Mutex::new(HashMap::new()),
            limit,
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, account: &AccountId, entries: &[HistoryEntry]) -> Result<(), PayoutError> {
        let mut logs = self.logs.lock().await;
        let log = logs.entry(account.clone()).or_default();
        log.extend_from_slice(entries);
        retain_latest(log, self.limit);
        Ok(())
    }

    async fn load(&self, account: &AccountId) -> Vec<HistoryEntry> {
        let logs = self.logs.lock().await;
        logs.get(account)
            .map(|log| log.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    async fn clear(&self, account: &AccountId) -> Result<(), PayoutError> {
        self.logs.lock().await.remove(account);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    pub(crate) fn entry(n: i64) -> HistoryEntry {
        HistoryEntry {
            date: Utc.timestamp_opt(1_700_000_000 + n, 0).unwrap(),
            address: format!("0x{:040x}", n),
            amount: Decimal::new(n, 0),
            tx_hash: Some(format!("0x{n:x}")),
            network: Some(crate::networks::NetworkId::Polygon),
            from_network: Some(crate::networks::NetworkId::Polygon),
            error: None,
        }
    }

    #[tokio::test]
    async fn keeps_the_most_recent_hundred_in_order() {
        let store = MemoryHistoryStore::new();
        let account = AccountId::parse("0xOwner").unwrap();
        let old: Vec<_> = (0..100).map(entry).collect();
        store.append(&account, &old).await.unwrap();
        let fresh: Vec<_> = (100..105).map(entry).collect();
        store.append(&account, &fresh).await.unwrap();

        let loaded = store.load(&account).await;
        assert_eq!(loaded.len(), 100);
        // newest first: 104..=5
        let amounts: Vec<i64> = loaded
            .iter()
            .map(|e| e.amount.mantissa() as i64)
            .collect();
        assert_eq!(amounts.first(), Some(&104));
        assert_eq!(amounts.last(), Some(&5));
        assert!(amounts.windows(2).all(|w| w[0] == w[1] + 1));
    }

    #[tokio::test]
    async fn lookup_is_case_insensitive_and_clear_is_idempotent() {
        let store = MemoryHistoryStore::new();
        store
            .append(&AccountId::parse("0xABC").unwrap(), &[entry(1)])
            .await
            .unwrap();
        let account = AccountId::parse("0xabc").unwrap();
        assert_eq!(store.load(&account).await.len(), 1);

        store.clear(&account).await.unwrap();
        store.clear(&account).await.unwrap();
        assert!(store.load(&account).await.is_empty());
    }
}
