// File-backed history store
// One JSON array per account under a directory. Writes go to a temp file and
// are renamed into place; each account's load-modify-write is serialized.
//
// Numan Thabit 2025 Nov

use crate::control::AccountLocks;
use crate::errors::PayoutError;
use crate::history::entry::HistoryEntry;
use crate::history::store::{retain_latest, HistoryStore, MAX_HISTORY_ENTRIES};
use crate::payout::AccountId;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct FileHistoryStore {
    dir: PathBuf,
    limit: usize,
    locks: AccountLocks,
}

impl FileHistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_limit(dir, MAX_HISTORY_ENTRIES)
    }

    pub fn with_limit(dir: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            dir: dir.into(),
            limit,
            locks: AccountLocks::new(),
        }
    }

    fn path_for(&self, account: &AccountId) -> PathBuf {
        let key = account.as_str();
        let file = if key.chars().all(|c| c.is_ascii_alphanumeric()) {
            format!("payoutHistory_{key}.json")
        } else {
            format!("payoutHistory_x{}.json", hex::encode(key))
        };
        self.dir.join(file)
    }

    /// Stored order (oldest first). Anything unreadable is an empty log.
    async fn read_log(&self, path: &Path) -> Vec<HistoryEntry> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "history unreadable; treating as empty");
                return Vec::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(log) => log,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "history malformed; treating as empty");
                Vec::new()
            }
        }
    }

    async fn write_log(&self, path: &Path, log: &[HistoryEntry]) -> Result<(), PayoutError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PayoutError::StorageFailure(format!("create {}: {e}", self.dir.display())))?;
        let bytes = serde_json::to_vec(log)
            .map_err(|e| PayoutError::StorageFailure(format!("encode history: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| PayoutError::StorageFailure(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| PayoutError::StorageFailure(format!("replace {}: {e}", path.display())))
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn append(&self, account: &AccountId, entries: &[HistoryEntry]) -> Result<(), PayoutError> {
        let _permit = self.locks.acquire(account).await;
        let path = self.path_for(account);
        let mut log = self.read_log(&path).await;
        log.extend_from_slice(entries);
        retain_latest(&mut log, self.limit);
        self.write_log(&path, &log).await?;
        debug!(account = %account, stored = log.len(), "history appended");
        Ok(())
    }

    async fn load(&self, account: &AccountId) -> Vec<HistoryEntry> {
        let mut log = self.read_log(&self.path_for(account)).await;
        log.reverse();
        log
    }

    async fn clear(&self, account: &AccountId) -> Result<(), PayoutError> {
        let _permit = self.locks.acquire(account).await;
        let path = self.path_for(account);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(PayoutError::StorageFailure(format!(
                "remove {}: {err}",
                path.display()
            ))),
        }
    }
}
