// Control plane: per-account serialization
//
// One async mutex per account. Batch admission takes it with try_lock so a
// second batch for the same account is rejected; history writers wait on it
// so load-modify-write cycles never interleave. Entries nobody holds or waits
// on are dropped from the map when the last permit is released.
//
// Numan Thabit 2025 Nov

use crate::errors::PayoutError;
use crate::payout::AccountId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

type LockMap = HashMap<AccountId, Arc<AsyncMutex<()>>>;

#[derive(Clone, Default)]
pub struct AccountLocks {
    inner: Arc<Mutex<LockMap>>,
}

/// Held for the duration of a batch or a history write.
pub struct AccountPermit {
    guard: Option<OwnedMutexGuard<()>>,
    account: AccountId,
    locks: AccountLocks,
}

impl Drop for AccountPermit {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.prune(&self.account);
    }
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    // never held across an await
    fn map(&self) -> MutexGuard<'_, LockMap> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_for(&self, account: &AccountId) -> Arc<AsyncMutex<()>> {
        self.map()
            .entry(account.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Remove the account's entry once only the map references it.
    fn prune(&self, account: &AccountId) {
        let mut map = self.map();
        if map.get(account).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            map.remove(account);
        }
    }

    fn permit(&self, account: &AccountId, guard: OwnedMutexGuard<()>) -> AccountPermit {
        AccountPermit {
            guard: Some(guard),
            account: account.clone(),
            locks: self.clone(),
        }
    }

    /// Wait until the account is free.
    pub async fn acquire(&self, account: &AccountId) -> AccountPermit {
        let guard = self.lock_for(account).lock_owned().await;
        self.permit(account, guard)
    }

    /// Take the account lock only if nobody else holds it.
    pub fn try_acquire(&self, account: &AccountId) -> Result<AccountPermit, PayoutError> {
        match self.lock_for(account).try_lock_owned() {
            Ok(guard) => Ok(self.permit(account, guard)),
            Err(_) => {
                debug!(account = %account, "account busy");
                Err(PayoutError::BatchInProgress(account.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked(locks: &AccountLocks) -> usize {
        locks.inner.lock().unwrap().len()
    }

    #[tokio::test]
    async fn second_try_acquire_is_rejected_until_release() {
        let locks = AccountLocks::new();
        let a = AccountId::parse("0xAA").unwrap();
        let b = AccountId::parse("0xbb").unwrap();

        let permit = locks.try_acquire(&a).unwrap();
        assert_eq!(
            locks.try_acquire(&AccountId::parse("0xaa").unwrap()).err(),
            Some(PayoutError::BatchInProgress("0xaa".into()))
        );
        assert!(locks.try_acquire(&b).is_ok());

        drop(permit);
        assert!(locks.try_acquire(&a).is_ok());
    }

    #[tokio::test]
    async fn released_accounts_leave_the_map() {
        let locks = AccountLocks::new();
        let a = AccountId::parse("0xaa").unwrap();
        let b = AccountId::parse("0xbb").unwrap();

        let first = locks.try_acquire(&a).unwrap();
        let second = locks.acquire(&b).await;
        assert_eq!(tracked(&locks), 2);
        drop(first);
        assert_eq!(tracked(&locks), 1);
        drop(second);
        assert_eq!(tracked(&locks), 0);

        for n in 0..50 {
            let account = AccountId::parse(&format!("0x{n:02x}")).unwrap();
            drop(locks.acquire(&account).await);
        }
        assert_eq!(tracked(&locks), 0);
    }

    #[tokio::test]
    async fn entry_survives_while_a_writer_waits() {
        let locks = AccountLocks::new();
        let a = AccountId::parse("0xaa").unwrap();

        let held = locks.acquire(&a).await;
        let waiter = {
            let locks = locks.clone();
            let a = a.clone();
            tokio::spawn(async move {
                let _permit = locks.acquire(&a).await;
            })
        };
        tokio::task::yield_now().await;

        drop(held);
        assert_eq!(tracked(&locks), 1);
        waiter.await.unwrap();
        assert_eq!(tracked(&locks), 0);
    }
}
