// Batch executor
// Runs payout requests one at a time in input order: resolve, execute, record.
// Every item ends in exactly one outcome; per-item failures never stop the
// batch. Outcomes are appended to history before they are emitted.
//
// Numan Thabit 2025 Nov

use crate::control::AccountLocks;
use crate::errors::PayoutError;
use crate::history::{HistoryEntry, HistoryStore};
use crate::metrics::{BATCHES, PAYOUT_OUTCOMES};
use crate::networks::NetworkId;
use crate::payout::{AccountId, PayoutOutcome, PayoutRequest};
use crate::router::{Execution, RouteResolver};
use crate::signing::SigningCapability;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchStatus {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl BatchStatus {
    fn label(self) -> &'static str {
        match self {
            BatchStatus::Idle => "idle",
            BatchStatus::Running => "running",
            BatchStatus::Completed => "completed",
            BatchStatus::Cancelled => "cancelled",
        }
    }
}

/// Progress of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRun {
    pub total: usize,
    /// Number of items processed so far
    pub current_index: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub storage_failures: usize,
    pub status: BatchStatus,
}

impl BatchRun {
    fn new(total: usize) -> Self {
        Self {
            total,
            current_index: 0,
            succeeded: 0,
            failed: 0,
            storage_failures: 0,
            status: BatchStatus::Idle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BatchEvent {
    Started {
        run: BatchRun,
    },
    Outcome {
        index: usize,
        outcome: PayoutOutcome,
        run: BatchRun,
    },
    #[serde(rename_all = "camelCase")]
    StorageFailed {
        index: usize,
        error: String,
    },
    Finished {
        run: BatchRun,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub run: BatchRun,
    pub outcomes: Vec<PayoutOutcome>,
}

/// Shared cancellation flag, checked between items.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn same_as(&self, other: &CancelHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

type RunningBatches = Mutex<HashMap<AccountId, CancelHandle>>;

fn running_map(running: &RunningBatches) -> MutexGuard<'_, HashMap<AccountId, CancelHandle>> {
    running.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cancel handle of an admitted batch, visible to [`BatchExecutor::cancel`]
/// until dropped.
struct Registration<'a> {
    running: &'a RunningBatches,
    account: AccountId,
    handle: CancelHandle,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut running = running_map(self.running);
        if running
            .get(&self.account)
            .is_some_and(|handle| handle.same_as(&self.handle))
        {
            running.remove(&self.account);
        }
    }
}

/// Point-in-time wallet state for one batch.
#[derive(Clone)]
pub struct BatchContext {
    pub source_network: NetworkId,
    pub signer: Option<Arc<dyn SigningCapability>>,
    pub account: Option<String>,
}

pub struct BatchExecutor {
    resolver: Arc<RouteResolver>,
    history: Arc<dyn HistoryStore>,
    admission: AccountLocks,
    running: RunningBatches,
}

fn emit(observer: Option<&mpsc::UnboundedSender<BatchEvent>>, event: BatchEvent) {
    if let Some(tx) = observer {
        // a dropped receiver only means nobody is watching
        let _ = tx.send(event);
    }
}

impl BatchExecutor {
    pub fn new(resolver: Arc<RouteResolver>, history: Arc<dyn HistoryStore>) -> Self {
        Self {
            resolver,
            history,
            admission: AccountLocks::new(),
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolver(&self) -> &Arc<RouteResolver> {
        &self.resolver
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Request cancellation of the account's running batch. False when none runs.
    pub fn cancel(&self, account: &AccountId) -> bool {
        match running_map(&self.running).get(account) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    fn register(&self, account: &AccountId, cancel: &CancelHandle) -> Registration<'_> {
        running_map(&self.running).insert(account.clone(), cancel.clone());
        Registration {
            running: &self.running,
            account: account.clone(),
            handle: cancel.clone(),
        }
    }

    #[tracing::instrument(
        skip_all,
        fields(source = %context.source_network, total = requests.len())
    )]
    pub async fn run(
        &self,
        requests: Vec<PayoutRequest>,
        context: BatchContext,
        observer: Option<mpsc::UnboundedSender<BatchEvent>>,
        cancel: &CancelHandle,
    ) -> Result<BatchReport, PayoutError> {
        let signer = context.signer.ok_or(PayoutError::WalletNotConnected)?;
        let account = AccountId::parse(context.account.as_deref().unwrap_or_default())?;
        let _permit = self.admission.try_acquire(&account)?;
        // dropped before the permit, on every exit path
        let _registration = self.register(&account, cancel);
        let observer = observer.as_ref();

        let mut run = BatchRun::new(requests.len());
        run.status = BatchStatus::Running;
        info!(account = %account, total = run.total, "batch started");
        emit(observer, BatchEvent::Started { run: run.clone() });

        let mut outcomes = Vec::with_capacity(requests.len());
        for (index, request) in requests.into_iter().enumerate() {
            if cancel.is_cancelled() {
                run.status = BatchStatus::Cancelled;
                info!(account = %account, processed = index, "batch cancelled");
                break;
            }

            let outcome = self
                .process(request, context.source_network, signer.as_ref())
                .await;
            run.current_index = index + 1;
            if outcome.is_success() {
                run.succeeded += 1;
            } else {
                run.failed += 1;
            }

            if let Err(err) = self
                .history
                .append(&account, &[HistoryEntry::from(&outcome)])
                .await
            {
                run.storage_failures += 1;
                warn!(account = %account, index = index, error = %err, "failed to record payout outcome");
                emit(
                    observer,
                    BatchEvent::StorageFailed {
                        index,
                        error: err.to_string(),
                    },
                );
            }

            emit(
                observer,
                BatchEvent::Outcome {
                    index,
                    outcome: outcome.clone(),
                    run: run.clone(),
                },
            );
            outcomes.push(outcome);
        }

        if run.status == BatchStatus::Running {
            run.status = BatchStatus::Completed;
        }
        BATCHES.with_label_values(&[run.status.label()]).inc();
        info!(
            account = %account,
            status = run.status.label(),
            succeeded = run.succeeded,
            failed = run.failed,
            storage_failures = run.storage_failures,
            "batch finished"
        );
        emit(observer, BatchEvent::Finished { run: run.clone() });

        Ok(BatchReport { run, outcomes })
    }

    async fn attempt(
        &self,
        request: &PayoutRequest,
        source: NetworkId,
        signer: &dyn SigningCapability,
    ) -> Result<Execution, PayoutError> {
        let plan = self
            .resolver
            .resolve(
                source,
                request.destination_network(),
                request.amount(),
                signer.address(),
                request.recipient(),
            )
            .await?;
        self.resolver.execute(&plan, signer).await
    }

    async fn process(
        &self,
        request: PayoutRequest,
        source: NetworkId,
        signer: &dyn SigningCapability,
    ) -> PayoutOutcome {
        let result = self.attempt(&request, source, signer).await;
        match result {
            Ok(execution) => {
                PAYOUT_OUTCOMES.with_label_values(&["sent", "none"]).inc();
                debug!(recipient = %request.recipient(), tx_hash = %execution.tx_hash, "payout sent");
                PayoutOutcome::sent(request, execution.tx_hash, source, execution.destination_network)
            }
            Err(err) => {
                PAYOUT_OUTCOMES.with_label_values(&["failed", err.kind()]).inc();
                warn!(recipient = %request.recipient(), error = %err, "payout failed");
                PayoutOutcome::failed(request, &err, source)
            }
        }
    }
}
