// Execution engine - broadcasts route plans and waits for confirmation
// This file implements the execution plane: ERC-20 transfers for direct
// routes, approval + oracle-populated steps for bridged routes
//
// Numan Thabit 2025 Nov

use crate::errors::PayoutError;
use crate::metrics::ROUTE_LATENCY;
use crate::networks::NetworkId;
use crate::router::oracle::{RoutingOracle, TransferStatus};
use crate::router::routes::{BridgeQuote, Route, RoutePlan};
use crate::signing::{erc20_approve, erc20_transfer, SigningCapability, TxRequest};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Execution statistics for monitoring
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecutionStats {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub avg_confirmation_ms: Option<f64>,
    pub success_rate: f64,
}

/// Result of a confirmed route execution
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub tx_hash: String,
    pub destination_network: NetworkId,
    /// Time from first broadcast to final confirmation (milliseconds)
    pub confirmation_ms: f64,
}

pub struct ExecutionEngine {
    oracle: Arc<dyn RoutingOracle>,
    total_executions: AtomicU64,
    successful_executions: AtomicU64,
    failed_executions: AtomicU64,
    total_confirmation_us: AtomicU64,
}

impl ExecutionEngine {
    pub fn new(oracle: Arc<dyn RoutingOracle>) -> Self {
        Self {
            oracle,
            total_executions: AtomicU64::new(0),
            successful_executions: AtomicU64::new(0),
            failed_executions: AtomicU64::new(0),
            total_confirmation_us: AtomicU64::new(0),
        }
    }

    pub fn get_stats(&self) -> ExecutionStats {
        let total = self.total_executions.load(Ordering::Relaxed);
        let successful = self.successful_executions.load(Ordering::Relaxed);
        let failed = self.failed_executions.load(Ordering::Relaxed);
        let total_ms = self.total_confirmation_us.load(Ordering::Relaxed) as f64 / 1000.0;

        ExecutionStats {
            total_executions: total,
            successful_executions: successful,
            failed_executions: failed,
            avg_confirmation_ms: if successful > 0 {
                Some(total_ms / successful as f64)
            } else {
                None
            },
            success_rate: if total > 0 {
                successful as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    /// Broadcast the plan and return once it is confirmed on chain.
    #[tracing::instrument(skip_all, fields(route = plan.route.kind(), recipient = %plan.recipient))]
    pub async fn execute(
        &self,
        plan: &RoutePlan,
        signer: &dyn SigningCapability,
    ) -> Result<Execution, PayoutError> {
        self.total_executions.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        let result = match &plan.route {
            Route::Direct { token_contract, .. } => {
                self.execute_direct(token_contract, plan, signer).await
            }
            Route::Bridged { quote, .. } => self.execute_bridged(quote, plan, signer).await,
        };

        match result {
            Ok(tx_hash) => {
                let elapsed = start.elapsed();
                let confirmation_ms = elapsed.as_secs_f64() * 1000.0;
                self.successful_executions.fetch_add(1, Ordering::Relaxed);
                self.total_confirmation_us
                    .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
                ROUTE_LATENCY
                    .with_label_values(&[plan.route.kind()])
                    .observe(elapsed.as_secs_f64());
                info!(
                    tx_hash = %tx_hash,
                    confirmation_ms = confirmation_ms,
                    destination = %plan.route.destination_network(),
                    "route executed successfully"
                );
                Ok(Execution {
                    tx_hash,
                    destination_network: plan.route.destination_network(),
                    confirmation_ms,
                })
            }
            Err(err) => {
                let err = into_execution_failure(err);
                self.failed_executions.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "route execution failed");
                Err(err)
            }
        }
    }

    async fn execute_direct(
        &self,
        token_contract: &str,
        plan: &RoutePlan,
        signer: &dyn SigningCapability,
    ) -> Result<String, PayoutError> {
        let tx = erc20_transfer(token_contract, &plan.recipient, plan.amount)?;
        send_and_confirm(signer, &tx).await
    }

    async fn execute_bridged(
        &self,
        quote: &BridgeQuote,
        plan: &RoutePlan,
        signer: &dyn SigningCapability,
    ) -> Result<String, PayoutError> {
        if quote.steps.is_empty() {
            return Err(PayoutError::ExecutionFailure(format!(
                "route {} has no executable steps",
                quote.id
            )));
        }

        if let Some(spender) = &quote.approval_address {
            let approve = erc20_approve(&plan.source_token, spender, plan.amount)?;
            let approve_hash = send_and_confirm(signer, &approve).await?;
            debug!(tx_hash = %approve_hash, spender = %spender, "token allowance confirmed");
        }

        let mut last_hash = None;
        for (index, step) in quote.steps.iter().enumerate() {
            let tx = self.oracle.step_transaction(step).await?;
            let tx_hash = send_and_confirm(signer, &tx).await?;
            debug!(step = index, tx_hash = %tx_hash, "source transaction confirmed");

            match self.oracle.wait_for_transfer(&tx_hash, step).await? {
                TransferStatus::Done { receiving_tx_hash } => {
                    debug!(
                        step = index,
                        receiving_tx_hash = ?receiving_tx_hash,
                        "cross-network transfer settled"
                    );
                }
                TransferStatus::Failed { reason } => {
                    return Err(PayoutError::ExecutionFailure(format!(
                        "transfer {tx_hash} failed: {reason}"
                    )));
                }
            }
            last_hash = Some(tx_hash);
        }

        last_hash.ok_or_else(|| PayoutError::ExecutionFailure("no transaction broadcast".into()))
    }
}

async fn send_and_confirm(
    signer: &dyn SigningCapability,
    tx: &TxRequest,
) -> Result<String, PayoutError> {
    let tx_hash = signer
        .send_transaction(tx)
        .await
        .map_err(into_execution_failure)?;
    let receipt = signer
        .wait_for_receipt(&tx_hash)
        .await
        .map_err(into_execution_failure)?;
    if !receipt.success {
        return Err(PayoutError::ExecutionFailure(format!(
            "transaction {tx_hash} reverted"
        )));
    }
    Ok(tx_hash)
}

fn into_execution_failure(err: PayoutError) -> PayoutError {
    match err {
        PayoutError::ExecutionFailure(_) => err,
        other => PayoutError::ExecutionFailure(other.to_string()),
    }
}
