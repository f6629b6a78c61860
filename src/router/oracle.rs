// Routing oracle seam
// The oracle ranks cross-network paths and populates their transactions;
// the resolver treats it as a black box
//
// Numan Thabit 2025 Nov

use crate::errors::PayoutError;
use crate::router::routes::{BridgeQuote, RouteQuery};
use crate::signing::TxRequest;
use async_trait::async_trait;

/// Final state of a cross-network transfer as reported by the oracle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    Done { receiving_tx_hash: Option<String> },
    Failed { reason: String },
}

#[async_trait]
pub trait RoutingOracle: Send + Sync {
    /// Candidate routes, best first. An empty list means no path exists.
    async fn routes(&self, query: &RouteQuery) -> Result<Vec<BridgeQuote>, PayoutError>;

    /// Populate the source-network transaction for one quote step.
    async fn step_transaction(&self, step: &serde_json::Value) -> Result<TxRequest, PayoutError>;

    /// Wait for the cross-network leg started by `tx_hash` to settle.
    async fn wait_for_transfer(
        &self,
        tx_hash: &str,
        step: &serde_json::Value,
    ) -> Result<TransferStatus, PayoutError>;
}
