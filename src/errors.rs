// Error types and error handling module
// This file defines the payout error taxonomy shared by the resolver,
// the batch executor and the history store
//
// Numan Thabit 2025 Nov

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PayoutError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("wallet not connected")]
    WalletNotConnected,
    #[error("a batch is already running for account {0}")]
    BatchInProgress(String),
    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),
    #[error("No route found")]
    RouteNotFound,
    #[error("execution failed: {0}")]
    ExecutionFailure(String),
    #[error("storage failure: {0}")]
    StorageFailure(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider error: {0}")]
    Provider(String),
}

impl PayoutError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PayoutError::InvalidInput(_) => "invalid_input",
            PayoutError::WalletNotConnected => "wallet_not_connected",
            PayoutError::BatchInProgress(_) => "batch_in_progress",
            PayoutError::UnsupportedNetwork(_) => "unsupported_network",
            PayoutError::RouteNotFound => "route_not_found",
            PayoutError::ExecutionFailure(_) => "execution_failure",
            PayoutError::StorageFailure(_) => "storage_failure",
            PayoutError::Transport(_) => "transport",
            PayoutError::Provider(_) => "provider",
        }
    }
}
