// Library root module for usdc-payout
// This file defines the public API and module structure for the payout
// orchestrator: routing, batch execution, history and reporting
//
// Numan Thabit 2025 Nov

pub mod api;
pub mod batch;
pub mod config;
pub mod control;
pub mod errors;
pub mod history;
pub mod metrics;
pub mod networks;
pub mod payout;
pub mod reports;
pub mod router;
pub mod signing;
pub mod state;
pub mod transport;
