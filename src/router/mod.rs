// Router module - route resolution and execution plane
// This file wires the resolver that turns payout requests into route plans
// and the execution engine that broadcasts them through a signer
//
// Numan Thabit 2025 Nov

pub mod execution;
pub mod oracle;
pub mod routes;

#[allow(clippy::module_inception)]
pub mod router;

pub use execution::{Execution, ExecutionEngine, ExecutionStats};
pub use oracle::{RoutingOracle, TransferStatus};
pub use router::RouteResolver;
pub use routes::{BridgeQuote, Route, RoutePlan, RouteQuery};
