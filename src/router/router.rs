// Route resolver
// Decides between a direct transfer and an oracle-quoted bridge for each
// payout and hands the resulting plan to the execution engine
//
// Numan Thabit 2025 Nov

use super::execution::{Execution, ExecutionEngine};
use super::oracle::RoutingOracle;
use super::routes::{Route, RoutePlan, RouteQuery};
use crate::errors::PayoutError;
use crate::networks::{NetworkId, NetworkRegistry};
use crate::payout::to_base_units;
use crate::signing::SigningCapability;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

/// High-level resolver that ties route selection and execution together
pub struct RouteResolver {
    registry: NetworkRegistry,
    oracle: Arc<dyn RoutingOracle>,
    executor: ExecutionEngine,
}

impl RouteResolver {
    pub fn new(registry: NetworkRegistry, oracle: Arc<dyn RoutingOracle>) -> Self {
        let executor = ExecutionEngine::new(oracle.clone());
        Self {
            registry,
            oracle,
            executor,
        }
    }

    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    pub fn executor(&self) -> &ExecutionEngine {
        &self.executor
    }

    /// Produce a fresh plan for one transfer. Quotes are never cached.
    #[tracing::instrument(skip_all, fields(source = %source, destination = %destination, amount = %amount))]
    pub async fn resolve(
        &self,
        source: NetworkId,
        destination: NetworkId,
        amount: Decimal,
        source_address: &str,
        destination_address: &str,
    ) -> Result<RoutePlan, PayoutError> {
        let source_token = self.registry.token_contract(source)?.to_string();
        let amount_units = to_base_units(amount)?;

        if source == destination {
            debug!("same network, using direct transfer");
            return Ok(RoutePlan {
                route: Route::Direct {
                    network: source,
                    token_contract: source_token.clone(),
                },
                source_token,
                recipient: destination_address.to_string(),
                amount: amount_units,
            });
        }

        let destination_token = self.registry.token_contract(destination)?.to_string();
        let query = RouteQuery {
            from_network: source,
            to_network: destination,
            from_token: source_token.clone(),
            to_token: destination_token,
            from_amount: amount_units,
            from_address: source_address.to_string(),
            to_address: destination_address.to_string(),
        };

        let candidates = self.oracle.routes(&query).await?;
        let alternatives = candidates.len();
        // Oracle ranks candidates; take the first as-is.
        let quote = candidates
            .into_iter()
            .next()
            .ok_or(PayoutError::RouteNotFound)?;

        info!(
            quote = %quote.id,
            tool = ?quote.tool,
            alternatives = alternatives,
            "selected bridge route"
        );

        Ok(RoutePlan {
            route: Route::Bridged {
                source_network: source,
                destination_network: destination,
                quote,
            },
            source_token,
            recipient: destination_address.to_string(),
            amount: amount_units,
        })
    }

    pub async fn execute(
        &self,
        plan: &RoutePlan,
        signer: &dyn SigningCapability,
    ) -> Result<Execution, PayoutError> {
        self.executor.execute(plan, signer).await
    }
}
