// Route types
// This file defines the executable route plans produced by the resolver:
// direct same-network transfers and oracle-quoted bridged transfers
//
// Numan Thabit 2025 Nov

use crate::networks::NetworkId;
use serde::{Deserialize, Serialize};

/// How value moves from the source network to the destination network
#[derive(Debug, Clone)]
pub enum Route {
    /// ERC-20 transfer on a single network
    Direct {
        network: NetworkId,
        token_contract: String,
    },
    /// Cross-network path quoted by the routing oracle
    Bridged {
        source_network: NetworkId,
        destination_network: NetworkId,
        quote: BridgeQuote,
    },
}

impl Route {
    pub fn kind(&self) -> &'static str {
        match self {
            Route::Direct { .. } => "direct",
            Route::Bridged { .. } => "bridged",
        }
    }

    pub fn destination_network(&self) -> NetworkId {
        match self {
            Route::Direct { network, .. } => *network,
            Route::Bridged {
                destination_network,
                ..
            } => *destination_network,
        }
    }
}

/// Route plus the transfer it carries. Built per request, never reused.
#[derive(Debug, Clone)]
pub struct RoutePlan {
    pub route: Route,
    pub source_token: String,
    pub recipient: String,
    /// Amount in token base units (6 decimals)
    pub amount: u128,
}

/// One candidate path returned by the routing oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeQuote {
    pub id: String,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub to_amount_min: Option<String>,
    /// Spender that must be approved on the source token before the first step
    #[serde(default)]
    pub approval_address: Option<String>,
    /// Oracle-specific step descriptors, passed back verbatim when populating transactions
    #[serde(default)]
    pub steps: Vec<serde_json::Value>,
}

/// Query sent to the routing oracle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteQuery {
    pub from_network: NetworkId,
    pub to_network: NetworkId,
    pub from_token: String,
    pub to_token: String,
    pub from_amount: u128,
    pub from_address: String,
    pub to_address: String,
}
