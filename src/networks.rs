// Supported network set
// This file defines the closed set of payout networks together with their
// USDC contracts, display names and explorer URL templates
//
// Numan Thabit 2025 Nov

use crate::errors::PayoutError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// USDC uses 6 decimals on every supported network.
pub const TOKEN_DECIMALS: u32 = 6;

/// A supported EVM network, identified on the wire by its chain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub enum NetworkId {
    Ethereum,
    Polygon,
    Arbitrum,
    Optimism,
}

impl NetworkId {
    pub const ALL: [NetworkId; 4] = [
        NetworkId::Ethereum,
        NetworkId::Polygon,
        NetworkId::Arbitrum,
        NetworkId::Optimism,
    ];

    pub fn chain_id(self) -> u64 {
        match self {
            NetworkId::Ethereum => 1,
            NetworkId::Polygon => 137,
            NetworkId::Arbitrum => 42161,
            NetworkId::Optimism => 10,
        }
    }

    pub fn from_chain_id(chain_id: u64) -> Result<Self, PayoutError> {
        match chain_id {
            1 => Ok(NetworkId::Ethereum),
            137 => Ok(NetworkId::Polygon),
            42161 => Ok(NetworkId::Arbitrum),
            10 => Ok(NetworkId::Optimism),
            other => Err(PayoutError::UnsupportedNetwork(format!("chain id {other}"))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NetworkId::Ethereum => "Ethereum",
            NetworkId::Polygon => "Polygon",
            NetworkId::Arbitrum => "Arbitrum",
            NetworkId::Optimism => "Optimism",
        }
    }

    fn default_token_contract(self) -> &'static str {
        match self {
            NetworkId::Ethereum => "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
            NetworkId::Polygon => "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174",
            NetworkId::Arbitrum => "0xff970a61a04b1ca14834a43f5de4533ebddb5cc8",
            NetworkId::Optimism => "0x7F5c764cBc14f9669B88837ca1490cCa17c31607",
        }
    }

    /// Explorer prefix for transaction links (display only).
    pub fn explorer_tx_base(self) -> &'static str {
        match self {
            NetworkId::Ethereum => "https://etherscan.io/tx/",
            NetworkId::Polygon => "https://polygonscan.com/tx/",
            NetworkId::Arbitrum => "https://arbiscan.io/tx/",
            NetworkId::Optimism => "https://optimistic.etherscan.io/tx/",
        }
    }

    pub fn explorer_tx_url(self, tx_hash: &str) -> String {
        format!("{}{}", self.explorer_tx_base(), tx_hash)
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<NetworkId> for u64 {
    fn from(network: NetworkId) -> u64 {
        network.chain_id()
    }
}

impl TryFrom<u64> for NetworkId {
    type Error = PayoutError;

    fn try_from(chain_id: u64) -> Result<Self, Self::Error> {
        NetworkId::from_chain_id(chain_id)
    }
}

/// Accepts a decimal chain id (`137`), a hex chain id (`0x89`) or a network name.
impl FromStr for NetworkId {
    type Err = PayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(hex_id) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            let id = u64::from_str_radix(hex_id, 16)
                .map_err(|_| PayoutError::UnsupportedNetwork(trimmed.to_string()))?;
            return NetworkId::from_chain_id(id);
        }
        if let Ok(id) = trimmed.parse::<u64>() {
            return NetworkId::from_chain_id(id);
        }
        NetworkId::ALL
            .into_iter()
            .find(|n| n.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| PayoutError::UnsupportedNetwork(trimmed.to_string()))
    }
}

/// Lenient deserializer for stored data: unknown or missing chain ids become `None`.
pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Option<NetworkId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|id| NetworkId::from_chain_id(id).ok()),
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

/// Networks enabled for this deployment and the token contract registered for each.
#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    contracts: BTreeMap<NetworkId, String>,
}

impl Default for NetworkRegistry {
    fn default() -> Self {
        Self::with_networks(&NetworkId::ALL)
    }
}

impl NetworkRegistry {
    pub fn with_networks(networks: &[NetworkId]) -> Self {
        let contracts = networks
            .iter()
            .map(|n| (*n, n.default_token_contract().to_string()))
            .collect();
        Self { contracts }
    }

    pub fn token_contract(&self, network: NetworkId) -> Result<&str, PayoutError> {
        self.contracts
            .get(&network)
            .map(String::as_str)
            .ok_or_else(|| PayoutError::UnsupportedNetwork(network.to_string()))
    }

    pub fn is_supported(&self, network: NetworkId) -> bool {
        self.contracts.contains_key(&network)
    }

    pub fn networks(&self) -> impl Iterator<Item = NetworkId> + '_ {
        self.contracts.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids_and_names() {
        assert_eq!("137".parse::<NetworkId>().unwrap(), NetworkId::Polygon);
        assert_eq!("0xa4b1".parse::<NetworkId>().unwrap(), NetworkId::Arbitrum);
        assert_eq!("optimism".parse::<NetworkId>().unwrap(), NetworkId::Optimism);
        assert!(matches!(
            "56".parse::<NetworkId>(),
            Err(PayoutError::UnsupportedNetwork(_))
        ));
    }

    #[test]
    fn serializes_as_chain_id() {
        assert_eq!(serde_json::to_string(&NetworkId::Polygon).unwrap(), "137");
        let n: NetworkId = serde_json::from_str("10").unwrap();
        assert_eq!(n, NetworkId::Optimism);
        assert!(serde_json::from_str::<NetworkId>("999").is_err());
    }

    #[test]
    fn registry_reports_missing_contract() {
        let registry = NetworkRegistry::with_networks(&[NetworkId::Polygon]);
        assert!(registry.token_contract(NetworkId::Polygon).is_ok());
        assert_eq!(
            registry.token_contract(NetworkId::Ethereum),
            Err(PayoutError::UnsupportedNetwork("Ethereum".to_string()))
        );
    }
}
