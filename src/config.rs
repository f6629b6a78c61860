// Configuration management module
// This file handles loading and parsing of configuration settings
// from environment variables (APP-style `__` nesting)
//
// Numan Thabit 2025 Nov

use crate::history::MAX_HISTORY_ENTRIES;
use crate::networks::{NetworkId, NetworkRegistry};
use crate::payout::validate_address;
use crate::transport::lifi::DEFAULT_ENDPOINT;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// JSON-RPC endpoint of the node that holds the signing account
    pub rpc_endpoint: Url,
    /// Payout account (0x...); defaults to the node's first account when unset
    pub signer_address: Option<String>,
    /// Routing oracle base URL (defaults to the public LI.FI API)
    pub routing_endpoint: Option<Url>,
    pub routing_api_key: Option<String>,
    /// Integrator name sent with route requests
    pub integrator: Option<String>,
    pub history_dir: Option<PathBuf>,
    pub history_limit: Option<usize>,
    pub listen_addr: Option<String>,
    /// Upper bound on waiting for a receipt or a cross-chain transfer
    pub confirmation_timeout_secs: Option<u64>,
    pub session_poll_secs: Option<u64>,
    /// Comma-separated chain ids or names, e.g. "137,10"
    pub enabled_networks: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    pub fn signer_address(&self) -> Result<Option<String>> {
        match self.signer_address.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                validate_address(raw).with_context(|| format!("invalid signer address: {raw}"))?;
                Ok(Some(raw.to_string()))
            }
            _ => Ok(None),
        }
    }

    pub fn routing_endpoint(&self) -> Result<Url> {
        match &self.routing_endpoint {
            Some(url) => Ok(url.clone()),
            None => Url::parse(DEFAULT_ENDPOINT).context("parse default routing endpoint"),
        }
    }

    pub fn integrator(&self) -> &str {
        self.integrator.as_deref().unwrap_or("usdc-payout")
    }

    pub fn history_dir(&self) -> PathBuf {
        self.history_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("./payout-history"))
    }

    pub fn history_limit(&self) -> Result<usize> {
        let limit = self.history_limit.unwrap_or(MAX_HISTORY_ENTRIES);
        if limit == 0 {
            bail!("history_limit must be at least 1");
        }
        Ok(limit)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let raw = self.listen_addr.as_deref().unwrap_or("0.0.0.0:8080");
        raw.parse()
            .with_context(|| format!("invalid listen address: {raw}"))
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs.unwrap_or(180))
    }

    pub fn session_poll_interval(&self) -> Duration {
        Duration::from_secs(self.session_poll_secs.unwrap_or(15).max(1))
    }

    /// Registry restricted to the enabled networks; all networks when unset.
    pub fn registry(&self) -> Result<NetworkRegistry> {
        let Some(raw) = self.enabled_networks.as_deref() else {
            return Ok(NetworkRegistry::default());
        };
        let networks = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<NetworkId>()
                    .with_context(|| format!("unknown network in enabled_networks: {s}"))
            })
            .collect::<Result<Vec<_>>>()?;
        if networks.is_empty() {
            bail!("enabled_networks is set but names no network");
        }
        Ok(NetworkRegistry::with_networks(&networks))
    }
}
