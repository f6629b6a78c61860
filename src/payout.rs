// Payout domain types
// This file defines validated payout requests, account identifiers and the
// outcome produced for each attempted transfer
//
// Numan Thabit 2025 Nov

use crate::errors::PayoutError;
use crate::networks::{NetworkId, TOKEN_DECIMALS};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Normalized (trimmed, lower-cased) account identifier used as the history key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// A blank identifier means no wallet is attached.
    pub fn parse(raw: &str) -> Result<Self, PayoutError> {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(PayoutError::WalletNotConnected);
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check that `address` is `0x` followed by 20 hex-encoded bytes.
pub fn validate_address(address: &str) -> Result<(), PayoutError> {
    let body = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| PayoutError::InvalidInput(format!("address {address:?} must start with 0x")))?;
    let bytes = hex::decode(body)
        .map_err(|e| PayoutError::InvalidInput(format!("address {address:?} is not hex: {e}")))?;
    if bytes.len() != 20 {
        return Err(PayoutError::InvalidInput(format!(
            "address {address:?} must be 20 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(())
}

/// Parse a decimal amount and apply [`check_amount`].
pub fn parse_amount(raw: &str) -> Result<Decimal, PayoutError> {
    let amount = Decimal::from_str(raw.trim())
        .map_err(|e| PayoutError::InvalidInput(format!("amount {raw:?} is not a decimal: {e}")))?;
    check_amount(amount)
}

/// Positive, at most `TOKEN_DECIMALS` fractional digits, and representable in base units.
pub fn check_amount(amount: Decimal) -> Result<Decimal, PayoutError> {
    if amount <= Decimal::ZERO {
        return Err(PayoutError::InvalidInput(format!("amount {amount} must be positive")));
    }
    if amount.normalize().scale() > TOKEN_DECIMALS {
        return Err(PayoutError::InvalidInput(format!(
            "amount {amount} has more than {TOKEN_DECIMALS} decimal places"
        )));
    }
    to_base_units(amount)?;
    Ok(amount)
}

/// Convert a token amount to base units (6 decimals).
pub fn to_base_units(amount: Decimal) -> Result<u128, PayoutError> {
    let factor = Decimal::from(10u64.pow(TOKEN_DECIMALS));
    amount
        .checked_mul(factor)
        .filter(|scaled| scaled.fract().is_zero())
        .and_then(|scaled| scaled.to_u128())
        .ok_or_else(|| PayoutError::InvalidInput(format!("amount {amount} cannot be expressed in base units")))
}

/// A single validated transfer instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRequest {
    #[serde(rename = "address")]
    recipient: String,
    amount: Decimal,
    destination_network: NetworkId,
}

impl PayoutRequest {
    pub fn new(
        recipient: impl Into<String>,
        amount: Decimal,
        destination_network: NetworkId,
    ) -> Result<Self, PayoutError> {
        let recipient = recipient.into().trim().to_string();
        validate_address(&recipient)?;
        let amount = check_amount(amount)?;
        Ok(Self {
            recipient,
            amount,
            destination_network,
        })
    }

    /// Validate raw string fields; a missing network falls back to `default_network`.
    pub fn parse(
        recipient: &str,
        amount: &str,
        network: Option<&str>,
        default_network: NetworkId,
    ) -> Result<Self, PayoutError> {
        let amount = parse_amount(amount)?;
        let destination = match network.map(str::trim).filter(|n| !n.is_empty()) {
            Some(raw) => raw.parse::<NetworkId>().map_err(|_| {
                PayoutError::InvalidInput(format!("unsupported network {raw:?}"))
            })?,
            None => default_network,
        };
        Self::new(recipient, amount, destination)
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn destination_network(&self) -> NetworkId {
        self.destination_network
    }
}

/// Terminal result of one payout attempt: a transaction hash or a failure reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum OutcomeResult {
    #[serde(rename_all = "camelCase")]
    Sent { tx_hash: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutOutcome {
    pub request: PayoutRequest,
    #[serde(flatten)]
    pub result: OutcomeResult,
    pub from_network: NetworkId,
    pub to_network: NetworkId,
    pub timestamp: DateTime<Utc>,
}

impl PayoutOutcome {
    pub fn sent(
        request: PayoutRequest,
        tx_hash: String,
        from_network: NetworkId,
        to_network: NetworkId,
    ) -> Self {
        Self {
            request,
            result: OutcomeResult::Sent { tx_hash },
            from_network,
            to_network,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(request: PayoutRequest, error: &PayoutError, from_network: NetworkId) -> Self {
        let to_network = request.destination_network();
        Self {
            request,
            result: OutcomeResult::Failed {
                error: error.to_string(),
            },
            from_network,
            to_network,
            timestamp: Utc::now(),
        }
    }

    pub fn tx_hash(&self) -> Option<&str> {
        match &self.result {
            OutcomeResult::Sent { tx_hash } => Some(tx_hash),
            OutcomeResult::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.result {
            OutcomeResult::Sent { .. } => None,
            OutcomeResult::Failed { error } => Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.result, OutcomeResult::Sent { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0x1111111111111111111111111111111111111111";

    #[test]
    fn account_id_is_normalized() {
        let id = AccountId::parse("  0xABCdef  ").unwrap();
        assert_eq!(id.as_str(), "0xabcdef");
        assert_eq!(AccountId::parse("   "), Err(PayoutError::WalletNotConnected));
    }

    #[test]
    fn rejects_malformed_requests() {
        assert!(PayoutRequest::parse("0x1234", "5", None, NetworkId::Polygon).is_err());
        assert!(PayoutRequest::parse(ADDR, "0", None, NetworkId::Polygon).is_err());
        assert!(PayoutRequest::parse(ADDR, "-3", None, NetworkId::Polygon).is_err());
        assert!(PayoutRequest::parse(ADDR, "1.0000001", None, NetworkId::Polygon).is_err());
        assert!(PayoutRequest::parse(ADDR, "abc", None, NetworkId::Polygon).is_err());
        assert!(PayoutRequest::parse(ADDR, "5", Some("56"), NetworkId::Polygon).is_err());
    }

    #[test]
    fn network_defaults_to_source() {
        let req = PayoutRequest::parse(ADDR, "12.50", Some(" "), NetworkId::Arbitrum).unwrap();
        assert_eq!(req.destination_network(), NetworkId::Arbitrum);
        let req = PayoutRequest::parse(ADDR, "12.50", Some("Polygon"), NetworkId::Arbitrum).unwrap();
        assert_eq!(req.destination_network(), NetworkId::Polygon);
    }

    #[test]
    fn base_units_use_six_decimals() {
        assert_eq!(to_base_units(Decimal::new(1250, 2)).unwrap(), 12_500_000);
        assert_eq!(to_base_units(Decimal::new(1, 6)).unwrap(), 1);
        assert!(to_base_units(Decimal::new(1, 7)).is_err());
    }

    #[test]
    fn amounts_beyond_base_unit_range_are_rejected_up_front() {
        assert!(matches!(
            PayoutRequest::new(ADDR, Decimal::MAX, NetworkId::Polygon),
            Err(PayoutError::InvalidInput(msg)) if msg.contains("base units")
        ));
        assert!(PayoutRequest::parse(ADDR, "100000000000000000000000", None, NetworkId::Polygon).is_err());
        assert!(PayoutRequest::parse(ADDR, "10000000000000000000000", None, NetworkId::Polygon).is_ok());
        assert!(PayoutRequest::new(ADDR, Decimal::new(-1, 0), NetworkId::Polygon).is_err());
        assert!(PayoutRequest::new(ADDR, Decimal::new(1, 7), NetworkId::Polygon).is_err());
    }

    #[test]
    fn outcome_carries_exactly_one_result() {
        let req = PayoutRequest::parse(ADDR, "1", None, NetworkId::Polygon).unwrap();
        let ok = PayoutOutcome::sent(req.clone(), "0xabc".into(), NetworkId::Polygon, NetworkId::Polygon);
        assert_eq!(ok.tx_hash(), Some("0xabc"));
        assert_eq!(ok.error(), None);
        let failed = PayoutOutcome::failed(req, &PayoutError::RouteNotFound, NetworkId::Polygon);
        assert_eq!(failed.tx_hash(), None);
        assert_eq!(failed.error(), Some("No route found"));
    }
}
