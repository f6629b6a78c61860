// Signing capability module
// This file defines the signer seam the orchestrator consumes and the ERC-20
// call encoding used to build transfer and approval transactions
//
// Numan Thabit 2025 Nov

use crate::errors::PayoutError;
use crate::networks::NetworkId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
const APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];
const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// An unsigned EVM transaction; the signer fills in nonce, gas and signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRequest {
    pub to: String,
    /// 0x-prefixed calldata
    pub data: String,
    /// 0x-prefixed wei value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<String>,
}

/// Confirmed transaction as reported by the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub success: bool,
    pub block_number: Option<u64>,
}

/// Authenticated signer attached to one account on one network at a time.
#[async_trait]
pub trait SigningCapability: Send + Sync {
    /// Address of the signing account.
    fn address(&self) -> &str;

    /// Network the signer is currently connected to.
    async fn network(&self) -> Result<NetworkId, PayoutError>;

    /// Sign and broadcast, returning the transaction hash.
    async fn send_transaction(&self, tx: &TxRequest) -> Result<String, PayoutError>;

    /// Wait until the transaction is included. Implementations bound the wait.
    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt, PayoutError>;
}

fn address_word(address: &str) -> Result<[u8; 32], PayoutError> {
    let body = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .unwrap_or(address);
    let bytes = <[u8; 20]>::try_from(
        hex::decode(body)
            .map_err(|e| PayoutError::InvalidInput(format!("bad address {address}: {e}")))?
            .as_slice(),
    )
    .map_err(|_| PayoutError::InvalidInput(format!("bad address length: {address}")))?;
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&bytes);
    Ok(word)
}

fn amount_word(amount: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&amount.to_be_bytes());
    word
}

fn encode_call(selector: [u8; 4], words: &[[u8; 32]]) -> String {
    let mut data = Vec::with_capacity(4 + 32 * words.len());
    data.extend_from_slice(&selector);
    for word in words {
        data.extend_from_slice(word);
    }
    format!("0x{}", hex::encode(data))
}

/// `transfer(recipient, amount)` on `token`.
pub fn erc20_transfer(token: &str, recipient: &str, amount: u128) -> Result<TxRequest, PayoutError> {
    Ok(TxRequest {
        to: token.to_string(),
        data: encode_call(TRANSFER_SELECTOR, &[address_word(recipient)?, amount_word(amount)]),
        value: None,
        gas_limit: None,
    })
}

/// `approve(spender, amount)` on `token`.
pub fn erc20_approve(token: &str, spender: &str, amount: u128) -> Result<TxRequest, PayoutError> {
    Ok(TxRequest {
        to: token.to_string(),
        data: encode_call(APPROVE_SELECTOR, &[address_word(spender)?, amount_word(amount)]),
        value: None,
        gas_limit: None,
    })
}

/// Calldata for `balanceOf(owner)`.
pub fn erc20_balance_of_data(owner: &str) -> Result<String, PayoutError> {
    Ok(encode_call(BALANCE_OF_SELECTOR, &[address_word(owner)?]))
}
