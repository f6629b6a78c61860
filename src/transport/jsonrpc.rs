// JSON-RPC transport layer implementation
// This file implements the EVM JSON-RPC client and the node-backed signer
// that broadcasts payouts from an account held by the node
//
// Numan Thabit 2025 Nov

use crate::errors::PayoutError;
use crate::metrics::{REQ_ERRORS, REQ_LATENCY};
use crate::networks::NetworkId;
use crate::signing::{erc20_balance_of_data, SigningCapability, TxReceipt, TxRequest};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct JsonRpc {
    http: Client,
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    pub transaction_hash: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub block_number: Option<String>,
}

fn parse_quantity(raw: &str) -> Result<u128, PayoutError> {
    let digits = raw.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| PayoutError::Provider(format!("bad quantity {raw}: {e}")))
}

impl JsonRpc {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<T, PayoutError> {
        let _timer = REQ_LATENCY.with_label_values(&["jsonrpc", method]).start_timer();
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let result = self.send(&payload).await;
        if result.is_err() {
            REQ_ERRORS.with_label_values(&["jsonrpc", method]).inc();
        }
        let value = result?;
        serde_json::from_value(value)
            .map_err(|e| PayoutError::Provider(format!("decode {method} result: {e}")))
    }

    async fn send(&self, payload: &serde_json::Value) -> Result<serde_json::Value, PayoutError> {
        let resp = self
            .http
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| PayoutError::Transport(format!("jsonrpc send: {e}")))?;
        if !resp.status().is_success() {
            return Err(PayoutError::Provider(format!("http {}", resp.status())));
        }
        let mut body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| PayoutError::Transport(format!("json parse: {e}")))?;
        let reply = body
            .as_object_mut()
            .ok_or_else(|| PayoutError::Provider("non-object JSON-RPC reply".into()))?;
        if let Some(err) = reply.get("error") {
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            return Err(PayoutError::Provider(message));
        }
        Ok(reply.remove("result").unwrap_or(serde_json::Value::Null))
    }

    pub async fn chain_id(&self) -> Result<u64, PayoutError> {
        let raw: String = self.call("eth_chainId", json!([])).await?;
        let id = parse_quantity(&raw)?;
        u64::try_from(id).map_err(|_| PayoutError::Provider(format!("chain id {raw} out of range")))
    }

    pub async fn accounts(&self) -> Result<Vec<String>, PayoutError> {
        self.call("eth_accounts", json!([])).await
    }

    pub async fn send_transaction(&self, from: &str, tx: &TxRequest) -> Result<String, PayoutError> {
        let mut params = json!({
            "from": from,
            "to": tx.to,
            "data": tx.data,
        });
        if let Some(value) = &tx.value {
            params["value"] = json!(value);
        }
        if let Some(gas) = &tx.gas_limit {
            params["gas"] = json!(gas);
        }
        self.call("eth_sendTransaction", json!([params])).await
    }

    pub async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<RpcReceipt>, PayoutError> {
        self.call("eth_getTransactionReceipt", json!([tx_hash])).await
    }

    /// ERC-20 balance of `owner` in base units.
    pub async fn token_balance(&self, token: &str, owner: &str) -> Result<u128, PayoutError> {
        let data = erc20_balance_of_data(owner)?;
        let raw: String = self
            .call("eth_call", json!([{ "to": token, "data": data }, "latest"]))
            .await?;
        parse_quantity(&raw)
    }
}

/// Signer backed by an account the JSON-RPC node manages (eth_sendTransaction).
#[derive(Debug, Clone)]
pub struct RpcSigner {
    rpc: JsonRpc,
    address: String,
    confirmation_timeout: Duration,
}

impl RpcSigner {
    pub fn new(rpc: JsonRpc, address: impl Into<String>, confirmation_timeout: Duration) -> Self {
        Self {
            rpc,
            address: address.into(),
            confirmation_timeout,
        }
    }
}

#[async_trait]
impl SigningCapability for RpcSigner {
    fn address(&self) -> &str {
        &self.address
    }

    async fn network(&self) -> Result<NetworkId, PayoutError> {
        NetworkId::from_chain_id(self.rpc.chain_id().await?)
    }

    async fn send_transaction(&self, tx: &TxRequest) -> Result<String, PayoutError> {
        let hash = self.rpc.send_transaction(&self.address, tx).await?;
        debug!(tx_hash = %hash, to = %tx.to, "transaction broadcast");
        Ok(hash)
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt, PayoutError> {
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_secs(1).min(self.confirmation_timeout / 4),
            max_interval: Duration::from_secs(15),
            max_elapsed_time: Some(self.confirmation_timeout),
            multiplier: 1.5,
            ..Default::default()
        };

        let rpc = self.rpc.clone();
        let hash = tx_hash.to_string();
        let receipt = retry(backoff, || {
            let rpc = rpc.clone();
            let hash = hash.clone();
            async move {
                match rpc.transaction_receipt(&hash).await {
                    Ok(Some(receipt)) => Ok(receipt),
                    Ok(None) => Err(backoff::Error::transient(PayoutError::ExecutionFailure(
                        format!("confirmation for {hash} timed out"),
                    ))),
                    Err(err) => Err(backoff::Error::transient(err)),
                }
            }
        })
        .await?;

        let success = match receipt.status.as_deref() {
            Some(status) => parse_quantity(status)? == 1,
            // pre-byzantium receipts carry no status
            None => true,
        };
        let block_number = receipt
            .block_number
            .as_deref()
            .map(parse_quantity)
            .transpose()?
            .and_then(|n| u64::try_from(n).ok());

        Ok(TxReceipt {
            tx_hash: receipt.transaction_hash,
            success,
            block_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, routing::post, Json, Router};
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Arc;

    const OWNER: &str = "0x00000000000000000000000000000000000000aa";

    type Replies = Arc<HashMap<&'static str, Value>>;

    async fn reply(State(replies): State<Replies>, Json(req): Json<Value>) -> Json<Value> {
        let method = req.get("method").and_then(Value::as_str).unwrap_or_default();
        Json(replies.get(method).cloned().unwrap_or(Value::Null))
    }

    /// Node on a local port answering each method with a fixed body.
    async fn node(replies: Vec<(&'static str, Value)>) -> JsonRpc {
        let app = Router::new()
            .route("/", post(reply))
            .with_state(Arc::new(replies.into_iter().collect::<HashMap<_, _>>()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        JsonRpc::new(format!("http://{addr}"))
    }

    fn result(value: Value) -> Value {
        json!({ "jsonrpc": "2.0", "id": 1, "result": value })
    }

    #[test]
    fn parses_hex_quantities() {
        assert_eq!(parse_quantity("0x89").unwrap(), 137);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn decodes_receipt_fields() {
        let receipt: RpcReceipt = serde_json::from_value(json!({
            "transactionHash": "0xabc",
            "status": "0x0",
            "blockNumber": "0x10",
            "logs": []
        }))
        .unwrap();
        assert_eq!(receipt.status.as_deref(), Some("0x0"));
        assert_eq!(parse_quantity(receipt.block_number.as_deref().unwrap()).unwrap(), 16);
    }

    #[tokio::test]
    async fn non_object_reply_is_provider_error() {
        let rpc = node(vec![("eth_chainId", json!([])), ("eth_accounts", json!("ok"))]).await;
        assert!(matches!(
            rpc.chain_id().await,
            Err(PayoutError::Provider(msg)) if msg.contains("non-object")
        ));
        assert!(matches!(rpc.accounts().await, Err(PayoutError::Provider(_))));
    }

    #[tokio::test]
    async fn error_member_surfaces_its_message() {
        let rpc = node(vec![(
            "eth_chainId",
            json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32000, "message": "header not found" } }),
        )])
        .await;
        assert_eq!(
            rpc.chain_id().await,
            Err(PayoutError::Provider("header not found".into()))
        );
    }

    #[tokio::test]
    async fn pending_receipt_times_out() {
        let rpc = node(vec![("eth_getTransactionReceipt", result(Value::Null))]).await;
        let signer = RpcSigner::new(rpc, OWNER, Duration::from_millis(200));
        let err = signer.wait_for_receipt("0xabc").await.unwrap_err();
        assert_eq!(
            err,
            PayoutError::ExecutionFailure("confirmation for 0xabc timed out".into())
        );
    }

    #[tokio::test]
    async fn zero_status_receipt_is_unsuccessful() {
        let rpc = node(vec![(
            "eth_getTransactionReceipt",
            result(json!({ "transactionHash": "0xabc", "status": "0x0", "blockNumber": "0x10" })),
        )])
        .await;
        let signer = RpcSigner::new(rpc, OWNER, Duration::from_secs(5));
        let receipt = signer.wait_for_receipt("0xabc").await.unwrap();
        assert!(!receipt.success);
        assert_eq!(receipt.block_number, Some(16));
    }

    #[tokio::test]
    async fn confirmed_receipt_and_missing_status() {
        let rpc = node(vec![(
            "eth_getTransactionReceipt",
            result(json!({ "transactionHash": "0xabc", "status": "0x1" })),
        )])
        .await;
        let signer = RpcSigner::new(rpc.clone(), OWNER, Duration::from_secs(5));
        let receipt = signer.wait_for_receipt("0xabc").await.unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.block_number, None);

        let legacy = node(vec![(
            "eth_getTransactionReceipt",
            result(json!({ "transactionHash": "0xdef" })),
        )])
        .await;
        let signer = RpcSigner::new(legacy, OWNER, Duration::from_secs(5));
        assert!(signer.wait_for_receipt("0xdef").await.unwrap().success);
    }
}
