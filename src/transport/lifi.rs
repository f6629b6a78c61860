// Routing oracle HTTP client
// This file implements the cross-network route oracle over the LI.FI REST API:
// route candidates, step transaction population and transfer status polling
//
// Numan Thabit 2025 Nov

use crate::errors::PayoutError;
use crate::metrics::{REQ_ERRORS, REQ_LATENCY};
use crate::router::oracle::{RoutingOracle, TransferStatus};
use crate::router::routes::{BridgeQuote, RouteQuery};
use crate::signing::TxRequest;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "https://li.quest/v1";

#[derive(Clone)]
pub struct LifiOracle {
    endpoint: Url,
    client: reqwest::Client,
    integrator: String,
    api_key: Option<String>,
    transfer_timeout: Duration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RoutesRequest<'a> {
    from_chain_id: u64,
    to_chain_id: u64,
    from_token_address: &'a str,
    to_token_address: &'a str,
    from_amount: String,
    from_address: &'a str,
    to_address: &'a str,
    options: RouteOptions<'a>,
}

#[derive(Debug, Serialize)]
struct RouteOptions<'a> {
    integrator: &'a str,
}

#[derive(Debug, Deserialize)]
struct RoutesResponse {
    #[serde(default)]
    routes: Vec<RawRoute>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRoute {
    id: String,
    #[serde(default)]
    to_amount_min: Option<String>,
    #[serde(default)]
    steps: Vec<serde_json::Value>,
}

impl From<RawRoute> for BridgeQuote {
    fn from(raw: RawRoute) -> Self {
        let first = raw.steps.first();
        let tool = first
            .and_then(|s| s.get("tool"))
            .and_then(|t| t.as_str())
            .map(str::to_string);
        let approval_address = first
            .and_then(|s| s.pointer("/estimate/approvalAddress"))
            .and_then(|a| a.as_str())
            .map(str::to_string);
        BridgeQuote {
            id: raw.id,
            tool,
            to_amount_min: raw.to_amount_min,
            approval_address,
            steps: raw.steps,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PopulatedStep {
    #[serde(default)]
    transaction_request: Option<TxRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    status: String,
    #[serde(default)]
    substatus_message: Option<String>,
    #[serde(default)]
    receiving: Option<ReceivingLeg>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceivingLeg {
    #[serde(default)]
    tx_hash: Option<String>,
}

impl LifiOracle {
    pub fn new(
        endpoint: Url,
        integrator: impl Into<String>,
        api_key: Option<String>,
        transfer_timeout: Duration,
    ) -> Result<Self, PayoutError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| PayoutError::Transport(format!("build routing HTTP client: {e}")))?;

        Ok(Self {
            endpoint,
            client,
            integrator: integrator.into(),
            api_key,
            transfer_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.as_str().trim_end_matches('/'), path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, PayoutError> {
        let _timer = REQ_LATENCY.with_label_values(&["routing", method]).start_timer();
        let request = match &self.api_key {
            Some(key) => request.header("x-lifi-api-key", key),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            REQ_ERRORS.with_label_values(&["routing", method]).inc();
            PayoutError::Transport(format!("routing {method}: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            REQ_ERRORS.with_label_values(&["routing", method]).inc();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, method = method, "routing oracle returned error");
            return Err(PayoutError::Provider(format!("routing {method}: http {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| PayoutError::Provider(format!("routing {method}: decode: {e}")))
    }

    async fn transfer_status(&self, query: &[(&str, String)]) -> Result<StatusResponse, PayoutError> {
        let request = self.client.get(self.url("status")).query(query);
        self.send("status", request).await
    }
}

#[async_trait]
impl RoutingOracle for LifiOracle {
    async fn routes(&self, query: &RouteQuery) -> Result<Vec<BridgeQuote>, PayoutError> {
        let body = RoutesRequest {
            from_chain_id: query.from_network.chain_id(),
            to_chain_id: query.to_network.chain_id(),
            from_token_address: &query.from_token,
            to_token_address: &query.to_token,
            from_amount: query.from_amount.to_string(),
            from_address: &query.from_address,
            to_address: &query.to_address,
            options: RouteOptions {
                integrator: &self.integrator,
            },
        };
        let request = self.client.post(self.url("advanced/routes")).json(&body);
        let response: RoutesResponse = self.send("routes", request).await?;
        debug!(candidates = response.routes.len(), "routing oracle answered");
        Ok(response.routes.into_iter().map(BridgeQuote::from).collect())
    }

    async fn step_transaction(&self, step: &serde_json::Value) -> Result<TxRequest, PayoutError> {
        let request = self
            .client
            .post(self.url("advanced/stepTransaction"))
            .json(step);
        let populated: PopulatedStep = self.send("step_transaction", request).await?;
        populated
            .transaction_request
            .ok_or_else(|| PayoutError::Provider("step has no transaction request".into()))
    }

    async fn wait_for_transfer(
        &self,
        tx_hash: &str,
        step: &serde_json::Value,
    ) -> Result<TransferStatus, PayoutError> {
        let mut query = vec![("txHash", tx_hash.to_string())];
        if let Some(tool) = step.get("tool").and_then(|t| t.as_str()) {
            query.push(("bridge", tool.to_string()));
        }
        for (param, pointer) in [("fromChain", "/action/fromChainId"), ("toChain", "/action/toChainId")] {
            if let Some(id) = step.pointer(pointer).and_then(|v| v.as_u64()) {
                query.push((param, id.to_string()));
            }
        }

        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_secs(5).min(self.transfer_timeout / 4),
            max_interval: Duration::from_secs(60),
            max_elapsed_time: Some(self.transfer_timeout),
            multiplier: 1.5,
            ..Default::default()
        };

        retry(backoff, || {
            let query = query.clone();
            async move {
                let status = self
                    .transfer_status(&query)
                    .await
                    .map_err(backoff::Error::transient)?;
                match status.status.as_str() {
                    "DONE" => Ok(TransferStatus::Done {
                        receiving_tx_hash: status.receiving.and_then(|r| r.tx_hash),
                    }),
                    "FAILED" | "INVALID" => Ok(TransferStatus::Failed {
                        reason: status
                            .substatus_message
                            .unwrap_or_else(|| status.status.to_lowercase()),
                    }),
                    other => Err(backoff::Error::transient(PayoutError::ExecutionFailure(
                        format!("transfer still {} when status wait timed out", other.to_lowercase()),
                    ))),
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, State};
    use axum::{routing::get, Json, Router};
    use serde_json::{json, Value};
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct StatusFeed {
        replies: Arc<Mutex<VecDeque<Value>>>,
        queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    }

    /// Replies in order; the last one repeats.
    async fn status(
        State(feed): State<StatusFeed>,
        Query(query): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        feed.queries.lock().unwrap().push(query);
        let mut replies = feed.replies.lock().unwrap();
        let next = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        };
        Json(next.unwrap_or(Value::Null))
    }

    async fn status_oracle(replies: Vec<Value>, transfer_timeout: Duration) -> (LifiOracle, StatusFeed) {
        let feed = StatusFeed {
            replies: Arc::new(Mutex::new(replies.into())),
            ..Default::default()
        };
        let app = Router::new()
            .route("/status", get(status))
            .with_state(feed.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let endpoint = Url::parse(&format!("http://{addr}/")).unwrap();
        let oracle = LifiOracle::new(endpoint, "tests", None, transfer_timeout).unwrap();
        (oracle, feed)
    }

    fn step() -> Value {
        json!({ "tool": "across", "action": { "fromChainId": 137, "toChainId": 10 } })
    }

    #[test]
    fn raw_route_maps_tool_and_approval() {
        let raw: RawRoute = serde_json::from_value(json!({
            "id": "route-1",
            "toAmountMin": "4990000",
            "steps": [{
                "tool": "across",
                "estimate": { "approvalAddress": "0x1231DEB6f5749EF6cE6943a275A1D3E7486F4EaE" },
                "action": { "fromChainId": 137, "toChainId": 10 }
            }]
        }))
        .unwrap();
        let quote = BridgeQuote::from(raw);
        assert_eq!(quote.id, "route-1");
        assert_eq!(quote.tool.as_deref(), Some("across"));
        assert_eq!(
            quote.approval_address.as_deref(),
            Some("0x1231DEB6f5749EF6cE6943a275A1D3E7486F4EaE")
        );
        assert_eq!(quote.steps.len(), 1);
    }

    #[test]
    fn empty_routes_response_decodes() {
        let resp: RoutesResponse = serde_json::from_value(json!({ "routes": [] })).unwrap();
        assert!(resp.routes.is_empty());
    }

    #[tokio::test]
    async fn transfer_polls_until_done() {
        let (oracle, feed) = status_oracle(
            vec![
                json!({ "status": "PENDING" }),
                json!({ "status": "DONE", "receiving": { "txHash": "0xdest" } }),
            ],
            Duration::from_secs(5),
        )
        .await;
        let done = oracle.wait_for_transfer("0xsrc", &step()).await.unwrap();
        assert_eq!(
            done,
            TransferStatus::Done {
                receiving_tx_hash: Some("0xdest".into())
            }
        );

        let queries = feed.queries.lock().unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0]["txHash"], "0xsrc");
        assert_eq!(queries[0]["bridge"], "across");
        assert_eq!(queries[0]["fromChain"], "137");
        assert_eq!(queries[0]["toChain"], "10");
    }

    #[tokio::test]
    async fn failed_transfer_carries_reason() {
        let (oracle, _) = status_oracle(
            vec![json!({ "status": "FAILED", "substatusMessage": "refunded on source" })],
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(
            oracle.wait_for_transfer("0xsrc", &step()).await.unwrap(),
            TransferStatus::Failed {
                reason: "refunded on source".into()
            }
        );

        let (oracle, _) = status_oracle(vec![json!({ "status": "INVALID" })], Duration::from_secs(5)).await;
        assert_eq!(
            oracle.wait_for_transfer("0xsrc", &step()).await.unwrap(),
            TransferStatus::Failed {
                reason: "invalid".into()
            }
        );
    }

    #[tokio::test]
    async fn pending_transfer_times_out() {
        let (oracle, _) =
            status_oracle(vec![json!({ "status": "PENDING" })], Duration::from_millis(200)).await;
        let err = oracle.wait_for_transfer("0xsrc", &step()).await.unwrap_err();
        assert_eq!(
            err,
            PayoutError::ExecutionFailure("transfer still pending when status wait timed out".into())
        );
    }
}
