// HTTP API implementation
// This file provides HTTP endpoints for submitting payout batches, streaming
// their progress, and reading, exporting and clearing per-account history
//
// Numan Thabit 2025 Nov

use crate::batch::{BatchContext, BatchEvent, BatchExecutor, BatchRun, CancelHandle};
use crate::errors::PayoutError;
use crate::history::HistoryEntry;
use crate::metrics;
use crate::networks::{NetworkId, TOKEN_DECIMALS};
use crate::payout::{AccountId, PayoutOutcome, PayoutRequest};
use crate::reports::{self, Destination, HistorySummary, ImportReport, RowDiagnostic};
use crate::signing::SigningCapability;
use crate::state::{SessionSnapshot, SessionState};
use crate::transport::jsonrpc::JsonRpc;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{delete, get, post},
    Router,
};
use futures::stream::{self, Stream, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

#[derive(Clone)]
pub struct ApiState {
    executor: Arc<BatchExecutor>,
    signer: Option<Arc<dyn SigningCapability>>,
    session: SessionState,
    balances: Option<JsonRpc>,
}

impl ApiState {
    pub fn new(
        executor: Arc<BatchExecutor>,
        signer: Option<Arc<dyn SigningCapability>>,
        session: SessionState,
    ) -> Self {
        Self {
            executor,
            signer,
            session,
            balances: None,
        }
    }

    /// Enable token balance lookups for the session endpoint.
    pub fn with_balances(mut self, rpc: JsonRpc) -> Self {
        self.balances = Some(rpc);
        self
    }

    async fn batch_context(&self) -> Result<BatchContext, ApiError> {
        let signer = self.signer.clone().ok_or(PayoutError::WalletNotConnected)?;
        let source_network = signer.network().await?;
        Ok(BatchContext {
            source_network,
            account: Some(signer.address().to_string()),
            signer: Some(signer),
        })
    }
}

pub fn create_api_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .route("/api/v1/session", get(get_session))
        .route("/api/v1/batches", post(run_batch))
        .route("/api/v1/batches/stream", post(stream_batch))
        .route("/api/v1/batches/:account", delete(cancel_batch))
        .route("/api/v1/history/:account", get(get_history).delete(clear_history))
        .route("/api/v1/history/:account/export", get(export_history))
        .route("/api/v1/dashboard/:account", get(get_dashboard))
        .with_state(state)
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<RowDiagnostic>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    rejected: Vec<RowDiagnostic>,
}

impl ApiError {
    fn bad_request(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
            rejected: Vec::new(),
        }
    }
}

fn status_for(err: &PayoutError) -> StatusCode {
    match err {
        PayoutError::InvalidInput(_) | PayoutError::UnsupportedNetwork(_) => StatusCode::BAD_REQUEST,
        PayoutError::WalletNotConnected => StatusCode::PRECONDITION_FAILED,
        PayoutError::BatchInProgress(_) => StatusCode::CONFLICT,
        PayoutError::Transport(_) | PayoutError::Provider(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<PayoutError> for ApiError {
    fn from(err: PayoutError) -> Self {
        Self {
            status: status_for(&err),
            error: err.to_string(),
            rejected: Vec::new(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.error,
            rejected: self.rejected,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Health check endpoint
async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn render_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    #[serde(flatten)]
    session: SessionSnapshot,
    /// Payout token balance of the session account on its current network
    token_balance: Option<Decimal>,
}

async fn get_session(State(state): State<ApiState>) -> Json<SessionResponse> {
    let session = state.session.snapshot().await;
    let token_balance = match (&state.balances, &session.account, session.network) {
        (Some(rpc), Some(account), Some(network)) => {
            match state.executor.resolver().registry().token_contract(network) {
                Ok(token) => match rpc.token_balance(token, account).await {
                    Ok(units) => i128::try_from(units)
                        .ok()
                        .map(|units| Decimal::from_i128_with_scale(units, TOKEN_DECIMALS)),
                    Err(err) => {
                        warn!(error = %err, "token balance lookup failed");
                        None
                    }
                },
                Err(_) => None,
            }
        }
        _ => None,
    };
    Json(SessionResponse {
        session,
        token_balance,
    })
}

/// JSON batch submission. Amounts and networks may be strings or numbers.
#[derive(Debug, Deserialize)]
struct BatchBody {
    requests: Vec<RawRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequest {
    #[serde(default)]
    address: String,
    #[serde(default)]
    amount: serde_json::Value,
    #[serde(default)]
    destination_network: serde_json::Value,
}

fn scalar_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_submission(
    headers: &HeaderMap,
    body: &[u8],
    default_network: NetworkId,
) -> Result<ImportReport, ApiError> {
    let is_csv = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/csv"));
    if is_csv {
        return Ok(reports::from_tabular(body, default_network));
    }

    let parsed: BatchBody = serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("invalid batch body: {e}")))?;
    let mut report = ImportReport::default();
    for (index, raw) in parsed.requests.iter().enumerate() {
        let amount = scalar_text(&raw.amount).unwrap_or_default();
        let network = scalar_text(&raw.destination_network);
        match PayoutRequest::parse(&raw.address, &amount, network.as_deref(), default_network) {
            Ok(request) => report.requests.push(request),
            Err(err) => report.rejected.push(RowDiagnostic {
                line: index as u64 + 1,
                reason: err.to_string(),
            }),
        }
    }
    Ok(report)
}

fn require_requests(report: ImportReport) -> Result<(Vec<PayoutRequest>, Vec<RowDiagnostic>), ApiError> {
    if report.requests.is_empty() {
        return Err(ApiError {
            status: StatusCode::BAD_REQUEST,
            error: "no valid payout requests".into(),
            rejected: report.rejected,
        });
    }
    Ok((report.requests, report.rejected))
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    run: BatchRun,
    outcomes: Vec<PayoutOutcome>,
    rejected: Vec<RowDiagnostic>,
}

async fn run_batch(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<BatchResponse>, ApiError> {
    let context = state.batch_context().await?;
    let (requests, rejected) =
        require_requests(parse_submission(&headers, &body, context.source_network)?)?;

    let report = state
        .executor
        .run(requests, context, None, &CancelHandle::new())
        .await?;
    Ok(Json(BatchResponse {
        run: report.run,
        outcomes: report.outcomes,
        rejected,
    }))
}

fn sse_event(name: &'static str, payload: &impl Serialize) -> Result<Event, axum::Error> {
    Event::default().event(name).json_data(payload)
}

fn progress_event(event: &BatchEvent) -> Result<Event, axum::Error> {
    let name = match event {
        BatchEvent::Started { .. } => "started",
        BatchEvent::Outcome { .. } => "outcome",
        BatchEvent::StorageFailed { .. } => "storageFailed",
        BatchEvent::Finished { .. } => "finished",
    };
    sse_event(name, event)
}

async fn stream_batch(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let context = state.batch_context().await?;
    let (requests, rejected) =
        require_requests(parse_submission(&headers, &body, context.source_network)?)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = oneshot::channel();
    let executor = state.executor.clone();
    tokio::spawn(async move {
        let result = executor
            .run(requests, context, Some(tx), &CancelHandle::new())
            .await;
        let _ = done_tx.send(result);
    });

    let head = stream::iter(
        rejected
            .into_iter()
            .map(|row| sse_event("rejected", &row))
            .collect::<Vec<_>>(),
    );
    let progress = UnboundedReceiverStream::new(rx).map(|event| progress_event(&event));
    // batches refused before the first item surface as a single error event
    let tail = stream::once(done_rx).filter_map(|result| async move {
        match result {
            Ok(Err(err)) => Some(sse_event(
                "error",
                &ErrorResponse {
                    error: err.to_string(),
                    rejected: Vec::new(),
                },
            )),
            _ => None,
        }
    });

    Ok(Sse::new(head.chain(progress).chain(tail)).keep_alive(KeepAlive::default()))
}

async fn cancel_batch(
    State(state): State<ApiState>,
    Path(account): Path<String>,
) -> Result<StatusCode, ApiError> {
    let account = AccountId::parse(&account)?;
    if state.executor.cancel(&account) {
        info!(account = %account, "batch cancellation requested");
        Ok(StatusCode::ACCEPTED)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

#[derive(Debug, Default, Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    failed_only: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryItem {
    #[serde(flatten)]
    entry: HistoryEntry,
    network_name: String,
    explorer_url: Option<String>,
}

impl From<HistoryEntry> for HistoryItem {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            network_name: Destination::from(entry.network).to_string(),
            explorer_url: entry.explorer_url(),
            entry,
        }
    }
}

async fn get_history(
    State(state): State<ApiState>,
    Path(account): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryItem>>, ApiError> {
    let account = AccountId::parse(&account)?;
    let mut history = state.executor.history().load(&account).await;
    if query.failed_only {
        history = reports::failed_only(&history);
    }
    Ok(Json(history.into_iter().map(HistoryItem::from).collect()))
}

async fn clear_history(
    State(state): State<ApiState>,
    Path(account): Path<String>,
) -> Result<StatusCode, ApiError> {
    let account = AccountId::parse(&account)?;
    state.executor.history().clear(&account).await?;
    info!(account = %account, "history cleared");
    Ok(StatusCode::NO_CONTENT)
}

async fn export_history(
    State(state): State<ApiState>,
    Path(account): Path<String>,
) -> Result<Response, ApiError> {
    let account = AccountId::parse(&account)?;
    let history = state.executor.history().load(&account).await;
    let csv = reports::to_tabular(&history)?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        reports::export_filename(&account)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DestinationTotal {
    network: String,
    chain_id: Option<u64>,
    /// Rounded to two decimal places
    total: String,
}

#[derive(Debug, Serialize)]
struct DashboardResponse {
    totals: Vec<DestinationTotal>,
    summary: HistorySummary,
}

async fn get_dashboard(
    State(state): State<ApiState>,
    Path(account): Path<String>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let account = AccountId::parse(&account)?;
    let history = state.executor.history().load(&account).await;
    let totals = reports::totals_by_destination(&history)
        .into_iter()
        .map(|(destination, total)| DestinationTotal {
            network: destination.to_string(),
            chain_id: match destination {
                Destination::Network(network) => Some(network.chain_id()),
                Destination::Unknown => None,
            },
            total: format!("{:.2}", total),
        })
        .collect();
    Ok(Json(DashboardResponse {
        totals,
        summary: reports::summary(&history),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistoryStore;
    use crate::networks::NetworkRegistry;
    use crate::router::{BridgeQuote, RouteQuery, RouteResolver, RoutingOracle, TransferStatus};
    use crate::signing::{TxReceipt, TxRequest};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    const OWNER: &str = "0x00000000000000000000000000000000000000Aa";
    const A: &str = "0x1111111111111111111111111111111111111111";
    const B: &str = "0x2222222222222222222222222222222222222222";

    struct NoRoutes;

    #[async_trait]
    impl RoutingOracle for NoRoutes {
        async fn routes(&self, _query: &RouteQuery) -> Result<Vec<BridgeQuote>, PayoutError> {
            Ok(Vec::new())
        }

        async fn step_transaction(&self, _step: &serde_json::Value) -> Result<TxRequest, PayoutError> {
            Err(PayoutError::Provider("unused".into()))
        }

        async fn wait_for_transfer(
            &self,
            _tx_hash: &str,
            _step: &serde_json::Value,
        ) -> Result<TransferStatus, PayoutError> {
            Err(PayoutError::Provider("unused".into()))
        }
    }

    struct PolygonSigner;

    #[async_trait]
    impl SigningCapability for PolygonSigner {
        fn address(&self) -> &str {
            OWNER
        }

        async fn network(&self) -> Result<NetworkId, PayoutError> {
            Ok(NetworkId::Polygon)
        }

        async fn send_transaction(&self, _tx: &TxRequest) -> Result<String, PayoutError> {
            Ok("0xabc123".into())
        }

        async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt, PayoutError> {
            Ok(TxReceipt {
                tx_hash: tx_hash.into(),
                success: true,
                block_number: Some(7),
            })
        }
    }

    fn app(with_signer: bool) -> Router {
        let resolver = Arc::new(RouteResolver::new(NetworkRegistry::default(), Arc::new(NoRoutes)));
        let executor = Arc::new(BatchExecutor::new(resolver, Arc::new(MemoryHistoryStore::new())));
        let signer: Option<Arc<dyn SigningCapability>> = if with_signer {
            Some(Arc::new(PolygonSigner))
        } else {
            None
        };
        create_api_router(ApiState::new(executor, signer, SessionState::new(8)))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, _, _) = send(&app(false), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn batch_without_signer_is_refused() {
        let body = serde_json::json!({ "requests": [{ "address": A, "amount": "1" }] });
        let (status, _, body) = send(&app(false), post_json("/api/v1/batches", body)).await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "wallet not connected");
    }

    #[tokio::test]
    async fn batch_records_history_and_dashboard() {
        let app = app(true);
        let body = serde_json::json!({ "requests": [
            { "address": A, "amount": "10" },
            { "address": B, "amount": 5, "destinationNetwork": 10 },
            { "address": "0xbad", "amount": "1" }
        ]});
        let (status, _, body) = send(&app, post_json("/api/v1/batches", body)).await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["run"]["status"], "completed");
        assert_eq!(value["outcomes"][0]["txHash"], "0xabc123");
        assert_eq!(value["outcomes"][1]["error"], "No route found");
        assert_eq!(value["rejected"][0]["line"], 3);

        let account = OWNER.to_ascii_lowercase();
        let (_, _, body) = send(&app, get(&format!("/api/v1/history/{account}"))).await;
        let history: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(history.as_array().unwrap().len(), 2);
        assert_eq!(history[1]["explorerUrl"], "https://polygonscan.com/tx/0xabc123");

        let (_, _, body) = send(&app, get(&format!("/api/v1/history/{account}?failed_only=true"))).await;
        let failed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(failed.as_array().unwrap().len(), 1);

        let (_, _, body) = send(&app, get(&format!("/api/v1/dashboard/{account}"))).await;
        let dashboard: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(dashboard["totals"][0]["network"], "Polygon");
        assert_eq!(dashboard["totals"][0]["total"], "10.00");
        assert_eq!(dashboard["totals"][1]["network"], "Optimism");
        assert_eq!(dashboard["totals"][1]["total"], "5.00");
        assert_eq!(dashboard["summary"]["failedTransactions"], 1);
    }

    #[tokio::test]
    async fn csv_submission_export_and_clear() {
        let app = app(true);
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/batches")
            .header(header::CONTENT_TYPE, "text/csv")
            .body(Body::from(format!("address,amount\n{A},2.5\n")))
            .unwrap();
        let (status, _, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);

        let account = OWNER.to_ascii_lowercase();
        let (status, headers, body) = send(&app, get(&format!("/api/v1/history/{account}/export"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/csv");
        assert!(headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains(&format!("payoutHistory_{account}.csv")));
        let csv = String::from_utf8(body.to_vec()).unwrap();
        assert!(csv.contains(r#""2.5","0xabc123","Polygon""#));

        let delete = Request::builder()
            .method("DELETE")
            .uri(format!("/api/v1/history/{account}"))
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&app, delete).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, _, body) = send(&app, get(&format!("/api/v1/dashboard/{account}"))).await;
        let dashboard: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(dashboard["totals"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_submission_lists_rejected_rows() {
        let body = serde_json::json!({ "requests": [{ "address": A, "amount": "-1" }] });
        let (status, _, body) = send(&app(true), post_json("/api/v1/batches", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["rejected"][0]["line"], 1);
    }

    #[tokio::test]
    async fn stream_emits_progress_events() {
        let body = serde_json::json!({ "requests": [{ "address": A, "amount": "1" }] });
        let (status, _, body) = send(&app(true), post_json("/api/v1/batches/stream", body)).await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body.to_vec()).unwrap();
        let started = text.find("event: started").unwrap();
        let outcome = text.find("event: outcome").unwrap();
        let finished = text.find("event: finished").unwrap();
        assert!(started < outcome && outcome < finished);
    }

    #[tokio::test]
    async fn cancel_without_running_batch_is_not_found() {
        let request = Request::builder()
            .method("DELETE")
            .uri("/api/v1/batches/0xabc")
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&app(true), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
