use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use usdc_payout::api::{create_api_router, ApiState};
use usdc_payout::batch::BatchExecutor;
use usdc_payout::config::AppConfig;
use usdc_payout::history::{FileHistoryStore, HistoryStore};
use usdc_payout::router::{RouteResolver, RoutingOracle};
use usdc_payout::signing::SigningCapability;
use usdc_payout::state::{start_session_watch, SessionState};
use usdc_payout::transport::jsonrpc::{JsonRpc, RpcSigner};
use usdc_payout::transport::lifi::LifiOracle;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("initialize tracing subscriber")?;

    if let Err(err) = run().await {
        tracing::error!(error = ?err, "fatal payout service error");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let config = AppConfig::load().context("load configuration from environment")?;
    let registry = config.registry().context("parse enabled networks")?;
    let listen_addr = config.listen_addr()?;

    let jsonrpc = JsonRpc::new(config.rpc_endpoint.to_string());

    let signer_address = match config.signer_address()? {
        Some(address) => Some(address),
        None => match jsonrpc.accounts().await {
            Ok(accounts) => accounts.into_iter().next(),
            Err(err) => {
                warn!(error = %err, "could not list node accounts");
                None
            }
        },
    };
    let signer: Option<Arc<dyn SigningCapability>> = match signer_address {
        Some(address) => Some(Arc::new(RpcSigner::new(
            jsonrpc.clone(),
            address,
            config.confirmation_timeout(),
        ))),
        None => {
            warn!("no signer account configured or available; batches will be refused");
            None
        }
    };

    let oracle: Arc<dyn RoutingOracle> = Arc::new(
        LifiOracle::new(
            config.routing_endpoint()?,
            config.integrator(),
            config.routing_api_key.clone(),
            config.confirmation_timeout(),
        )
        .context("initialize routing oracle client")?,
    );
    let resolver = Arc::new(RouteResolver::new(registry, oracle));

    let history: Arc<dyn HistoryStore> = Arc::new(FileHistoryStore::with_limit(
        config.history_dir(),
        config.history_limit()?,
    ));
    let executor = Arc::new(BatchExecutor::new(resolver.clone(), history));

    let session = SessionState::new(64);
    let _session_handle = start_session_watch(
        jsonrpc.clone(),
        session.clone(),
        config.session_poll_interval(),
    );
    info!("started wallet session watch");

    let state = ApiState::new(executor, signer.clone(), session.clone()).with_balances(jsonrpc.clone());
    let api_router = create_api_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("bind API server address {listen_addr}"))?;

    info!(
        address = %listen_addr,
        rpc = %jsonrpc.endpoint(),
        signer = ?signer.as_ref().map(|s| s.address().to_string()),
        networks = ?resolver.registry().networks().collect::<Vec<_>>(),
        history_dir = %config.history_dir().display(),
        "USDC payout service online"
    );

    let _api_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, api_router).await {
            warn!(error = %e, "API server error");
        }
    });

    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let stats = resolver.executor().get_stats();
                let current = session.snapshot().await;
                info!(
                    total_executions = stats.total_executions,
                    successful = stats.successful_executions,
                    failed = stats.failed_executions,
                    success_rate = stats.success_rate,
                    avg_confirmation_ms = ?stats.avg_confirmation_ms,
                    account = ?current.account,
                    chain_id = ?current.chain_id,
                    "payout heartbeat"
                );
            }
            res = tokio::signal::ctrl_c() => {
                if let Err(err) = res {
                    warn!(error = %err, "ctrl_c listener error");
                }
                info!("Shutdown signal received, exiting");
                break;
            }
        }
    }
    Ok(())
}

fn init_tracing() -> Result<()> {
    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,hyper=warn,reqwest=warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("tracing subscriber init: {err}"))
}
