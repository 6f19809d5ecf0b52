mod config;
mod session;
mod voting;

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use dv_chain_evm::JsonRpcProvider;
use dv_voting_core::{ChainBinding, ErrorKind, NetworkRegistry, Session, VoteError};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::ServiceConfig;

#[derive(Debug, Serialize)]
struct HealthResponse {
    service: &'static str,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    service: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
}

pub(crate) type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) session: Arc<Session>,
    pub(crate) manual_contract: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServiceConfig::from_env()?;

    let registry = match &config.networks_file {
        Some(path) => NetworkRegistry::from_json_file(path, config.voting.environment)?,
        None => NetworkRegistry::for_environment(config.voting.environment),
    };
    info!(
        environment = registry.environment().as_str(),
        networks = registry.entries().len(),
        "network table loaded"
    );

    let provider = Arc::new(JsonRpcProvider::new(Some(config.rpc_url.clone())));
    provider.watch(config.watch_interval);
    info!("using rpc endpoint {}", provider.endpoint());

    let session = Session::new(
        ChainBinding::new(provider),
        Arc::new(registry),
        config.voting.clone(),
    )?;
    info!(session = %session.id(), mode = ?session.mode(), "voting session created");

    let state = AppState {
        session: session.clone(),
        manual_contract: config.manual_contract.clone(),
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("voting-service listening on {}", config.bind_addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    session.teardown();
    Ok(())
}

pub(crate) fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/networks", get(session::networks))
        .route("/session", get(session::session_status))
        .route("/session/connect", post(session::session_connect))
        .route("/session/contract", post(session::session_bind_contract))
        .route("/session/auto-detect", post(session::session_auto_detect))
        .route("/voting", get(voting::voting_data))
        .route("/vote", post(voting::cast_vote))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", err);
    }
    info!("shutting down");
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "voting-service",
        status: "ok",
    })
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        service: "voting-service",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub(crate) fn bad_request(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_owned(),
            kind: None,
        }),
    )
}

pub(crate) fn vote_error(err: VoteError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match err.kind() {
        ErrorKind::NoProvider => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::AccessDenied | ErrorKind::TransactionDenied => StatusCode::FORBIDDEN,
        ErrorKind::InvalidCandidate => StatusCode::BAD_REQUEST,
        ErrorKind::UnsupportedNetwork | ErrorKind::ResourceLimitExceeded => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::RemoteCallFailed => StatusCode::BAD_GATEWAY,
        ErrorKind::ContractUnavailable
        | ErrorKind::NotConnected
        | ErrorKind::AlreadyVoted
        | ErrorKind::OperationInProgress
        | ErrorKind::Superseded => StatusCode::CONFLICT,
    };

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind: Some(err.kind()),
        }),
    )
}
