use axum::{Json, extract::State};
use dv_api_types::{BindingMode, ContractAddress, ManualContractRequest, NetworkListResponse, SessionStatus};
use tracing::info;

use crate::{AppState, ApiResult, bad_request, vote_error};

pub(crate) async fn networks(State(state): State<AppState>) -> Json<NetworkListResponse> {
    let registry = state.session.registry();
    Json(NetworkListResponse {
        environment: registry.environment(),
        networks: registry.entries().to_vec(),
    })
}

pub(crate) async fn session_status(State(state): State<AppState>) -> Json<SessionStatus> {
    Json(state.session.status())
}

/// Connects the wallet. In manual mode with a configured contract address,
/// binds it straight away.
pub(crate) async fn session_connect(State(state): State<AppState>) -> ApiResult<SessionStatus> {
    state.session.connect().await.map_err(vote_error)?;

    if state.session.mode() == BindingMode::Manual {
        if let Some(address) = &state.manual_contract {
            info!(address = %address, "binding configured contract");
            state
                .session
                .bind_manual(ContractAddress(address.clone()))
                .await
                .map_err(vote_error)?;
        }
    }

    Ok(Json(state.session.status()))
}

pub(crate) async fn session_bind_contract(
    State(state): State<AppState>,
    Json(request): Json<ManualContractRequest>,
) -> ApiResult<SessionStatus> {
    let address = request.contract_address.trim();
    if address.is_empty() {
        return Err(bad_request("contract_address is required"));
    }

    state
        .session
        .bind_manual(ContractAddress(address.to_owned()))
        .await
        .map_err(vote_error)?;

    Ok(Json(state.session.status()))
}

pub(crate) async fn session_auto_detect(State(state): State<AppState>) -> ApiResult<SessionStatus> {
    state.session.autodetect().await.map_err(vote_error)?;
    Ok(Json(state.session.status()))
}
