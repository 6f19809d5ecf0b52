use axum::{Json, extract::State};
use dv_api_types::{VoteRequest, VoteResponse, VotingDataResponse};

use crate::{AppState, ApiResult, vote_error};

pub(crate) async fn voting_data(State(state): State<AppState>) -> ApiResult<VotingDataResponse> {
    let snapshot = state.session.reload().await.map_err(vote_error)?;
    Ok(Json(snapshot.to_response()))
}

pub(crate) async fn cast_vote(
    State(state): State<AppState>,
    Json(request): Json<VoteRequest>,
) -> ApiResult<VoteResponse> {
    let receipt = state
        .session
        .cast_vote(request.candidate_id)
        .await
        .map_err(vote_error)?;

    Ok(Json(VoteResponse {
        transaction_hash: receipt.transaction_hash,
    }))
}
