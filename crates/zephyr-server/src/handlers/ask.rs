//! Ask endpoint

use crate::{error::ServerResult, server::ServerState};
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use tracing::warn;
use zephyr_core::{GenerationOutcome, GenerationRequest};

/// `POST /ask-zephyr`
pub async fn ask_zephyr(
    State(state): State<ServerState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> ServerResult<Json<GenerationOutcome>> {
    let Json(request) = payload.map_err(|rejection| {
        warn!("Rejected request body: {}", rejection.body_text());
        rejection
    })?;

    let outcome = state.service.handle(&request).await?;
    Ok(Json(outcome))
}
