//! Conversation inspection and resume endpoints.
//!
//! - GET  /api/v1/conversations/{id}        - Fetch a stored conversation
//! - POST /api/v1/conversations/{id}/resume - Answer a suspended one

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use concierge_core::service::ChatOutcome;
use concierge_types::conversation::ConversationState;

use crate::http::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ResumeRequest {
    pub feedback: String,
}

/// Parse a UUID path parameter, 400 on bad format.
fn parse_uuid(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse::<Uuid>()
        .map_err(|_| ApiError::Validation(format!("invalid conversation id: {raw}")))
}

/// GET /api/v1/conversations/{id} - The stored state, verbatim.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationState>, ApiError> {
    let id = parse_uuid(&id)?;
    let conversation = state.service.get(id).await?;
    Ok(Json(conversation))
}

/// POST /api/v1/conversations/{id}/resume - Feed the human's answer back
/// into a suspended conversation and run it forward.
pub async fn resume(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ResumeRequest>,
) -> Result<Json<ChatOutcome>, ApiError> {
    let id = parse_uuid(&id)?;
    if req.feedback.trim().is_empty() {
        return Err(ApiError::Validation(
            "feedback must not be empty".to_string(),
        ));
    }

    let outcome = state.service.resume(id, &req.feedback).await?;
    Ok(Json(outcome))
}
