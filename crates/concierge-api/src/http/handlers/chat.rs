//! POST /api/v1/chat -- one user turn through the interactive graph.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use concierge_core::service::ChatOutcome;

use crate::http::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
    /// Omit to start a new conversation.
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
}

/// POST /api/v1/chat - Run one turn; a message to a suspended
/// conversation counts as the awaited feedback.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatOutcome>, ApiError> {
    if req.user_id.trim().is_empty() {
        return Err(ApiError::Validation("user_id must not be empty".to_string()));
    }
    if req.message.trim().is_empty() {
        return Err(ApiError::Validation("message must not be empty".to_string()));
    }

    let outcome = state
        .service
        .chat(&req.user_id, &req.message, req.conversation_id)
        .await?;
    Ok(Json(outcome))
}
