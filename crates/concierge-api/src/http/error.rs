//! Error-to-response mapping for the whole API.
//!
//! Every failure leaves through this one `IntoResponse` impl as a JSON
//! envelope with a stable machine-readable code:
//!
//! ```json
//! { "errors": [{ "code": "CONVERSATION_NOT_FOUND", "message": "..." }] }
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use concierge_core::engine::EngineError;
use concierge_core::service::ServiceError;

#[derive(Debug)]
pub enum ApiError {
    Service(ServiceError),
    Validation(String),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Service(ServiceError::NotFound) => (
                StatusCode::NOT_FOUND,
                "CONVERSATION_NOT_FOUND",
                "Conversation not found".to_string(),
            ),
            ApiError::Service(ServiceError::NotSuspended) => (
                StatusCode::CONFLICT,
                "NOT_SUSPENDED",
                "Conversation is not awaiting human input".to_string(),
            ),
            ApiError::Service(ServiceError::Engine(
                err @ EngineError::StepLimitExceeded { .. },
            )) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STEP_LIMIT_EXCEEDED",
                err.to_string(),
            ),
            ApiError::Service(ServiceError::Engine(
                err @ EngineError::RoutingViolation { .. },
            )) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ROUTING_VIOLATION",
                err.to_string(),
            ),
            ApiError::Service(ServiceError::Store(err)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_ERROR",
                err.to_string(),
            ),
            ApiError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
        };

        let body = json!({
            "errors": [{
                "code": code,
                "message": message,
            }]
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_errors_map_to_stable_statuses() {
        let resp = ApiError::from(ServiceError::NotFound).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = ApiError::from(ServiceError::NotSuspended).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = ApiError::from(ServiceError::Engine(EngineError::StepLimitExceeded {
            max_steps: 25,
        }))
        .into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_validation_is_a_bad_request() {
        let resp = ApiError::Validation("message must not be empty".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
