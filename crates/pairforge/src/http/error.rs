//! JSON error responses.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pairforge_instance::InstanceError;
use serde::Serialize;

/// An error rendered as `{"error": "..."}` with a matching status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
    error: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                status: None,
                error: message.into(),
            },
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Adds a `status` field next to `error` in the body.
    pub fn with_status_tag(mut self, tag: &'static str) -> Self {
        self.body.status = Some(tag);
        self
    }

    /// The HTTP status this error renders with.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<InstanceError> for ApiError {
    fn from(err: InstanceError) -> Self {
        let status = match &err {
            InstanceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            InstanceError::NotFound(_) | InstanceError::NotConnected(_) => {
                StatusCode::NOT_FOUND
            }
            InstanceError::PairingTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
            InstanceError::StaleSession(_) | InstanceError::Upstream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid(format!("invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use pairforge_session::SessionError;

    use super::*;

    #[test]
    fn test_instance_error_status_codes() {
        let cases = [
            (InstanceError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (InstanceError::NotFound("a".into()), StatusCode::NOT_FOUND),
            (InstanceError::NotConnected("a".into()), StatusCode::NOT_FOUND),
            (
                InstanceError::PairingTimeout {
                    user_id: "a".into(),
                    waited: std::time::Duration::from_secs(30),
                },
                StatusCode::REQUEST_TIMEOUT,
            ),
            (InstanceError::StaleSession("a".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                InstanceError::Upstream(SessionError::NotConnected),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_status_tag_is_serialized_only_when_set() {
        let plain = serde_json::to_value(&ApiError::not_found("gone").body).unwrap();
        assert_eq!(plain, serde_json::json!({ "error": "gone" }));

        let tagged = ApiError::not_found("gone").with_status_tag("not_found");
        let body = serde_json::to_value(&tagged.body).unwrap();
        assert_eq!(body, serde_json::json!({ "status": "not_found", "error": "gone" }));
    }
}
