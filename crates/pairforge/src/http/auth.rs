//! Bearer-token check for the instance API.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use super::ApiError;

/// Rejects requests whose `Authorization` header isn't `Bearer <api key>`.
pub(crate) async fn require_bearer(
    State(api_key): State<Arc<str>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == &*api_key);

    if !authorized {
        tracing::debug!(path = %request.uri().path(), "rejected unauthenticated request");
        return Err(ApiError::unauthorized());
    }
    Ok(next.run(request).await)
}
