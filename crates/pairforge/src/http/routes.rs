//! Route handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use pairforge_instance::{CreateOutcome, InstanceError, InstanceStatus};
use pairforge_session::Protocol;
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState};

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub instances: usize,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponse {
    pub instance_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: InstanceStatus,
    pub qr_code: String,
    pub created_at: i64,
    pub phone: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub success: bool,
    pub to: String,
    pub message_id: String,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRow {
    pub user_id: String,
    pub status: InstanceStatus,
    pub phone: String,
    pub created_at: i64,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub instances: Vec<InstanceRow>,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health<P: Protocol>(State(state): State<AppState<P>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        instances: state.manager.count().await,
        timestamp: chrono::Utc::now().timestamp(),
    })
}

/// POST /api/instances/create
pub async fn create_instance<P: Protocol>(
    State(state): State<AppState<P>>,
    payload: Result<Json<CreateRequest>, JsonRejection>,
) -> Result<Json<CreateResponse>, ApiError> {
    let Json(body) = payload?;
    let instance_id = body.user_id.trim().to_string();

    let response = match state.manager.create(&body.user_id).await? {
        CreateOutcome::AlreadyConnected => CreateResponse {
            instance_id,
            qr_code: None,
            status: "already_connected",
        },
        CreateOutcome::Pending { pairing_code } => CreateResponse {
            instance_id,
            qr_code: Some(pairing_code),
            status: InstanceStatus::QrPending.as_str(),
        },
    };
    Ok(Json(response))
}

/// GET /api/instances/{userId}/status
pub async fn instance_status<P: Protocol>(
    State(state): State<AppState<P>>,
    Path(user_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let report = state.manager.status(&user_id).await.map_err(|e| match e {
        InstanceError::NotFound(_) => ApiError::from(e).with_status_tag("not_found"),
        e => ApiError::from(e),
    })?;

    Ok(Json(StatusResponse {
        status: report.status,
        qr_code: report.pairing_code,
        created_at: report.created_at.timestamp(),
        phone: report.phone,
    }))
}

/// POST /api/instances/{userId}/send
pub async fn send_message<P: Protocol>(
    State(state): State<AppState<P>>,
    Path(user_id): Path<String>,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, ApiError> {
    let Json(body) = payload?;
    let message_id = state.manager.send(&user_id, &body.to, &body.message).await?;

    Ok(Json(SendResponse {
        success: true,
        to: body.to.trim().to_string(),
        message_id,
    }))
}

/// POST /api/instances/{userId}/logout
pub async fn logout_instance<P: Protocol>(
    State(state): State<AppState<P>>,
    Path(user_id): Path<String>,
) -> Result<Json<LogoutResponse>, ApiError> {
    state.manager.logout(&user_id).await?;
    Ok(Json(LogoutResponse { status: "logged_out" }))
}

/// POST /api/instances/{userId}/disconnect
pub async fn disconnect_instance<P: Protocol>(
    State(state): State<AppState<P>>,
    Path(user_id): Path<String>,
) -> Result<Json<DisconnectResponse>, ApiError> {
    state.manager.logout(&user_id).await?;
    Ok(Json(DisconnectResponse { success: true }))
}

/// GET /api/instances
pub async fn list_instances<P: Protocol>(
    State(state): State<AppState<P>>,
) -> Json<ListResponse> {
    let instances: Vec<InstanceRow> = state
        .manager
        .list()
        .await
        .into_iter()
        .map(|summary| InstanceRow {
            user_id: summary.user_id,
            status: summary.status,
            phone: summary.phone,
            created_at: summary.created_at.timestamp(),
        })
        .collect();

    Json(ListResponse {
        total: instances.len(),
        instances,
    })
}
