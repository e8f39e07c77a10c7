//! HTTP surface: routes, bearer auth, JSON errors.
//!
//! ```text
//! GET  /health                        (open)
//! POST /api/instances/create          ┐
//! GET  /api/instances/:userId/status  │
//! POST /api/instances/:userId/send    │ Bearer <api key>
//! POST /api/instances/:userId/logout  │
//! POST /api/instances/:userId/disconnect
//! GET  /api/instances                 ┘
//! ```

mod auth;
mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use pairforge_instance::InstanceManager;
use pairforge_session::Protocol;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// State shared by every handler.
pub struct AppState<P: Protocol> {
    pub manager: Arc<InstanceManager<P>>,
    pub api_key: Arc<str>,
}

impl<P: Protocol> AppState<P> {
    pub fn new(manager: Arc<InstanceManager<P>>, api_key: impl Into<Arc<str>>) -> Self {
        Self {
            manager,
            api_key: api_key.into(),
        }
    }
}

// Manual impl: `P` itself doesn't need to be `Clone`.
impl<P: Protocol> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            api_key: Arc::clone(&self.api_key),
        }
    }
}

/// Builds the full router: instance API behind bearer auth, `/health`
/// open, permissive CORS and request tracing on everything.
pub fn router<P: Protocol>(state: AppState<P>) -> Router {
    let api = Router::new()
        .route("/api/instances", get(routes::list_instances::<P>))
        .route("/api/instances/create", post(routes::create_instance::<P>))
        .route("/api/instances/:user_id/status", get(routes::instance_status::<P>))
        .route("/api/instances/:user_id/send", post(routes::send_message::<P>))
        .route("/api/instances/:user_id/logout", post(routes::logout_instance::<P>))
        .route(
            "/api/instances/:user_id/disconnect",
            post(routes::disconnect_instance::<P>),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.api_key),
            auth::require_bearer,
        ));

    Router::new()
        .route("/health", get(routes::health::<P>))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
