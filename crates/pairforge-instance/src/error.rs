//! Error types for the instance layer.

use std::time::Duration;

use pairforge_session::SessionError;

/// Errors returned by [`InstanceManager`](crate::InstanceManager)
/// operations.
///
/// Ghost-session recovery never shows up here; it's handled inside
/// `create` and only visible in the logs.
#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    /// The caller sent something unusable (empty user id, empty message).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No instance is registered for this user.
    #[error("instance {0} not found")]
    NotFound(String),

    /// The instance is missing or its transport is down, so nothing can
    /// be sent through it.
    #[error("instance {0} is not connected")]
    NotConnected(String),

    /// The protocol didn't produce a pairing code in time.
    ///
    /// The half-created session has already been disconnected; the caller
    /// should retry `create`.
    #[error("no pairing code for {user_id} within {waited:?}")]
    PairingTimeout { user_id: String, waited: Duration },

    /// A session recreated after a ghost was cleared still came up
    /// authenticated.
    #[error("stale credentials for {0} survived session recreation")]
    StaleSession(String),

    /// The protocol layer failed (connect, pairing channel, send, store).
    #[error(transparent)]
    Upstream(#[from] SessionError),
}
