//! The protocol seam: session handles and the protocol that opens them.
//!
//! Pairforge doesn't speak the messaging wire protocol itself. Instead it
//! defines two traits:
//!
//! - [`Protocol`]: builds a [`SessionHandle`] over a fresh [`Device`]
//! - [`SessionHandle`]: one live connection, from connect to teardown
//!
//! A real client library implements these; the bundled
//! [`LoopbackProtocol`](crate::LoopbackProtocol) implements them in
//! process for tests and local runs.
//!
//! # Trait bounds
//!
//! Handles are shared between request handlers and a background listener
//! task, so both traits are `Send + Sync + 'static`, and every async method
//! returns a `Send` future so it can be awaited inside spawned tasks.

use std::future::Future;

use crate::{Device, Identity, PairingEvents, SessionError};

/// One live session against the messaging backend.
///
/// The three flag queries are independent: the transport flag follows raw
/// socket state, `is_authenticated` follows the handshake, and
/// `identity` follows what has been written to the device. They can
/// disagree while a handshake is in flight.
pub trait SessionHandle: Send + Sync + 'static {
    /// Subscribes to the pairing channel.
    ///
    /// Must be called before [`connect`](Self::connect) so the first code
    /// isn't missed. A handle has exactly one pairing channel; a second
    /// call returns [`SessionError::PairingUnavailable`].
    fn pairing_events(&self) -> Result<PairingEvents, SessionError>;

    /// Opens the transport and starts the handshake.
    fn connect(&self) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Closes the transport. Closes the pairing channel as a side effect.
    /// Idempotent.
    fn disconnect(&self) -> impl Future<Output = ()> + Send;

    /// Whether the transport is currently up.
    fn is_connected(&self) -> bool;

    /// Whether the handshake has completed with valid credentials.
    fn is_authenticated(&self) -> bool;

    /// The identity stored on the device, once pairing has written one.
    fn identity(&self) -> Option<Identity>;

    /// Unlinks the device from the account on the backend.
    fn logout(&self) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Deletes the identity from the device store.
    fn delete_identity(
        &self,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Sends a text message to `to`. Returns the protocol's message id.
    ///
    /// Success means the protocol accepted the message, not that it was
    /// delivered.
    fn send_text(
        &self,
        to: &str,
        text: &str,
    ) -> impl Future<Output = Result<String, SessionError>> + Send;
}

/// Builds session handles over devices allocated by the session store.
pub trait Protocol: Send + Sync + 'static {
    /// The handle type this protocol produces.
    type Handle: SessionHandle;

    /// Constructs a new, not-yet-connected handle that owns `device`.
    fn open(&self, device: Device) -> Self::Handle;
}
