//! The instance manager: creates, reports on, and tears down instances.
//!
//! This is the central piece of the instance layer. It's responsible for:
//! - Provisioning a session for a user and waiting for its first code
//! - Detecting ghost sessions and replacing them before they're registered
//! - Starting the background listener that follows pairing to completion
//! - Reconciling live handle flags into one reported status
//! - Removing instances and disconnecting their handles
//!
//! # Locking discipline
//!
//! The registry lock is only ever held inside [`InstanceRegistry`] calls.
//! Anything that talks to the protocol (connect, disconnect, send) happens
//! after the registry call has returned.

use std::sync::Arc;

use pairforge_session::{
    PairingEvent, PairingEvents, Protocol, SessionError, SessionHandle,
    SessionStore,
};

use crate::listener::spawn_listener;
use crate::provision::{Provisioner, Provisioning};
use crate::{
    CreateOutcome, Instance, InstanceConfig, InstanceError, InstanceRegistry,
    InstanceReport, InstanceStatus, InstanceSummary, StatusSignals,
    resolve_status,
};

/// Manages every user's messaging session.
///
/// ## Lifecycle
///
/// ```text
/// create() ──→ [qr_pending] ──(listener: Success)──→ [connected]
///    │              │                                     │
///    │              └──(listener: Timeout/Error)──→ [disconnected]
///    │                                                    │
///    └── logout() at any point: unregister + disconnect ──┘
/// ```
pub struct InstanceManager<P: Protocol> {
    registry: InstanceRegistry<P::Handle>,
    store: SessionStore,
    protocol: P,
    config: InstanceConfig,
}

impl<P: Protocol> InstanceManager<P> {
    /// Creates a manager with an empty registry.
    pub fn new(store: SessionStore, protocol: P, config: InstanceConfig) -> Self {
        Self {
            registry: InstanceRegistry::new(),
            store,
            protocol,
            config,
        }
    }

    /// The registry this manager owns.
    pub fn registry(&self) -> &InstanceRegistry<P::Handle> {
        &self.registry
    }

    /// The protocol sessions are opened with.
    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    /// Number of registered instances.
    pub async fn count(&self) -> usize {
        self.registry.len().await
    }

    /// Creates (or replaces) the instance for `user_id` and returns its
    /// first pairing code.
    ///
    /// If the existing instance's transport is up this is a no-op that
    /// returns [`CreateOutcome::AlreadyConnected`].
    ///
    /// # Errors
    /// - [`InstanceError::InvalidRequest`]: blank user id
    /// - [`InstanceError::PairingTimeout`]: no code within the timeout
    /// - [`InstanceError::StaleSession`]: ghost survived recreation
    /// - [`InstanceError::Upstream`]: connect or pairing channel failed
    ///
    /// On every error path the new handle is disconnected and nothing is
    /// registered.
    pub async fn create(&self, user_id: &str) -> Result<CreateOutcome, InstanceError> {
        let user_id = validate_user_id(user_id)?;

        if let Some(existing) = self.registry.get(user_id).await {
            if existing.handle().is_connected() {
                tracing::info!(%user_id, "instance already connected");
                return Ok(CreateOutcome::AlreadyConnected);
            }
            if self.registry.remove_exact(user_id, &existing).await {
                existing.handle().disconnect().await;
                tracing::info!(%user_id, "replacing disconnected instance");
            }
        }

        let mut provisioner = Provisioner::start(user_id);
        let (mut handle, mut events) = self.open_session().await?;

        if handle.is_authenticated() {
            provisioner.advance(Provisioning::Ghost);
            clear_ghost(user_id, &handle).await;
            drop(events);

            provisioner.advance(Provisioning::Recreating);
            (handle, events) = self.open_session().await?;
            if handle.is_authenticated() {
                tracing::error!(
                    %user_id, phase = %provisioner.phase(),
                    "recreated session is still authenticated"
                );
                clear_ghost(user_id, &handle).await;
                return Err(InstanceError::StaleSession(user_id.to_string()));
            }
        }

        provisioner.advance(Provisioning::AwaitingCode);
        let pairing_code = match self.await_first_code(user_id, &mut events).await {
            Ok(code) => code,
            Err(e) => {
                handle.disconnect().await;
                tracing::warn!(%user_id, error = %e, "no pairing code, session discarded");
                return Err(e);
            }
        };

        provisioner.advance(Provisioning::QrPending);
        let instance = Arc::new(Instance::pending(user_id, handle, pairing_code.clone()));
        if let Some(displaced) = self.registry.upsert(user_id, Arc::clone(&instance)).await {
            // A concurrent create registered first; its handle goes with it.
            displaced.handle().disconnect().await;
            tracing::info!(%user_id, "displaced concurrently created instance");
        }
        spawn_listener(Arc::downgrade(&instance), events);

        tracing::info!(%user_id, "instance created, waiting for scan");
        Ok(CreateOutcome::Pending { pairing_code })
    }

    /// Reports the current status of `user_id`'s instance.
    ///
    /// User ids are trimmed here and in every other lookup, matching
    /// [`create`](Self::create).
    ///
    /// # Errors
    /// Returns [`InstanceError::NotFound`] if no instance is registered.
    pub async fn status(&self, user_id: &str) -> Result<InstanceReport, InstanceError> {
        let user_id = user_id.trim();
        let instance = self
            .registry
            .get(user_id)
            .await
            .ok_or_else(|| InstanceError::NotFound(user_id.to_string()))?;
        Ok(report(&instance))
    }

    /// Lists every registered instance with its resolved status.
    pub async fn list(&self) -> Vec<InstanceSummary> {
        self.registry
            .snapshot()
            .await
            .iter()
            .map(|instance| {
                let report = report(instance);
                InstanceSummary {
                    user_id: instance.user_id().to_string(),
                    status: report.status,
                    phone: report.phone,
                    created_at: report.created_at,
                }
            })
            .collect()
    }

    /// Unregisters `user_id`'s instance and disconnects its handle.
    ///
    /// # Errors
    /// Returns [`InstanceError::NotFound`] if no instance is registered;
    /// nothing else happens in that case.
    pub async fn logout(&self, user_id: &str) -> Result<(), InstanceError> {
        let user_id = user_id.trim();
        let instance = self
            .registry
            .remove(user_id)
            .await
            .ok_or_else(|| InstanceError::NotFound(user_id.to_string()))?;
        instance.handle().disconnect().await;
        tracing::info!(%user_id, "instance logged out and removed");
        Ok(())
    }

    /// Sends `message` to `to` through `user_id`'s session.
    ///
    /// The connected check is a point-in-time check; delivery is up to the
    /// protocol. Returns the protocol's message id.
    ///
    /// # Errors
    /// - [`InstanceError::InvalidRequest`]: blank destination or message
    /// - [`InstanceError::NotConnected`]: no instance, or transport down
    /// - [`InstanceError::Upstream`]: the protocol rejected the send
    pub async fn send(
        &self,
        user_id: &str,
        to: &str,
        message: &str,
    ) -> Result<String, InstanceError> {
        let user_id = user_id.trim();
        let to = to.trim();
        if to.is_empty() {
            return Err(InstanceError::InvalidRequest("destination is required".into()));
        }
        if message.is_empty() {
            return Err(InstanceError::InvalidRequest("message is required".into()));
        }

        let instance = self
            .registry
            .get(user_id)
            .await
            .ok_or_else(|| InstanceError::NotConnected(user_id.to_string()))?;
        if !instance.handle().is_connected() {
            return Err(InstanceError::NotConnected(user_id.to_string()));
        }

        let message_id = instance.handle().send_text(to, message).await?;
        tracing::info!(%user_id, %to, %message_id, "message sent");
        Ok(message_id)
    }

    /// Allocates a device, opens a handle on it, subscribes, and connects.
    async fn open_session(&self) -> Result<(P::Handle, PairingEvents), InstanceError> {
        let device = self.store.new_device().await?;
        let handle = self.protocol.open(device);
        let events = handle.pairing_events()?;
        if let Err(e) = handle.connect().await {
            tracing::error!(error = %e, "connect failed");
            handle.disconnect().await;
            return Err(e.into());
        }
        Ok((handle, events))
    }

    /// Waits for the first pairing code, bounded by the pairing timeout.
    async fn await_first_code(
        &self,
        user_id: &str,
        events: &mut PairingEvents,
    ) -> Result<String, InstanceError> {
        let waited = self.config.pairing_timeout;
        let timed_out = || InstanceError::PairingTimeout {
            user_id: user_id.to_string(),
            waited,
        };

        match tokio::time::timeout(waited, events.recv()).await {
            Ok(Some(PairingEvent::Code(code))) => Ok(code),
            Ok(Some(PairingEvent::Timeout)) => Err(timed_out()),
            Ok(Some(PairingEvent::Error(reason))) => {
                Err(SessionError::PairingUnavailable(reason).into())
            }
            Ok(Some(PairingEvent::Success)) => Err(SessionError::PairingUnavailable(
                "paired before a code was issued".into(),
            )
            .into()),
            Ok(None) => {
                Err(SessionError::PairingUnavailable("pairing channel closed".into()).into())
            }
            Err(_) => Err(timed_out()),
        }
    }
}

/// Logs out, deletes the stored identity, and disconnects. Failures are
/// logged; clearing continues regardless.
async fn clear_ghost<H: SessionHandle>(user_id: &str, handle: &H) {
    if let Err(e) = handle.logout().await {
        tracing::warn!(%user_id, error = %e, "ghost logout failed");
    }
    if let Err(e) = handle.delete_identity().await {
        tracing::warn!(%user_id, error = %e, "ghost identity delete failed");
    }
    handle.disconnect().await;
}

/// Samples `instance` and resolves its reported status.
///
/// The cached code is read again after the live queries: if the live flags
/// say connected but a code is still cached, the listener hasn't caught up
/// and `qr_pending` wins.
fn report<H: SessionHandle>(instance: &Instance<H>) -> InstanceReport {
    let cached = instance.cached();
    let signals = StatusSignals::observe(instance);
    let mut status = resolve_status(signals);
    let latest_code = instance.pairing_code();

    if status == InstanceStatus::Connected && !latest_code.is_empty() {
        tracing::warn!(
            user_id = %instance.user_id(),
            "live signals say connected while a pairing code is cached, forcing qr_pending"
        );
        status = InstanceStatus::QrPending;
    }
    tracing::debug!(
        user_id = %instance.user_id(),
        ?signals, %status, cached_status = %cached.status,
        "status resolved"
    );

    let pairing_code = match status {
        InstanceStatus::QrPending if !latest_code.is_empty() => latest_code,
        InstanceStatus::QrPending => cached.pairing_code,
        _ => String::new(),
    };
    InstanceReport {
        status,
        pairing_code,
        created_at: instance.created_at(),
        phone: cached.phone,
    }
}

fn validate_user_id(user_id: &str) -> Result<&str, InstanceError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(InstanceError::InvalidRequest("userId is required".into()));
    }
    Ok(user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_user_id_trims() {
        assert_eq!(validate_user_id("  alice ").unwrap(), "alice");
    }

    #[test]
    fn test_validate_user_id_rejects_blank() {
        assert!(matches!(
            validate_user_id("   "),
            Err(InstanceError::InvalidRequest(_))
        ));
    }
}
