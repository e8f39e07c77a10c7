//! Background completion listener: follows one instance's pairing channel.
//!
//! Spawned once the instance is registered. It holds only a weak reference,
//! so a removed instance is never kept alive by its listener; removal
//! disconnects the handle, which closes the channel and ends the task.
//!
//! A pairing window that ends without a scan drops the transport too, so
//! the next `create` for the user provisions a fresh session.

use std::sync::Weak;

use pairforge_session::{PairingEvent, PairingEvents, SessionHandle};
use tokio::task::JoinHandle;

use crate::{Instance, InstanceStatus};

/// Why a listener stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerExit {
    /// A code was scanned; the instance is connected.
    Paired,
    /// The protocol ended the pairing window without a scan.
    Expired,
    /// The pairing handshake failed.
    Failed,
    /// The channel closed (handle disconnected) or the instance is gone.
    Closed,
}

/// Starts the listener task for `instance`.
pub(crate) fn spawn_listener<H: SessionHandle>(
    instance: Weak<Instance<H>>,
    events: PairingEvents,
) -> JoinHandle<ListenerExit> {
    tokio::spawn(run_listener(instance, events))
}

async fn run_listener<H: SessionHandle>(
    instance: Weak<Instance<H>>,
    mut events: PairingEvents,
) -> ListenerExit {
    while let Some(event) = events.recv().await {
        let Some(instance) = instance.upgrade() else {
            return ListenerExit::Closed;
        };
        let user_id = instance.user_id();

        match event {
            PairingEvent::Code(code) => {
                tracing::debug!(%user_id, "pairing code rotated");
                instance.update(|cached| cached.pairing_code = code);
            }
            PairingEvent::Success => {
                let phone = instance
                    .handle()
                    .identity()
                    .map(|identity| identity.user)
                    .unwrap_or_default();
                instance.update(|cached| {
                    cached.pairing_code.clear();
                    cached.status = InstanceStatus::Connected;
                    if !phone.is_empty() {
                        cached.phone = phone.clone();
                    }
                });
                tracing::info!(%user_id, %phone, "pairing succeeded");
                return ListenerExit::Paired;
            }
            PairingEvent::Timeout => {
                instance.update(|cached| {
                    cached.pairing_code.clear();
                    cached.status = InstanceStatus::Disconnected;
                });
                instance.handle().disconnect().await;
                tracing::info!(%user_id, "pairing window expired");
                return ListenerExit::Expired;
            }
            PairingEvent::Error(reason) => {
                instance.update(|cached| {
                    cached.pairing_code.clear();
                    cached.status = InstanceStatus::Disconnected;
                });
                instance.handle().disconnect().await;
                tracing::warn!(%user_id, %reason, "pairing failed");
                return ListenerExit::Failed;
            }
        }
    }

    tracing::debug!("pairing channel closed");
    ListenerExit::Closed
}
