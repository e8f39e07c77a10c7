//! Status resolution: four independent signals in, one status out.
//!
//! The transport flag follows raw socket state, so on its own it says
//! nothing about whether pairing finished. Reported status is derived from
//! all four signals in priority order:
//!
//! | pending code | transport | authenticated | identity | status         |
//! |--------------|-----------|---------------|----------|----------------|
//! | yes          | any       | any           | any      | `qr_pending`   |
//! | no           | yes       | yes           | yes      | `connected`    |
//! | no           | otherwise |               |          | `disconnected` |

use pairforge_session::SessionHandle;

use crate::{Instance, InstanceStatus};

/// The raw inputs to [`resolve_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusSignals {
    /// The instance still has a pairing code cached.
    pub has_pending_code: bool,
    /// The handle's transport is up.
    pub transport_connected: bool,
    /// The handle's handshake completed.
    pub authenticated: bool,
    /// An identity is stored on the handle's device.
    pub has_identity: bool,
}

impl StatusSignals {
    /// Samples all four signals from `instance`.
    ///
    /// The cached code is read first, then the live flags.
    pub fn observe<H: SessionHandle>(instance: &Instance<H>) -> Self {
        let has_pending_code = !instance.pairing_code().is_empty();
        let handle = instance.handle();
        Self {
            has_pending_code,
            transport_connected: handle.is_connected(),
            authenticated: handle.is_authenticated(),
            has_identity: handle.identity().is_some(),
        }
    }
}

/// Maps signals to the externally reported status.
///
/// A cached code always wins: the UI must keep showing it even if the
/// transport reconnected underneath.
pub fn resolve_status(signals: StatusSignals) -> InstanceStatus {
    if signals.has_pending_code {
        InstanceStatus::QrPending
    } else if signals.transport_connected
        && signals.authenticated
        && signals.has_identity
    {
        InstanceStatus::Connected
    } else {
        InstanceStatus::Disconnected
    }
}
