//! The provisioning state machine `create` walks through.
//!
//! ```text
//! Connecting ──────────────────────────→ AwaitingCode ──→ QrPending
//!     │                                      ↑
//!     └──(authenticated)──→ Ghost ──→ Recreating
//! ```
//!
//! A session that reports authenticated right after connecting is a ghost:
//! stale credentials from an interrupted run. It would never issue a fresh
//! code, so it's cleared and replaced before waiting for one. Every
//! transition is logged so ghost recoveries show up in operations.

use std::fmt;

/// One phase of provisioning a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioning {
    /// Device allocated, handle opened, transport coming up.
    Connecting,
    /// The handle came up authenticated without pairing.
    Ghost,
    /// The ghost was cleared; a fresh device and handle are connecting.
    Recreating,
    /// Waiting for the first pairing code.
    AwaitingCode,
    /// Code received; the instance is registered.
    QrPending,
}

impl Provisioning {
    /// Returns `true` if `next` may directly follow `self`.
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Ghost)
                | (Self::Connecting, Self::AwaitingCode)
                | (Self::Ghost, Self::Recreating)
                | (Self::Recreating, Self::AwaitingCode)
                | (Self::AwaitingCode, Self::QrPending)
        )
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Ghost => "ghost",
            Self::Recreating => "recreating",
            Self::AwaitingCode => "awaiting_code",
            Self::QrPending => "qr_pending",
        }
    }
}

impl fmt::Display for Provisioning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks and logs one `create` call's progress.
pub(crate) struct Provisioner<'a> {
    user_id: &'a str,
    phase: Provisioning,
}

impl<'a> Provisioner<'a> {
    pub(crate) fn start(user_id: &'a str) -> Self {
        tracing::debug!(%user_id, phase = %Provisioning::Connecting, "provisioning started");
        Self {
            user_id,
            phase: Provisioning::Connecting,
        }
    }

    pub(crate) fn phase(&self) -> Provisioning {
        self.phase
    }

    /// Moves to `next`, logging the transition.
    pub(crate) fn advance(&mut self, next: Provisioning) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "invalid provisioning transition {} -> {}",
            self.phase,
            next
        );
        match next {
            Provisioning::Ghost => tracing::warn!(
                user_id = %self.user_id, from = %self.phase, to = %next,
                "ghost session detected, force clearing"
            ),
            _ => tracing::info!(
                user_id = %self.user_id, from = %self.phase, to = %next,
                "provisioning transition"
            ),
        }
        self.phase = next;
    }
}
