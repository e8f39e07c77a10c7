//! Pairing events and the identity a session ends up with.
//!
//! A freshly opened session has no identity. The protocol client streams
//! [`PairingEvent`]s while the user scans codes; once one of them is
//! accepted the client emits [`PairingEvent::Success`] and writes an
//! [`Identity`] into the session's device record.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One event on a session's pairing channel.
///
/// ```text
///   Code ──(rotate)──→ Code ──(scanned)──→ Success
///     │                  │
///     └──(window over)───┴──→ Timeout / Error
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    /// A new code to show the user. Later codes replace earlier ones.
    Code(String),

    /// A code was scanned and the session is now authenticated.
    Success,

    /// The protocol gave up waiting for a scan.
    Timeout,

    /// The pairing handshake failed.
    Error(String),
}

impl PairingEvent {
    /// Returns `true` for events after which no more codes will arrive.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Code(_))
    }
}

/// Receiving half of a session's pairing channel.
///
/// The channel closes when the session is disconnected or pairing ends.
pub type PairingEvents = mpsc::Receiver<PairingEvent>;

/// The stored identity of an authenticated device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// The account the device is linked to (the phone number).
    pub user: String,

    /// Device slot within the account.
    pub device: u16,
}

impl Identity {
    /// Creates the identity of the primary device of `user`.
    pub fn primary(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            device: 0,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user, self.device)
    }
}
