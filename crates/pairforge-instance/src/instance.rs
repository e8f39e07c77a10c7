//! Instance types: one user's session handle plus its bookkeeping.
//!
//! An [`Instance`] has two kinds of data:
//! - fixed at creation: `user_id`, the session handle, `created_at`
//! - updated by the background listener: cached status, pairing code,
//!   phone ([`CachedState`])
//!
//! The updated fields live behind one lock, so a reader always sees a
//! whole transition or none of it.

use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

// ---------------------------------------------------------------------------
// InstanceStatus
// ---------------------------------------------------------------------------

/// Externally reported state of an instance.
///
/// ```text
///   QrPending ──(scanned)──→ Connected
///       │                        │
///       └──(expired)──→ Disconnected ←──(transport lost)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// A pairing code is waiting to be scanned.
    QrPending,
    /// Transport up, handshake done, identity stored.
    Connected,
    /// Anything else.
    Disconnected,
}

impl InstanceStatus {
    /// The wire name (`qr_pending`, `connected`, `disconnected`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QrPending => "qr_pending",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CachedState
// ---------------------------------------------------------------------------

/// The listener-maintained fields of an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedState {
    /// Last status the listener recorded. Advisory: reported status is
    /// always recomputed from live signals.
    pub status: InstanceStatus,

    /// Current pairing code; empty once pairing succeeded or expired.
    pub pairing_code: String,

    /// The linked account, filled in after pairing.
    pub phone: String,
}

// ---------------------------------------------------------------------------
// Instance
// ---------------------------------------------------------------------------

/// One user's registered session.
///
/// The instance exclusively owns its handle. It is shared as
/// `Arc<Instance<H>>` between the registry, in-flight requests, and the
/// listener, but only the registry decides when it's torn down.
pub struct Instance<H> {
    user_id: String,
    handle: H,
    created_at: DateTime<Utc>,
    cached: RwLock<CachedState>,
}

impl<H> Instance<H> {
    /// Creates an instance that is waiting for `pairing_code` to be
    /// scanned.
    pub(crate) fn pending(
        user_id: impl Into<String>,
        handle: H,
        pairing_code: String,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            handle,
            created_at: Utc::now(),
            cached: RwLock::new(CachedState {
                status: InstanceStatus::QrPending,
                pairing_code,
                phone: String::new(),
            }),
        }
    }

    /// The user this instance belongs to.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The protocol session handle.
    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// When the instance was created. Never changes.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// A consistent copy of the listener-maintained fields.
    pub fn cached(&self) -> CachedState {
        self.cached.read().clone()
    }

    /// The current pairing code (empty if none).
    pub fn pairing_code(&self) -> String {
        self.cached.read().pairing_code.clone()
    }

    /// Applies `update` to the cached fields in one critical section.
    ///
    /// `update` must not block; the lock is a plain (non-async) lock.
    pub(crate) fn update<R>(&self, update: impl FnOnce(&mut CachedState) -> R) -> R {
        update(&mut self.cached.write())
    }
}

impl<H> fmt::Debug for Instance<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("user_id", &self.user_id)
            .field("created_at", &self.created_at)
            .field("cached", &self.cached())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What `status` reports for one instance at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceReport {
    pub status: InstanceStatus,
    pub pairing_code: String,
    pub created_at: DateTime<Utc>,
    pub phone: String,
}

/// One row of the instance listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSummary {
    pub user_id: String,
    pub status: InstanceStatus,
    pub phone: String,
    pub created_at: DateTime<Utc>,
}

/// Result of [`InstanceManager::create`](crate::InstanceManager::create).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The existing instance's transport is up; nothing was changed.
    AlreadyConnected,

    /// A new session is waiting for this code to be scanned.
    Pending { pairing_code: String },
}
