//! Protocol sessions and device storage for Pairforge.
//!
//! This crate is the seam between Pairforge and the messaging backend:
//!
//! 1. **Session handles**: what a live connection can do ([`SessionHandle`])
//!    and how one is built ([`Protocol`])
//! 2. **Pairing events**: the code / success stream a handle emits
//!    ([`PairingEvent`])
//! 3. **Device storage**: the per-session record the protocol writes its
//!    identity into ([`SessionStore`], [`Device`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Instance Layer (above)  ← owns one handle per user, tracks pairing
//!     ↕
//! Session Layer (this crate)  ← handle traits, events, device store
//!     ↕
//! Messaging backend (below)  ← a real client, or the loopback one
//! ```
//!
//! # Feature Flags
//!
//! - `loopback` (default): in-process [`LoopbackProtocol`]

#![allow(async_fn_in_trait)]

mod error;
mod event;
mod handle;
#[cfg(feature = "loopback")]
mod loopback;
mod store;

pub use error::SessionError;
pub use event::{Identity, PairingEvent, PairingEvents};
pub use handle::{Protocol, SessionHandle};
#[cfg(feature = "loopback")]
pub use loopback::{LoopbackConfig, LoopbackProtocol, LoopbackSession, SentMessage};
pub use store::{
    Device, DeviceBackend, DeviceRecord, FileBackend, MemoryBackend,
    SessionStore,
};
