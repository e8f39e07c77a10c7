//! # pairforge-instance
//!
//! Per-user instance lifecycle for Pairforge.
//!
//! An *instance* is one user's messaging session plus the bookkeeping the
//! service needs to report on it: when it was created, the pairing code
//! currently on offer, and which account it ended up linked to.
//!
//! ## How it fits in the stack
//!
//! ```text
//! HTTP routes (pairforge)
//!     ↓ create / status / send / logout / list
//! [pairforge-instance] ← you are here
//!     ↓ open, connect, pairing events, send_text
//! Protocol + SessionStore (pairforge-session)
//! ```
//!
//! ## Key types
//!
//! - [`InstanceManager`]: the public entry point; owns the registry
//! - [`InstanceRegistry`]: user id → [`Instance`] under one async lock
//! - [`Instance`]: a session handle plus its cached state
//! - [`resolve_status`]: turns live handle signals into [`InstanceStatus`]
//! - [`Provisioning`]: the phases `create` moves through, ghost recovery
//!   included

mod config;
mod error;
mod instance;
mod listener;
mod manager;
mod provision;
mod registry;
mod status;

pub use config::InstanceConfig;
pub use error::InstanceError;
pub use instance::{
    CachedState, CreateOutcome, Instance, InstanceReport, InstanceStatus,
    InstanceSummary,
};
pub use listener::ListenerExit;
pub use manager::InstanceManager;
pub use provision::Provisioning;
pub use registry::InstanceRegistry;
pub use status::{StatusSignals, resolve_status};
