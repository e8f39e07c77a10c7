//! # Pairforge
//!
//! HTTP service that manages one messaging session per user.
//!
//! A client creates an *instance* for a user, gets back a pairing code to
//! render as a QR, polls status until the phone has scanned it, and then
//! sends messages through the linked session.
//!
//! ## How it fits in the stack
//!
//! ```text
//! HTTP (axum, bearer auth, JSON errors)
//!     ↓
//! [pairforge] ← you are here: server builder, config, binary
//!     ↓
//! InstanceManager (pairforge-instance)
//!     ↓
//! Protocol + SessionStore (pairforge-session)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pairforge::prelude::*;
//!
//! # async fn run() -> Result<(), PairforgeError> {
//! let server = PairforgeServerBuilder::new()
//!     .bind("0.0.0.0:3001")
//!     .api_key("secret")
//!     .build(LoopbackProtocol::new())
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
pub mod http;
mod server;

pub use config::{Config, StoreLocation};
pub use error::PairforgeError;
pub use server::{PairforgeServer, PairforgeServerBuilder};

/// Everything needed to embed the server.
pub mod prelude {
    pub use crate::{PairforgeError, PairforgeServer, PairforgeServerBuilder};
    pub use pairforge_instance::{
        CreateOutcome, InstanceConfig, InstanceError, InstanceManager, InstanceStatus,
    };
    pub use pairforge_session::{
        LoopbackConfig, LoopbackProtocol, Protocol, SessionError, SessionHandle,
        SessionStore,
    };
}
