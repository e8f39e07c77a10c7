//! `PairforgeServer` builder and server loop.
//!
//! This is the entry point for running the service. It ties together all
//! the layers: HTTP → instance manager → protocol + session store.

use std::sync::Arc;

use axum::Router;
use pairforge_instance::{InstanceConfig, InstanceManager};
use pairforge_session::{Protocol, SessionStore};
use tokio::net::TcpListener;

use crate::PairforgeError;
use crate::http::{self, AppState};

/// Builder for configuring and starting a Pairforge server.
///
/// # Example
///
/// ```rust,ignore
/// use pairforge::prelude::*;
///
/// let server = PairforgeServerBuilder::new()
///     .bind("0.0.0.0:3001")
///     .api_key("secret")
///     .build(LoopbackProtocol::new())
///     .await?;
/// server.run().await
/// ```
pub struct PairforgeServerBuilder {
    bind_addr: String,
    api_key: String,
    store: Option<SessionStore>,
    instance_config: InstanceConfig,
}

impl PairforgeServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:3001".to_string(),
            api_key: String::new(),
            store: None,
            instance_config: InstanceConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the bearer token the instance API requires.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    /// Sets the device store. Defaults to an in-memory store.
    pub fn store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the instance manager configuration.
    pub fn instance_config(mut self, config: InstanceConfig) -> Self {
        self.instance_config = config;
        self
    }

    /// Builds the shared state without binding a socket.
    pub fn state<P: Protocol>(self, protocol: P) -> Result<AppState<P>, PairforgeError> {
        if self.api_key.trim().is_empty() {
            return Err(PairforgeError::Config("api key must not be empty".into()));
        }
        let store = self.store.unwrap_or_else(SessionStore::in_memory);
        let manager = InstanceManager::new(store, protocol, self.instance_config);
        Ok(AppState::new(Arc::new(manager), self.api_key))
    }

    /// Builds the router without binding a socket.
    pub fn router<P: Protocol>(self, protocol: P) -> Result<Router, PairforgeError> {
        Ok(http::router(self.state(protocol)?))
    }

    /// Binds the listener and builds the server around `protocol`.
    pub async fn build<P: Protocol>(
        self,
        protocol: P,
    ) -> Result<PairforgeServer<P>, PairforgeError> {
        let addr = self.bind_addr.clone();
        let state = self.state(protocol)?;
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| PairforgeError::Bind { addr, source })?;

        Ok(PairforgeServer { listener, state })
    }
}

impl Default for PairforgeServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Pairforge server.
///
/// Call [`run()`](Self::run) to start serving requests.
pub struct PairforgeServer<P: Protocol> {
    listener: TcpListener,
    state: AppState<P>,
}

impl<P: Protocol> PairforgeServer<P> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// The instance manager the routes drive.
    pub fn manager(&self) -> &Arc<InstanceManager<P>> {
        &self.state.manager
    }

    /// Serves HTTP until the process is terminated.
    pub async fn run(self) -> Result<(), PairforgeError> {
        let addr = self.listener.local_addr().map_err(PairforgeError::Serve)?;
        tracing::info!(%addr, "Pairforge server running");

        axum::serve(self.listener, http::router(self.state))
            .await
            .map_err(PairforgeError::Serve)
    }
}
