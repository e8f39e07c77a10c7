//! Unified error type for the Pairforge service.

use pairforge_instance::InstanceError;
use pairforge_session::SessionError;

/// Top-level error that wraps all crate-specific errors.
///
/// The server builder and the binary deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attributes let `?` convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum PairforgeError {
    /// An instance-level error (create, status, send, logout).
    #[error(transparent)]
    Instance(#[from] InstanceError),

    /// A session-level error (store, connect, pairing).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The listening socket couldn't be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// The HTTP server stopped with an IO error.
    #[error("server error: {0}")]
    Serve(std::io::Error),

    /// Startup configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_instance_error() {
        let err = InstanceError::NotFound("alice".into());
        let pf_err: PairforgeError = err.into();
        assert!(matches!(pf_err, PairforgeError::Instance(_)));
        assert!(pf_err.to_string().contains("alice"));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::ConnectFailed("refused".into());
        let pf_err: PairforgeError = err.into();
        assert!(matches!(pf_err, PairforgeError::Session(_)));
    }

    #[test]
    fn test_bind_error_names_address() {
        let err = PairforgeError::Bind {
            addr: "0.0.0.0:3001".into(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().starts_with("failed to bind 0.0.0.0:3001"));
    }
}
