//! Error types for the session layer.

/// Errors that can occur while talking to the protocol client or the
/// device store.
///
/// These cover the lifecycle of one protocol session: connecting,
/// pairing, sending, and persisting the device record behind it.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The protocol client could not establish a connection.
    #[error("failed to connect: {0}")]
    ConnectFailed(String),

    /// The operation requires a live transport and there is none.
    #[error("session is not connected")]
    NotConnected,

    /// The protocol client rejected or failed to transmit a message.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The pairing-code channel could not be opened, or was already
    /// taken by an earlier subscriber.
    #[error("pairing channel unavailable: {0}")]
    PairingUnavailable(String),

    /// A pairing code was presented that no live session issued.
    #[error("unknown pairing code")]
    UnknownCode,

    /// Reading or writing a device record failed.
    #[error("device store I/O failed: {0}")]
    Store(#[from] std::io::Error),

    /// A device record on disk could not be decoded.
    #[error("device record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}
