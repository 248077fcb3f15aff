//! Error types for the network module.

use thiserror::Error;

use framecast_proto::ProtoError;

/// Errors raised by the dispatcher and the WebSocket servers.
#[derive(Debug, Error)]
pub enum NetError {
    /// A listener could not be bound at startup. Fatal to the process.
    #[error("Failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// Socket-level failure; on a renderer connection the supervisor
    /// reconnects.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The renderer closed the socket mid-message.
    #[error("Renderer closed the connection mid-message")]
    ConnectionClosed,

    /// A message failed to encode or decode.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtoError),

    /// A `--renderer` value that is not a resolvable `host:port`.
    #[error("Invalid renderer endpoint '{0}'")]
    InvalidEndpoint(String),

    /// Shutdown was requested while blocked on socket I/O.
    #[error("Shutdown requested")]
    ShuttingDown,

    /// `start` was called on a server that is already running.
    #[error("{0} is already running")]
    AlreadyRunning(&'static str),
}
