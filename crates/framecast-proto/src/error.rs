//! Error types for the wire protocol.

use thiserror::Error;

/// Errors raised while encoding or decoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Serialisation of an outgoing message failed.
    #[error("Failed to encode message: {0}")]
    Encode(#[source] bincode::Error),

    /// An inbound payload did not match the schema.
    #[error("Failed to decode message: {0}")]
    Decode(#[source] bincode::Error),

    /// A length prefix promised more data than a peer may send.
    #[error("Payload length {0} exceeds the protocol limit")]
    OversizedPayload(u64),
}
