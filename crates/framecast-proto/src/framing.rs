//! Binary encoding and length-prefix framing.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{ProtoError, ProtoResult};

/// Size of the length prefix on the renderer socket.
pub const LENGTH_PREFIX_BYTES: usize = 8;

/// Upper bound accepted for a single framed payload. A 4K RGB frame plus
/// depth stays well under this; anything larger means the framing is
/// corrupt.
pub const MAX_PAYLOAD_BYTES: u64 = 64 * 1024 * 1024;

/// Serialise a message with fixed-size little-endian integers.
pub fn encode_message<T: Serialize>(message: &T) -> ProtoResult<Vec<u8>> {
    bincode::serialize(message).map_err(ProtoError::Encode)
}

/// Deserialise a message produced by [`encode_message`].
pub fn decode_message<T: DeserializeOwned>(payload: &[u8]) -> ProtoResult<T> {
    bincode::deserialize(payload).map_err(ProtoError::Decode)
}

/// Serialise a message and prepend its 8-byte little-endian length, ready
/// to write to the renderer socket.
pub fn frame_message<T: Serialize>(message: &T) -> ProtoResult<Vec<u8>> {
    let payload = encode_message(message)?;
    let mut framed = Vec::with_capacity(LENGTH_PREFIX_BYTES + payload.len());
    framed.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    framed.extend_from_slice(&payload);
    Ok(framed)
}

/// Parse a length prefix, rejecting lengths no honest peer would send.
pub fn payload_length(header: [u8; LENGTH_PREFIX_BYTES]) -> ProtoResult<usize> {
    let length = u64::from_le_bytes(header);
    if length > MAX_PAYLOAD_BYTES {
        return Err(ProtoError::OversizedPayload(length));
    }
    Ok(length as usize)
}
