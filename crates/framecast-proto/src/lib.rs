//! Wire schema for the renderer and camera-control protocols.
//!
//! Renderers and the control channel exchange the same binary records:
//! bincode-encoded structs with fixed-size little-endian integers, so both
//! ends agree on the byte layout exactly. The renderer TCP protocol frames
//! each record with an 8-byte little-endian length prefix.

mod error;
mod framing;
mod wire;

pub use error::ProtoError;
pub use framing::{
    decode_message, encode_message, frame_message, payload_length, LENGTH_PREFIX_BYTES,
    MAX_PAYLOAD_BYTES,
};
pub use wire::{Camera, FrameRequest, RenderedFrame};

/// Result type for protocol operations.
pub type ProtoResult<T> = Result<T, ProtoError>;
