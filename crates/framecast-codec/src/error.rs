//! Error types for the codec module.

use thiserror::Error;

/// Errors raised while opening or driving the encoder. All of these are
/// fatal to the pipeline; transient encoder states are expressed through
/// `FeedResult` and `DrainResult` instead.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Encoder construction failed.
    #[error("Encoder initialization failed: {0}")]
    Initialization(String),

    /// The encoder rejected a frame or broke mid-stream.
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// The preset string names no known encoder preset.
    #[error("Unknown encoder preset: {0}")]
    UnknownPreset(String),

    /// The tune string contains an unknown tuning name.
    #[error("Unknown encoder tune: {0}")]
    UnknownTune(String),
}
