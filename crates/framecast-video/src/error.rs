//! Error types for the frame pipeline.

use thiserror::Error;

/// Errors raised by the staging structures and frame operations.
#[derive(Debug, Error)]
pub enum VideoError {
    /// The queue stayed full (push) or empty (pop) for the whole timeout.
    /// Recoverable; callers loop and re-check the shutdown flag.
    #[error("Timed out waiting on the frame queue")]
    QueueTimeout,

    /// The reorder map stayed full (insert) or never produced the requested
    /// index (take). Recoverable; the feeder skips to the next index.
    #[error("Timed out waiting on the reorder map")]
    MapTimeout,

    /// A renderer reply whose pixel buffer does not match its dimensions.
    #[error("Frame buffer holds {actual} bytes, dimensions require {expected}")]
    InvalidFrame { expected: usize, actual: usize },

    /// The overlay font file could not be read.
    #[error("Failed to read overlay font: {0}")]
    FontIo(#[from] std::io::Error),

    /// The overlay font file is not a usable TrueType font.
    #[error("Failed to parse overlay font: {0}")]
    FontParse(String),
}
