//! Frame value types and the staging structures of the encode pipeline.
//!
//! The pipeline moves uniquely owned frames through two bounded stages: a
//! FIFO queue between the renderer dispatcher and the convert worker, and
//! an index-keyed reorder map between the convert worker and the encoder
//! feeder. Both block for a bounded time so worker loops can observe the
//! process-wide shutdown flag between attempts.

mod convert;
mod error;
mod frame;
mod overlay;
mod queue;
mod reorder;

pub use convert::{convert_to_i420, STRIDE_ALIGN_BYTES};
pub use error::VideoError;
pub use frame::{ConvertedFrame, PixelFormat, RawFrame};
pub use overlay::{OverlayPosition, OverlayRenderer};
pub use queue::FrameQueue;
pub use reorder::ReorderMap;

use std::time::Duration;

/// Capacity of the raw-frame queue and the reorder map.
pub const FRAME_STAGE_CAPACITY: usize = 100;

/// How long queue and map operations wait before reporting a timeout.
/// Bounds how long a worker can go without re-checking the shutdown flag,
/// and how long the feeder waits for a late frame before skipping it.
pub const STAGE_TIMEOUT: Duration = Duration::from_secs(1);

/// Successful in-order takes between two straggler sweeps of the reorder
/// map.
pub const DROP_STRAGGLERS_INTERVAL: u64 = 1000;

/// Result type for pipeline staging operations.
pub type VideoResult<T> = Result<T, VideoError>;
