//! Long-lived pipeline workers connecting the dispatcher to the viewers.
//!
//! Three workers run for the life of the process: convert (overlay and
//! colour-space conversion), feed (strict-order encoder input) and drain
//! (packet fan-out). Each loops until the process-wide shutdown flag
//! flips, re-checking it after every bounded wait.

mod stages;
mod stats;

pub use stages::{convert_worker, drain_worker, feed_worker, PipelineContext};
pub use stats::{stats_worker, PipelineStats};
