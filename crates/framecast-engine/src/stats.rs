//! Pipeline throughput counters and the periodic reporter.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::info;

/// Seconds between two throughput reports.
const STATS_LOG_INTERVAL_SECS: u64 = 10;

/// Counters shared across the pipeline workers.
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

impl PipelineStats {
    /// A raw frame entered the pipeline.
    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// A frame was dropped (staging timeout or skipped index).
    pub fn record_drop(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// A packet left through the fan-out server.
    pub fn record_packet(&self, bytes: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

/// Logs the outgoing request rate and the drop/packet counters every
/// [`STATS_LOG_INTERVAL_SECS`] seconds until shutdown.
pub fn stats_worker(
    frame_index: Arc<AtomicU64>,
    stats: Arc<PipelineStats>,
    shutdown: Arc<AtomicBool>,
) {
    let mut previous_index = 0u64;
    let mut seconds = 0u64;
    while !shutdown.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_secs(1));
        seconds += 1;
        if seconds < STATS_LOG_INTERVAL_SECS {
            continue;
        }
        let current_index = frame_index.load(Ordering::Relaxed);
        info!(
            fps = (current_index - previous_index) / seconds,
            dropped = stats.frames_dropped(),
            packets = stats.packets_sent(),
            "Average request rate over the last 10 seconds"
        );
        previous_index = current_index;
        seconds = 0;
    }
    info!("Exiting stats thread");
}
