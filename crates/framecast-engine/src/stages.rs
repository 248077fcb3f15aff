//! The three pipeline workers: convert, feed and drain.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use framecast_codec::{CodecManager, DrainResult, FeedResult};
use framecast_net::PacketStreamServer;
use framecast_proto::Camera;
use framecast_video::{
    convert_to_i420, ConvertedFrame, FrameQueue, OverlayPosition, OverlayRenderer, RawFrame,
    ReorderMap,
};

use crate::stats::PipelineStats;

/// Backoff while the encoder has nothing to accept or produce. Long enough
/// to yield the encoder lock, short enough to be invisible at frame rate.
const ENCODER_RETRY_SLEEP: Duration = Duration::from_millis(1);
/// Frames between two processing-time debug reports.
const PROCESS_STATS_INTERVAL: u64 = 100;

/// Shared state handed to each worker.
#[derive(Clone)]
pub struct PipelineContext {
    pub raw_queue: Arc<FrameQueue<RawFrame>>,
    pub reorder: Arc<ReorderMap<ConvertedFrame>>,
    pub codec: Arc<CodecManager>,
    pub stats: Arc<PipelineStats>,
    pub shutdown: Arc<AtomicBool>,
}

/// Wall-clock timestamp drawn on every frame.
fn wall_clock() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

/// The 3x4 view matrix rendered four values per line, padded out to the
/// full 4x4 homogeneous form.
fn camera_matrix_text(camera: &Camera) -> String {
    let mut text = String::new();
    for row in camera.matrix.chunks(4) {
        for value in row {
            let _ = write!(text, "{value:+.5} ");
        }
        text.push('\n');
    }
    for value in [0.0f32, 0.0, 0.0, 1.0] {
        let _ = write!(text, "{value:+.5} ");
    }
    text
}

/// Pop raw frames, draw the overlays, convert to the encoder's pixel
/// format and stage the result by index for the feeder.
pub fn convert_worker(ctx: PipelineContext, overlay: OverlayRenderer) {
    let mut processed = 0u64;
    let mut elapsed_ms = 0u128;

    while !ctx.shutdown.load(Ordering::Relaxed) {
        let mut frame = match ctx.raw_queue.pop() {
            Ok(frame) => frame,
            Err(_) => continue, // timeout; re-check shutdown
        };
        let started = Instant::now();
        ctx.stats.record_frame();

        overlay.draw(
            &mut frame,
            OverlayPosition::LeftBottom,
            &format!("index={}", frame.index()),
        );
        overlay.draw(&mut frame, OverlayPosition::LeftTop, &wall_clock());
        overlay.draw(
            &mut frame,
            OverlayPosition::Center,
            &camera_matrix_text(frame.camera()),
        );

        // The config handle is held across preparation so the converted
        // frame matches the encoder the feeder will hand it to.
        let converted = {
            let config = ctx.codec.get_config();
            convert_to_i420(frame, config.width, config.height)
        };

        let index = converted.index();
        if ctx.reorder.insert(index, converted).is_err() {
            debug!(index, "Reorder map is full; dropping frame");
            ctx.stats.record_drop();
            continue;
        }

        processed += 1;
        elapsed_ms += started.elapsed().as_millis();
        if processed == PROCESS_STATS_INTERVAL {
            debug!(
                avg_ms = (elapsed_ms / processed as u128) as u64,
                "Average frame processing time over the last 100 frames"
            );
            processed = 0;
            elapsed_ms = 0;
        }
    }
    info!("Exiting convert thread");
}

/// Feed converted frames to the encoder in strict index order. An index
/// whose frame never arrives is skipped after the map timeout; the
/// encoder's periodic keyframes resynchronise downstream decoders.
pub fn feed_worker(ctx: PipelineContext) {
    let mut expected_index = 0u64;
    while !ctx.shutdown.load(Ordering::Relaxed) {
        match ctx.reorder.take_in_order(expected_index) {
            Ok(frame) => {
                if !feed_one(&ctx, &frame) {
                    break;
                }
            }
            Err(_) => {
                warn!(
                    index = expected_index,
                    "Timeout reached while waiting for frame. Skipping."
                );
                ctx.stats.record_drop();
            }
        }
        // Advance whether the take succeeded or timed out.
        expected_index += 1;
    }
    info!("Exiting feed thread");
}

/// Returns false when the pipeline should stop.
fn feed_one(ctx: &PipelineContext, frame: &ConvertedFrame) -> bool {
    loop {
        match ctx.codec.feed(frame) {
            Ok(FeedResult::Accepted) => return true,
            Ok(FeedResult::NeedsDrain) => {
                thread::sleep(ENCODER_RETRY_SLEEP);
                if ctx.shutdown.load(Ordering::Relaxed) {
                    return false;
                }
            }
            Ok(FeedResult::Flushed) => {
                info!("Encoder is flushed; stopping the feeder");
                ctx.shutdown.store(true, Ordering::Relaxed);
                return false;
            }
            Err(err) => {
                error!(%err, "Encoder rejected frame");
                ctx.shutdown.store(true, Ordering::Relaxed);
                return false;
            }
        }
    }
}

/// Drain compressed packets from the encoder and hand each one to the
/// fan-out server in encode order.
pub fn drain_worker(ctx: PipelineContext, sink: Arc<PacketStreamServer>) {
    while !ctx.shutdown.load(Ordering::Relaxed) {
        match ctx.codec.drain() {
            Ok(DrainResult::Packet(packet)) => {
                ctx.stats.record_packet(packet.data.len());
                sink.consume_packet(&packet);
            }
            Ok(DrainResult::WouldBlock) => thread::sleep(ENCODER_RETRY_SLEEP),
            Ok(DrainResult::EndOfStream) => {
                info!("Encoder reached end of stream");
                ctx.shutdown.store(true, Ordering::Relaxed);
            }
            Err(err) => {
                error!(%err, "Failed to receive packet from encoder");
                ctx.shutdown.store(true, Ordering::Relaxed);
            }
        }
    }
    info!("Exiting drain thread");
}

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;

    use framecast_codec::{
        CodecConfig, CodecId, CodecResult, EncoderPacket, VideoCodec,
    };
    use framecast_video::{PixelFormat, FRAME_STAGE_CAPACITY};

    use std::sync::Mutex;

    struct CountingCodec {
        width: u32,
        height: u32,
        fed_indices: Arc<Mutex<Vec<u64>>>,
    }

    impl VideoCodec for CountingCodec {
        fn encode(
            &mut self,
            frame: &ConvertedFrame,
            _pts: i64,
        ) -> CodecResult<Vec<EncoderPacket>> {
            self.fed_indices.lock().unwrap().push(frame.index());
            Ok(vec![EncoderPacket {
                data: Bytes::from(vec![0xFF, frame.index() as u8]),
                keyframe: frame.index() == 0,
            }])
        }

        fn flush(&mut self) -> CodecResult<Vec<EncoderPacket>> {
            Ok(Vec::new())
        }

        fn dimensions(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn test_codec(fed: Arc<Mutex<Vec<u64>>>) -> Arc<CodecManager> {
        let config = CodecConfig::new(
            CodecId::H264,
            PixelFormat::I420,
            "ultrafast",
            "",
            4,
            4,
            400_000,
            30,
            250,
        );
        Arc::new(
            CodecManager::with_factory(
                config,
                Box::new(move |config| {
                    Ok(Box::new(CountingCodec {
                        width: config.width,
                        height: config.height,
                        fed_indices: Arc::clone(&fed),
                    }) as Box<dyn VideoCodec>)
                }),
            )
            .unwrap(),
        )
    }

    fn converted(index: u64) -> ConvertedFrame {
        let camera = Camera {
            matrix: [0.0; 12],
            width: 4,
            height: 4,
            is_left: false,
        };
        let raw = RawFrame::new(index, camera, vec![0u8; 48], None).unwrap();
        convert_to_i420(raw, 4, 4)
    }

    fn test_context(codec: Arc<CodecManager>) -> PipelineContext {
        PipelineContext {
            raw_queue: Arc::new(FrameQueue::new(FRAME_STAGE_CAPACITY)),
            reorder: Arc::new(ReorderMap::with_timeouts(
                FRAME_STAGE_CAPACITY,
                Duration::from_millis(50),
                Duration::from_millis(50),
            )),
            codec,
            stats: Arc::new(PipelineStats::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn matrix_text_has_four_rows_and_a_homogeneous_tail() {
        let camera = Camera {
            matrix: [
                1.0, 0.0, 0.0, 0.5, 0.0, -1.0, 0.0, 0.5, 0.0, 0.0, -1.0, 0.5,
            ],
            width: 4,
            height: 4,
            is_left: false,
        };
        let text = camera_matrix_text(&camera);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("+1.00000 "));
        assert!(lines[1].contains("-1.00000"));
        assert_eq!(lines[3].trim_end(), "+0.00000 +0.00000 +0.00000 +1.00000");
    }

    #[test]
    fn feeder_skips_missing_indices_and_keeps_order() {
        let fed = Arc::new(Mutex::new(Vec::new()));
        let codec = test_codec(Arc::clone(&fed));
        let ctx = test_context(codec);

        // Index 1 never arrives.
        ctx.reorder.insert(0, converted(0)).unwrap();
        ctx.reorder.insert(2, converted(2)).unwrap();
        ctx.reorder.insert(3, converted(3)).unwrap();

        let feeder = {
            let ctx = ctx.clone();
            thread::spawn(move || feed_worker(ctx))
        };

        // Wait for the feeder to work past index 3, then stop it.
        for _ in 0..100 {
            if fed.lock().unwrap().len() == 3 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        ctx.shutdown.store(true, Ordering::Relaxed);
        feeder.join().unwrap();

        assert_eq!(*fed.lock().unwrap(), vec![0, 2, 3]);
        // At least the skipped index 1; the feeder may have timed out on
        // index 4 before shutdown landed.
        assert!(ctx.stats.frames_dropped() >= 1);
    }

    #[test]
    fn drain_worker_stops_at_end_of_stream() {
        let fed = Arc::new(Mutex::new(Vec::new()));
        let codec = test_codec(fed);
        let ctx = test_context(Arc::clone(&codec));

        codec.feed(&converted(0)).unwrap();
        codec.shutdown().unwrap();

        let sink = Arc::new(PacketStreamServer::new(0));
        sink.start().unwrap();

        drain_worker(ctx.clone(), Arc::clone(&sink));

        // The worker consumed the packet and then flipped shutdown on
        // end of stream.
        assert!(ctx.shutdown.load(Ordering::Relaxed));
        assert_eq!(ctx.stats.packets_sent(), 1);
        sink.stop();
    }
}
