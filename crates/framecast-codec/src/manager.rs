//! Thread-safe ownership of the encoder and its configuration.

use std::collections::VecDeque;
use std::ops::Deref;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, info};

use framecast_video::ConvertedFrame;

use crate::config::CodecConfig;
use crate::encoder::{CodecFactory, EncoderPacket, VideoCodec, X264Codec};
use crate::{CodecResult, PENDING_PACKET_CAPACITY};

/// Outcome of handing a frame to the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedResult {
    /// The frame was consumed.
    Accepted,
    /// The pending-packet buffer is full; drain before retrying.
    NeedsDrain,
    /// The encoder has been torn down; no more frames are accepted.
    Flushed,
}

/// Outcome of asking the encoder for a compressed packet.
#[derive(Debug)]
pub enum DrainResult {
    Packet(EncoderPacket),
    /// Nothing buffered yet; feed more frames and retry.
    WouldBlock,
    /// The encoder is gone and its buffer is empty.
    EndOfStream,
}

/// Shared read access to the live configuration. Holding the handle fences
/// out `reconfigure`, so a frame prepared against it still matches the
/// encoder when fed.
pub struct ConfigHandle<'a>(RwLockReadGuard<'a, CodecConfig>);

impl Deref for ConfigHandle<'_> {
    type Target = CodecConfig;

    fn deref(&self) -> &CodecConfig {
        &self.0
    }
}

struct EncoderState {
    codec: Option<Box<dyn VideoCodec>>,
    /// Packets encoded but not yet drained. Bounding this queue is what
    /// back-pressures the feeder.
    pending: VecDeque<EncoderPacket>,
    next_pts: i64,
}

/// Owns the encoder. Feed and drain run from different threads; a
/// resolution change excludes both by taking the config write lock and
/// the encoder lock, in that order.
pub struct CodecManager {
    config: RwLock<CodecConfig>,
    state: Mutex<EncoderState>,
    factory: Box<CodecFactory>,
}

impl CodecManager {
    /// Open an x264 encoder from `config`.
    pub fn new(config: CodecConfig) -> CodecResult<Self> {
        Self::with_factory(
            config,
            Box::new(|config| {
                X264Codec::open(config).map(|codec| Box::new(codec) as Box<dyn VideoCodec>)
            }),
        )
    }

    /// Open with a custom codec constructor. The factory is also used for
    /// every subsequent reconfiguration.
    pub fn with_factory(config: CodecConfig, factory: Box<CodecFactory>) -> CodecResult<Self> {
        let codec = factory(&config)?;
        info!(
            name = codec.name(),
            width = config.width,
            height = config.height,
            "Encoder opened"
        );
        Ok(Self {
            config: RwLock::new(config),
            state: Mutex::new(EncoderState {
                codec: Some(codec),
                pending: VecDeque::new(),
                next_pts: 0,
            }),
            factory,
        })
    }

    /// Snapshot the current configuration. Reconfiguration blocks until
    /// the handle is dropped.
    pub fn get_config(&self) -> ConfigHandle<'_> {
        ConfigHandle(self.config.read())
    }

    /// Hand one converted frame to the encoder.
    pub fn feed(&self, frame: &ConvertedFrame) -> CodecResult<FeedResult> {
        let mut state = self.state.lock();
        if state.pending.len() >= PENDING_PACKET_CAPACITY {
            return Ok(FeedResult::NeedsDrain);
        }

        let pts = state.next_pts;
        let packets = match state.codec.as_mut() {
            Some(codec) => {
                if codec.dimensions() != (frame.width(), frame.height()) {
                    // A reconfigure landed between conversion and feed; the
                    // frame can no longer be encoded. The reopened encoder
                    // keyframes immediately, so downstream stays decodable.
                    debug!(
                        index = frame.index(),
                        "Dropping frame prepared for a previous resolution"
                    );
                    return Ok(FeedResult::Accepted);
                }
                codec.encode(frame, pts)?
            }
            None => return Ok(FeedResult::Flushed),
        };
        state.next_pts += 1;
        state.pending.extend(packets);
        Ok(FeedResult::Accepted)
    }

    /// Pull one compressed packet if any is ready.
    pub fn drain(&self) -> CodecResult<DrainResult> {
        let mut state = self.state.lock();
        if let Some(packet) = state.pending.pop_front() {
            return Ok(DrainResult::Packet(packet));
        }
        if state.codec.is_none() {
            return Ok(DrainResult::EndOfStream);
        }
        Ok(DrainResult::WouldBlock)
    }

    /// Tear down the encoder and reopen it at the new resolution (rounded
    /// down to even). Lock order is config write, then encoder; readers
    /// holding a `ConfigHandle` block this instead of deadlocking against
    /// it.
    pub fn reconfigure(&self, width: u32, height: u32) -> CodecResult<()> {
        let mut config = self.config.write();
        let mut state = self.state.lock();

        config.set_resolution(width, height);
        // The old encoder must close before its replacement opens.
        state.codec = None;
        let codec = (self.factory)(&config)?;
        info!(
            width = config.width,
            height = config.height,
            "Encoder reopened at new resolution"
        );
        state.codec = Some(codec);
        state.next_pts = 0;
        Ok(())
    }

    /// Flush the encoder at teardown, moving its buffered packets into the
    /// pending queue. After this, `feed` reports `Flushed` and `drain`
    /// reaches `EndOfStream` once the queue empties.
    pub fn shutdown(&self) -> CodecResult<()> {
        let mut state = self.state.lock();
        if let Some(mut codec) = state.codec.take() {
            let packets = codec.flush()?;
            debug!(flushed = packets.len(), "Encoder flushed");
            state.pending.extend(packets);
        }
        Ok(())
    }

    /// Packets waiting to be drained.
    pub fn pending_packets(&self) -> usize {
        self.state.lock().pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use bytes::Bytes;

    use framecast_proto::Camera;
    use framecast_video::{convert_to_i420, PixelFormat, RawFrame};

    use crate::config::CodecId;
    use crate::CodecError;

    /// Codec double: emits one packet per frame, keyframe first.
    struct MockCodec {
        width: u32,
        height: u32,
        encoded: u64,
        fail_encode: bool,
    }

    impl VideoCodec for MockCodec {
        fn encode(
            &mut self,
            frame: &ConvertedFrame,
            pts: i64,
        ) -> CodecResult<Vec<EncoderPacket>> {
            if self.fail_encode {
                return Err(CodecError::Encoding("mock failure".to_string()));
            }
            assert_eq!((frame.width(), frame.height()), (self.width, self.height));
            self.encoded += 1;
            Ok(vec![EncoderPacket {
                data: Bytes::from(vec![0xAA, pts as u8]),
                keyframe: self.encoded == 1,
            }])
        }

        fn flush(&mut self) -> CodecResult<Vec<EncoderPacket>> {
            Ok(vec![EncoderPacket {
                data: Bytes::from_static(&[0xFF]),
                keyframe: false,
            }])
        }

        fn dimensions(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    fn mock_factory(opened: Arc<AtomicU32>) -> Box<CodecFactory> {
        Box::new(move |config| {
            opened.fetch_add(1, Ordering::Relaxed);
            Ok(Box::new(MockCodec {
                width: config.width,
                height: config.height,
                encoded: 0,
                fail_encode: false,
            }) as Box<dyn VideoCodec>)
        })
    }

    fn config(width: u32, height: u32) -> CodecConfig {
        CodecConfig::new(
            CodecId::H264,
            PixelFormat::I420,
            "ultrafast",
            "zerolatency",
            width,
            height,
            400_000,
            30,
            250,
        )
    }

    fn converted(index: u64, width: u32, height: u32) -> ConvertedFrame {
        let camera = Camera {
            matrix: [0.0; 12],
            width,
            height,
            is_left: false,
        };
        let scene = vec![0u8; (width * height * 3) as usize];
        let raw = RawFrame::new(index, camera, scene, None).unwrap();
        convert_to_i420(raw, width, height)
    }

    #[test]
    fn fed_frames_come_back_out_in_order() {
        let manager =
            CodecManager::with_factory(config(4, 4), mock_factory(Arc::default())).unwrap();

        for index in 0..3 {
            assert_eq!(
                manager.feed(&converted(index, 4, 4)).unwrap(),
                FeedResult::Accepted
            );
        }

        let first = match manager.drain().unwrap() {
            DrainResult::Packet(packet) => packet,
            other => panic!("expected packet, got {other:?}"),
        };
        assert!(first.keyframe);
        for _ in 0..2 {
            match manager.drain().unwrap() {
                DrainResult::Packet(packet) => assert!(!packet.keyframe),
                other => panic!("expected packet, got {other:?}"),
            }
        }
        assert!(matches!(manager.drain().unwrap(), DrainResult::WouldBlock));
    }

    #[test]
    fn feed_backpressures_when_pending_is_full() {
        let manager =
            CodecManager::with_factory(config(4, 4), mock_factory(Arc::default())).unwrap();

        for index in 0..PENDING_PACKET_CAPACITY as u64 {
            assert_eq!(
                manager.feed(&converted(index, 4, 4)).unwrap(),
                FeedResult::Accepted
            );
        }
        assert_eq!(
            manager.feed(&converted(99, 4, 4)).unwrap(),
            FeedResult::NeedsDrain
        );

        // One drain frees one slot.
        assert!(matches!(manager.drain().unwrap(), DrainResult::Packet(_)));
        assert_eq!(
            manager.feed(&converted(99, 4, 4)).unwrap(),
            FeedResult::Accepted
        );
    }

    #[test]
    fn reconfigure_rounds_and_reopens_exactly_once() {
        let opened = Arc::new(AtomicU32::new(0));
        let manager =
            CodecManager::with_factory(config(1280, 720), mock_factory(Arc::clone(&opened)))
                .unwrap();
        assert_eq!(opened.load(Ordering::Relaxed), 1);

        manager.reconfigure(1921, 1081).unwrap();
        assert_eq!(opened.load(Ordering::Relaxed), 2);

        let config = manager.get_config();
        assert_eq!((config.width, config.height), (1920, 1080));
    }

    #[test]
    fn matching_frame_is_accepted_after_reconfigure() {
        let manager =
            CodecManager::with_factory(config(4, 4), mock_factory(Arc::default())).unwrap();
        manager.reconfigure(8, 8).unwrap();

        assert_eq!(
            manager.feed(&converted(0, 8, 8)).unwrap(),
            FeedResult::Accepted
        );
        match manager.drain().unwrap() {
            DrainResult::Packet(packet) => assert!(packet.keyframe),
            other => panic!("expected keyframe packet, got {other:?}"),
        }
    }

    #[test]
    fn stale_resolution_frame_is_consumed_without_encoding() {
        let manager =
            CodecManager::with_factory(config(4, 4), mock_factory(Arc::default())).unwrap();
        manager.reconfigure(8, 8).unwrap();

        // Converted before the reconfigure; silently dropped.
        assert_eq!(
            manager.feed(&converted(0, 4, 4)).unwrap(),
            FeedResult::Accepted
        );
        assert!(matches!(manager.drain().unwrap(), DrainResult::WouldBlock));
    }

    #[test]
    fn failed_reconfigure_is_fatal_and_flushes() {
        let manager = CodecManager::with_factory(
            config(4, 4),
            Box::new(|config| {
                if config.width > 4 {
                    Err(CodecError::Initialization("too big".to_string()))
                } else {
                    Ok(Box::new(MockCodec {
                        width: config.width,
                        height: config.height,
                        encoded: 0,
                        fail_encode: false,
                    }) as Box<dyn VideoCodec>)
                }
            }),
        )
        .unwrap();

        assert!(manager.reconfigure(8, 8).is_err());
        assert_eq!(
            manager.feed(&converted(0, 8, 8)).unwrap(),
            FeedResult::Flushed
        );
        assert!(matches!(manager.drain().unwrap(), DrainResult::EndOfStream));
    }

    #[test]
    fn encode_errors_propagate_from_feed() {
        let manager = CodecManager::with_factory(
            config(4, 4),
            Box::new(|config| {
                Ok(Box::new(MockCodec {
                    width: config.width,
                    height: config.height,
                    encoded: 0,
                    fail_encode: true,
                }) as Box<dyn VideoCodec>)
            }),
        )
        .unwrap();

        assert!(manager.feed(&converted(0, 4, 4)).is_err());
    }

    #[test]
    fn shutdown_flushes_and_ends_the_stream() {
        let manager =
            CodecManager::with_factory(config(4, 4), mock_factory(Arc::default())).unwrap();
        manager.feed(&converted(0, 4, 4)).unwrap();
        manager.shutdown().unwrap();

        assert_eq!(
            manager.feed(&converted(1, 4, 4)).unwrap(),
            FeedResult::Flushed
        );
        // The encoded packet, then the flush packet, then end of stream.
        assert!(matches!(manager.drain().unwrap(), DrainResult::Packet(_)));
        assert!(matches!(manager.drain().unwrap(), DrainResult::Packet(_)));
        assert!(matches!(manager.drain().unwrap(), DrainResult::EndOfStream));
    }

    #[test]
    fn config_handle_blocks_reconfigure_until_dropped() {
        let manager = Arc::new(
            CodecManager::with_factory(config(4, 4), mock_factory(Arc::default())).unwrap(),
        );

        let handle = manager.get_config();
        let reconfigurer = {
            let manager = Arc::clone(&manager);
            std::thread::spawn(move || manager.reconfigure(8, 8).unwrap())
        };

        // The write lock cannot be granted while the handle lives.
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!((handle.width, handle.height), (4, 4));
        drop(handle);

        reconfigurer.join().unwrap();
        let config = manager.get_config();
        assert_eq!((config.width, config.height), (8, 8));
    }
}
