//! Encoder implementations behind the `VideoCodec` seam.

use bytes::Bytes;
use tracing::debug;

use framecast_video::{ConvertedFrame, PixelFormat};

use crate::config::{parse_preset, parse_tune, CodecConfig};
use crate::{CodecError, CodecResult};

/// One compressed frame out of the encoder.
#[derive(Debug, Clone)]
pub struct EncoderPacket {
    /// Encoded bitstream data.
    pub data: Bytes,
    /// Whether the packet is a self-contained keyframe.
    pub keyframe: bool,
}

/// A delta-frame video encoder with a feed-frames / collect-packets API.
/// Implementations are driven from behind the codec manager's exclusive
/// lock, one call at a time.
pub trait VideoCodec: Send {
    /// Encode one frame. Encoders may buffer, so zero packets is a normal
    /// outcome.
    fn encode(&mut self, frame: &ConvertedFrame, pts: i64) -> CodecResult<Vec<EncoderPacket>>;

    /// Flush buffered frames and finish the bitstream. No frames are
    /// accepted afterwards.
    fn flush(&mut self) -> CodecResult<Vec<EncoderPacket>>;

    /// The frame dimensions this encoder instance was opened with.
    fn dimensions(&self) -> (u32, u32);

    /// Encoder name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Builds a codec instance from a configuration snapshot. The manager
/// calls this at startup and on every resolution change.
pub type CodecFactory = dyn Fn(&CodecConfig) -> CodecResult<Box<dyn VideoCodec>> + Send + Sync;

/// x264 software encoder.
pub struct X264Codec {
    encoder: Option<x264::Encoder>,
    width: u32,
    height: u32,
    /// Cached SPS/PPS, prepended to the first packet so every (re)opened
    /// stream starts decodable.
    headers: Option<Vec<u8>>,
}

impl X264Codec {
    /// Open an encoder from `config`.
    pub fn open(config: &CodecConfig) -> CodecResult<Self> {
        if config.pix_fmt != PixelFormat::I420 {
            return Err(CodecError::Initialization(format!(
                "x264 input must be I420, got {:?}",
                config.pix_fmt
            )));
        }

        debug!(
            width = config.width,
            height = config.height,
            bit_rate = config.bit_rate,
            fps = config.fps,
            keyframe_interval = config.keyframe_interval,
            preset = %config.preset,
            tune = %config.tune,
            "Opening x264 encoder"
        );

        let tune = parse_tune(&config.tune)?;
        let setup = x264::Setup::preset(
            parse_preset(&config.preset)?,
            tune.tune,
            tune.fast_decode,
            tune.zero_latency,
        )
        .fps(config.fps, 1)
        .bitrate((config.bit_rate / 1000) as i32)
        .max_keyframe_interval(config.keyframe_interval as i32)
        .scenecut_threshold(0); // Keyframes come from the interval alone.

        let mut encoder = setup
            .build(
                x264::Colorspace::I420,
                config.width as i32,
                config.height as i32,
            )
            .map_err(|err| CodecError::Initialization(format!("x264 setup failed: {err:?}")))?;

        let headers = encoder
            .headers()
            .map(|headers| headers.entirety().to_vec())
            .map_err(|err| {
                CodecError::Initialization(format!("x264 headers unavailable: {err:?}"))
            })?;
        debug!(header_size = headers.len(), "x264 encoder opened");

        Ok(Self {
            encoder: Some(encoder),
            width: config.width,
            height: config.height,
            headers: Some(headers),
        })
    }
}

impl VideoCodec for X264Codec {
    fn encode(&mut self, frame: &ConvertedFrame, pts: i64) -> CodecResult<Vec<EncoderPacket>> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| CodecError::Encoding("Encoder has been flushed".to_string()))?;

        if (frame.width(), frame.height()) != (self.width, self.height) {
            return Err(CodecError::Encoding(format!(
                "Frame is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let planes = [
            x264::Plane {
                data: frame.plane(0),
                stride: frame.stride(0) as i32,
            },
            x264::Plane {
                data: frame.plane(1),
                stride: frame.stride(1) as i32,
            },
            x264::Plane {
                data: frame.plane(2),
                stride: frame.stride(2) as i32,
            },
        ];
        let image = x264::Image::new(
            x264::Colorspace::I420,
            self.width as i32,
            self.height as i32,
            &planes,
        );

        let (data, picture) = encoder
            .encode(pts, image)
            .map_err(|err| CodecError::Encoding(format!("x264 encode failed: {err:?}")))?;

        if data.len() == 0 {
            // Frame is buffered inside the encoder.
            return Ok(Vec::new());
        }

        let mut payload = self.headers.take().unwrap_or_default();
        payload.extend_from_slice(data.entirety());
        Ok(vec![EncoderPacket {
            data: Bytes::from(payload),
            keyframe: picture.keyframe(),
        }])
    }

    fn flush(&mut self) -> CodecResult<Vec<EncoderPacket>> {
        let encoder = match self.encoder.take() {
            Some(encoder) => encoder,
            None => return Ok(Vec::new()),
        };

        let mut packets = Vec::new();
        let mut flush = encoder.flush();
        while let Some(result) = flush.next() {
            match result {
                Ok((data, picture)) => {
                    if data.len() > 0 {
                        packets.push(EncoderPacket {
                            data: Bytes::from(data.entirety().to_vec()),
                            keyframe: picture.keyframe(),
                        });
                    }
                }
                Err(err) => {
                    debug!("x264 flush ended: {err:?}");
                    break;
                }
            }
        }
        Ok(packets)
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn name(&self) -> &'static str {
        "x264"
    }
}

// SAFETY: x264::Encoder holds raw pointers internally but has no thread
// affinity; the codec manager's exclusive lock guarantees one thread at a
// time.
unsafe impl Send for X264Codec {}
