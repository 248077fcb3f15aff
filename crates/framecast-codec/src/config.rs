//! Encoder configuration.

use framecast_video::PixelFormat;

use crate::{CodecError, CodecResult};

/// Identifies the compressed bitstream format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    H264,
}

/// Snapshot of the encoder's configuration. Immutable to readers; replaced
/// wholesale under the manager's write lock on resolution change.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    pub codec_id: CodecId,
    pub pix_fmt: PixelFormat,
    /// Encoder speed/quality preset, e.g. `ultrafast`.
    pub preset: String,
    /// Comma-separated tuning names, e.g. `stillimage,zerolatency`.
    pub tune: String,
    pub width: u32,
    pub height: u32,
    /// Target bitrate in bits per second.
    pub bit_rate: u32,
    pub fps: u32,
    /// Maximum frames between two keyframes.
    pub keyframe_interval: u32,
}

impl CodecConfig {
    /// Build a configuration, rounding dimensions down to even as the
    /// 4:2:0 pixel format requires.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        codec_id: CodecId,
        pix_fmt: PixelFormat,
        preset: impl Into<String>,
        tune: impl Into<String>,
        width: u32,
        height: u32,
        bit_rate: u32,
        fps: u32,
        keyframe_interval: u32,
    ) -> Self {
        Self {
            codec_id,
            pix_fmt,
            preset: preset.into(),
            tune: tune.into(),
            width: width & !1,
            height: height & !1,
            bit_rate,
            fps,
            keyframe_interval,
        }
    }

    /// Replace the output resolution, rounding down to even.
    pub(crate) fn set_resolution(&mut self, width: u32, height: u32) {
        self.width = width & !1;
        self.height = height & !1;
    }
}

/// Tuning flags parsed from the comma-separated `tune` string. x264 keeps
/// the psycho-visual tunings and the latency/decode flags in separate
/// knobs, so one string can set all three.
pub(crate) struct TuneFlags {
    pub tune: x264::Tune,
    pub fast_decode: bool,
    pub zero_latency: bool,
}

pub(crate) fn parse_preset(preset: &str) -> CodecResult<x264::Preset> {
    match preset {
        "ultrafast" => Ok(x264::Preset::Ultrafast),
        "superfast" => Ok(x264::Preset::Superfast),
        "veryfast" => Ok(x264::Preset::Veryfast),
        "faster" => Ok(x264::Preset::Faster),
        "fast" => Ok(x264::Preset::Fast),
        "medium" => Ok(x264::Preset::Medium),
        "slow" => Ok(x264::Preset::Slow),
        "slower" => Ok(x264::Preset::Slower),
        "veryslow" => Ok(x264::Preset::Veryslow),
        "placebo" => Ok(x264::Preset::Placebo),
        other => Err(CodecError::UnknownPreset(other.to_string())),
    }
}

pub(crate) fn parse_tune(tune: &str) -> CodecResult<TuneFlags> {
    let mut flags = TuneFlags {
        tune: x264::Tune::None,
        fast_decode: false,
        zero_latency: false,
    };
    for name in tune.split(',').map(str::trim).filter(|name| !name.is_empty()) {
        match name {
            "fastdecode" => flags.fast_decode = true,
            "zerolatency" => flags.zero_latency = true,
            "film" => flags.tune = x264::Tune::Film,
            "animation" => flags.tune = x264::Tune::Animation,
            "grain" => flags.tune = x264::Tune::Grain,
            "stillimage" => flags.tune = x264::Tune::StillImage,
            "psnr" => flags.tune = x264::Tune::Psnr,
            "ssim" => flags.tune = x264::Tune::Ssim,
            other => return Err(CodecError::UnknownTune(other.to_string())),
        }
    }
    Ok(flags)
}
