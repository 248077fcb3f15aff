//! Protocol records.

use serde::{Deserialize, Serialize};

/// View parameters for one rendered frame: a row-major 3x4 view matrix and
/// the requested output resolution. The same record travels in both
/// directions: the control channel sends it to update the pose, and every
/// `FrameRequest`/`RenderedFrame` embeds the snapshot it was rendered with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Row-major 3x4 view matrix.
    pub matrix: [f32; 12],
    /// Output image width in pixels.
    pub width: u32,
    /// Output image height in pixels.
    pub height: u32,
    /// Which eye this camera renders in a stereo setup.
    pub is_left: bool,
}

impl Camera {
    /// The encoder's 4:2:0 subsampling requires even dimensions; odd values
    /// are rounded down.
    pub fn rounded_to_even(mut self) -> Self {
        self.width &= !1;
        self.height &= !1;
        self
    }
}

/// Server-to-renderer request for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRequest {
    /// Monotonic frame index, assigned from a process-wide counter.
    pub index: u64,
    /// Camera state the frame must be rendered with.
    pub camera: Camera,
    /// Which eye is being requested in a stereo setup.
    pub is_left: bool,
}

/// Renderer-to-server response carrying the raw pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedFrame {
    /// Index copied from the request.
    pub index: u64,
    /// Camera state copied from the request.
    pub camera: Camera,
    /// Which eye was rendered.
    pub is_left: bool,
    /// Scene pixels, RGB24 row-major, `3 * width * height` bytes.
    pub frame: Vec<u8>,
    /// Optional depth plane, 8-bit grayscale, `width * height` bytes.
    /// Empty when the renderer produces no depth.
    pub depth: Vec<u8>,
}
