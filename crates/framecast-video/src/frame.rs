//! Uniquely owned frame types.

use framecast_proto::{Camera, RenderedFrame};

use crate::{VideoError, VideoResult};

/// Pixel formats that flow through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit RGB, 3 bytes per pixel, one plane.
    Rgb24,
    /// 8-bit grayscale, one plane.
    Gray8,
    /// Planar YUV 4:2:0, three planes.
    I420,
}

impl PixelFormat {
    /// Buffer size for a tightly packed frame of the given dimensions.
    pub fn buffer_size(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Rgb24 => pixels * 3,
            PixelFormat::Gray8 => pixels,
            PixelFormat::I420 => pixels + pixels / 2,
        }
    }
}

/// A validated renderer reply: the raw scene plane (and optional depth
/// plane) together with the camera snapshot it was rendered against.
/// Uniquely owned from ingestion until it is consumed by conversion.
#[derive(Debug)]
pub struct RawFrame {
    index: u64,
    camera: Camera,
    scene: Vec<u8>,
    depth: Option<Vec<u8>>,
}

impl RawFrame {
    /// Validate a wire reply into an owned frame. The embedded dimensions
    /// must match both pixel buffers exactly.
    pub fn from_wire(reply: RenderedFrame) -> VideoResult<Self> {
        let depth = if reply.depth.is_empty() {
            None
        } else {
            Some(reply.depth)
        };
        Self::new(reply.index, reply.camera, reply.frame, depth)
    }

    /// Build a frame from parts, validating buffer sizes against the
    /// camera dimensions.
    pub fn new(
        index: u64,
        camera: Camera,
        scene: Vec<u8>,
        depth: Option<Vec<u8>>,
    ) -> VideoResult<Self> {
        let expected = PixelFormat::Rgb24.buffer_size(camera.width, camera.height);
        if scene.len() != expected {
            return Err(VideoError::InvalidFrame {
                expected,
                actual: scene.len(),
            });
        }
        if let Some(ref depth) = depth {
            let expected = PixelFormat::Gray8.buffer_size(camera.width, camera.height);
            if depth.len() != expected {
                return Err(VideoError::InvalidFrame {
                    expected,
                    actual: depth.len(),
                });
            }
        }
        Ok(Self {
            index,
            camera,
            scene,
            depth,
        })
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn width(&self) -> u32 {
        self.camera.width
    }

    pub fn height(&self) -> u32 {
        self.camera.height
    }

    /// The RGB24 scene plane.
    pub fn scene(&self) -> &[u8] {
        &self.scene
    }

    /// Mutable scene plane, used by the overlay renderer.
    pub fn scene_mut(&mut self) -> &mut [u8] {
        &mut self.scene
    }

    /// The grayscale depth plane, when the renderer produced one.
    pub fn depth(&self) -> Option<&[u8]> {
        self.depth.as_deref()
    }
}

/// A frame in the encoder's pixel format, produced once from a `RawFrame`.
/// Plane strides are aligned for the encoder's SIMD routines.
#[derive(Debug)]
pub struct ConvertedFrame {
    index: u64,
    camera: Camera,
    width: u32,
    height: u32,
    pix_fmt: PixelFormat,
    planes: [Vec<u8>; 3],
    strides: [usize; 3],
}

impl ConvertedFrame {
    pub(crate) fn new(
        index: u64,
        camera: Camera,
        width: u32,
        height: u32,
        pix_fmt: PixelFormat,
        planes: [Vec<u8>; 3],
        strides: [usize; 3],
    ) -> Self {
        Self {
            index,
            camera,
            width,
            height,
            pix_fmt,
            planes,
            strides,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Width the frame was converted to (the encoder's, not the camera's).
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pix_fmt(&self) -> PixelFormat {
        self.pix_fmt
    }

    pub fn plane(&self, plane: usize) -> &[u8] {
        &self.planes[plane]
    }

    pub fn stride(&self, plane: usize) -> usize {
        self.strides[plane]
    }
}
