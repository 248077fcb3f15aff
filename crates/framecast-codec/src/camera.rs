//! Shared view state driving the next render request.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use framecast_proto::Camera;

use crate::manager::CodecManager;
use crate::CodecResult;

/// Initial pose: identity orientation with a centred translation.
const INITIAL_CAMERA_MATRIX: [f32; 12] = [
    1.0, 0.0, 0.0, 0.5, 0.0, -1.0, 0.0, 0.5, 0.0, 0.0, -1.0, 0.5,
];

/// Stores the camera consulted for every outgoing render request and
/// reinitialises the owned encoders when an update changes the output
/// resolution. One writer (the camera-control server), many brief readers
/// (dispatcher workers).
pub struct CameraManager {
    camera: Mutex<Camera>,
    codecs: Vec<Arc<CodecManager>>,
}

impl CameraManager {
    /// Start from the initial pose at the configured resolution.
    pub fn new(codecs: Vec<Arc<CodecManager>>, default_width: u32, default_height: u32) -> Self {
        Self {
            camera: Mutex::new(Camera {
                matrix: INITIAL_CAMERA_MATRIX,
                width: default_width & !1,
                height: default_height & !1,
                is_left: false,
            }),
            codecs,
        }
    }

    /// Replace the stored camera, rounding dimensions down to even. A
    /// resolution change reinitialises every owned encoder before the new
    /// state becomes visible to readers.
    pub fn set(&self, camera: Camera) -> CodecResult<()> {
        let camera = camera.rounded_to_even();
        let mut current = self.camera.lock();
        if current.width != camera.width || current.height != camera.height {
            info!(
                from_width = current.width,
                from_height = current.height,
                to_width = camera.width,
                to_height = camera.height,
                "Camera resolution changed"
            );
            for codec in &self.codecs {
                codec.reconfigure(camera.width, camera.height)?;
            }
        }
        *current = camera;
        Ok(())
    }

    /// Snapshot the current camera.
    pub fn get(&self) -> Camera {
        self.camera.lock().clone()
    }
}
