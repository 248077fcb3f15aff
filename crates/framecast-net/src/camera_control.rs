//! Inbound camera updates from the control WebSocket.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{error, info};

use framecast_codec::CameraManager;
use framecast_proto::{decode_message, Camera};

use crate::ws::WsServer;
use crate::NetResult;

/// Camera receipts between two progress log lines. Updates arrive at input
/// frame rate, so logging each one would drown the log.
const RECEIVED_LOG_INTERVAL: u64 = 1000;

/// WebSocket server accepting binary `Camera` records and dispatching them
/// to the camera manager. No reply is sent. A failed encoder
/// reconfiguration is fatal and flips the process shutdown flag.
pub struct CameraControlServer {
    ws: WsServer,
    cameras: Arc<CameraManager>,
    shutdown: Arc<AtomicBool>,
}

impl CameraControlServer {
    pub fn new(cameras: Arc<CameraManager>, bind_port: u16, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            ws: WsServer::new("CameraControlServer", bind_port),
            cameras,
            shutdown,
        }
    }

    pub fn start(&self) -> NetResult<()> {
        let cameras = Arc::clone(&self.cameras);
        let shutdown = Arc::clone(&self.shutdown);
        let received = AtomicU64::new(0);
        self.ws.start(Arc::new(move |payload: &[u8]| {
            let camera: Camera = match decode_message(payload) {
                Ok(camera) => camera,
                Err(err) => {
                    error!(%err, "Failed to decode camera update");
                    return;
                }
            };
            if received.fetch_add(1, Ordering::Relaxed) % RECEIVED_LOG_INTERVAL == 0 {
                info!("Receiving camera updates");
            }
            if let Err(err) = cameras.set(camera) {
                error!(%err, "Encoder reconfiguration failed");
                shutdown.store(true, Ordering::Relaxed);
            }
        }))
    }

    pub fn stop(&self) {
        self.ws.stop();
    }

    #[cfg(test)]
    pub(crate) fn local_port(&self) -> Option<u16> {
        self.ws.local_port()
    }
}
