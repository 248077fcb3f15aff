//! Fan-out of encoded packets to viewers.

use std::sync::Arc;

use framecast_codec::EncoderPacket;

use crate::ws::WsServer;
use crate::NetResult;

/// WebSocket fan-out for the compressed bitstream.
///
/// Byte 0 of every outgoing message is overwritten with the keyframe
/// marker: `0` for a keyframe, `1` for a delta frame. Browser viewers read
/// the marker and must not rely on the original value of that byte. The
/// rest of the packet is forwarded untouched, in encode order.
pub struct PacketStreamServer {
    ws: WsServer,
}

impl PacketStreamServer {
    pub fn new(bind_port: u16) -> Self {
        Self {
            ws: WsServer::new("PacketStreamServer", bind_port),
        }
    }

    /// Bind and start accepting viewers. Viewers never send, so inbound
    /// messages are ignored.
    pub fn start(&self) -> NetResult<()> {
        self.ws.start(Arc::new(|_| {}))
    }

    pub fn stop(&self) {
        self.ws.stop();
    }

    /// Mark and broadcast one encoder packet.
    pub fn consume_packet(&self, packet: &EncoderPacket) {
        let mut data = packet.data.to_vec();
        mark_keyframe(&mut data, packet.keyframe);
        self.ws.send_to_all(data);
    }

    pub fn viewer_count(&self) -> usize {
        self.ws.client_count()
    }

    #[cfg(test)]
    pub(crate) fn local_port(&self) -> Option<u16> {
        self.ws.local_port()
    }
}

fn mark_keyframe(data: &mut [u8], keyframe: bool) {
    if let Some(first) = data.first_mut() {
        *first = u8::from(!keyframe);
    }
}
