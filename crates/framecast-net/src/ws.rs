//! Plain WebSocket fan-out server core.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{info, warn};

use crate::{NetError, NetResult};

/// How long the internal runtime gets to wind down on stop.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long `stop` waits for client tasks to flush their close frames
/// before the runtime is torn down.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Handles inbound binary messages from any connected client.
pub(crate) type MessageHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

type ClientMap = Arc<Mutex<HashMap<u64, UnboundedSender<Message>>>>;

/// Non-TLS WebSocket server that broadcasts binary messages to every
/// connected client. The async machinery lives on an internal runtime; the
/// public surface is synchronous so pipeline threads can call it directly.
pub(crate) struct WsServer {
    name: &'static str,
    bind_port: u16,
    clients: ClientMap,
    runtime: Mutex<Option<Runtime>>,
    local_port: Mutex<Option<u16>>,
}

impl WsServer {
    pub(crate) fn new(name: &'static str, bind_port: u16) -> Self {
        Self {
            name,
            bind_port,
            clients: Arc::new(Mutex::new(HashMap::new())),
            runtime: Mutex::new(None),
            local_port: Mutex::new(None),
        }
    }

    /// Bind and start accepting clients. Binding happens synchronously so
    /// a bad port fails startup instead of a background task.
    pub(crate) fn start(&self, handler: MessageHandler) -> NetResult<()> {
        let mut runtime_slot = self.runtime.lock();
        if runtime_slot.is_some() {
            return Err(NetError::AlreadyRunning(self.name));
        }

        let runtime = Runtime::new()?;
        let listener = runtime
            .block_on(TcpListener::bind(("0.0.0.0", self.bind_port)))
            .map_err(|source| NetError::Bind {
                endpoint: format!("0.0.0.0:{}", self.bind_port),
                source,
            })?;
        let local_port = listener.local_addr().map(|addr| addr.port()).ok();
        *self.local_port.lock() = local_port;

        info!(
            "{}({}): Listening for clients",
            self.name,
            local_port.unwrap_or(self.bind_port)
        );
        runtime.spawn(accept_loop(
            listener,
            Arc::clone(&self.clients),
            handler,
            self.name,
        ));
        *runtime_slot = Some(runtime);
        Ok(())
    }

    /// Close every client with `going_away` and stop the runtime.
    pub(crate) fn stop(&self) {
        let Some(runtime) = self.runtime.lock().take() else {
            return;
        };
        {
            let clients = self.clients.lock();
            for client in clients.values() {
                let _ = client.send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Away,
                    reason: "".into(),
                })));
            }
        }
        // Each client task deregisters itself once its close frame is on
        // the wire; wait for that before cancelling the tasks.
        let deadline = std::time::Instant::now() + CLOSE_FLUSH_TIMEOUT;
        while !self.clients.lock().is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
        info!("{}({}): Server stopped", self.name, self.bind_port);
    }

    /// Send one binary message to every connected client. Per-client order
    /// follows the call order here.
    pub(crate) fn send_to_all(&self, data: Vec<u8>) {
        let clients = self.clients.lock();
        for client in clients.values() {
            let _ = client.send(Message::Binary(data.clone()));
        }
    }

    pub(crate) fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// The port actually bound, once running. Differs from the requested
    /// port only when binding to port 0.
    pub(crate) fn local_port(&self) -> Option<u16> {
        *self.local_port.lock()
    }
}

impl Drop for WsServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn accept_loop(
    listener: TcpListener,
    clients: ClientMap,
    handler: MessageHandler,
    name: &'static str,
) {
    let mut next_id: u64 = 0;
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!("{name}: Accept failed: {err}");
                continue;
            }
        };
        let websocket = match tokio_tungstenite::accept_async(stream).await {
            Ok(websocket) => websocket,
            Err(err) => {
                warn!("{name}: Handshake with {peer} failed: {err}");
                continue;
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let id = next_id;
        next_id += 1;
        clients.lock().insert(id, outbound_tx);
        info!("{name}: Accepted client connection");

        tokio::spawn(client_task(
            websocket,
            outbound_rx,
            Arc::clone(&clients),
            id,
            Arc::clone(&handler),
            name,
        ));
    }
}

async fn client_task(
    websocket: WebSocketStream<TcpStream>,
    mut outbound: UnboundedReceiver<Message>,
    clients: ClientMap,
    id: u64,
    handler: MessageHandler,
    name: &'static str,
) {
    let (mut sink, mut stream) = websocket.split();
    loop {
        tokio::select! {
            message = outbound.recv() => {
                let Some(message) = message else { break };
                let closing = matches!(message, Message::Close(_));
                if sink.send(message).await.is_err() || closing {
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Binary(payload))) => handler(&payload),
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {} // ping/pong are answered by tungstenite
                }
            }
        }
    }
    if clients.lock().remove(&id).is_some() {
        warn!("{name}: Client connection closed");
    }
}
