//! Drives a pool of remote renderers over persistent TCP connections.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use framecast_codec::CameraManager;
use framecast_proto::{
    decode_message, frame_message, payload_length, FrameRequest, RenderedFrame,
    LENGTH_PREFIX_BYTES,
};
use framecast_video::{FrameQueue, RawFrame};

use crate::{NetError, NetResult};

/// Delay between reconnection attempts to a dead renderer.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Consecutive connect failures between two log lines, so a renderer that
/// is simply not up yet does not flood the log.
const CONNECT_LOG_INTERVAL: u32 = 30;
/// Socket read/write timeout. Bounds how long a connection worker can go
/// without observing the shutdown flag.
const SOCKET_TIMEOUT: Duration = Duration::from_secs(1);
/// Frames between two receive-time debug reports.
const RECEIVE_STATS_INTERVAL: u64 = 100;

/// Everything a connection worker needs to turn camera state into queued
/// frames.
#[derive(Clone)]
pub struct DispatchContext {
    /// Process-wide frame index counter.
    pub frame_index: Arc<AtomicU64>,
    /// Camera state consulted for every request.
    pub cameras: Arc<CameraManager>,
    /// Destination for validated renderer replies.
    pub raw_queue: Arc<FrameQueue<RawFrame>>,
    /// Process-wide shutdown flag.
    pub shutdown: Arc<AtomicBool>,
}

/// Spawn one supervisor per renderer endpoint and block until every
/// supervisor has returned (which they do once shutdown is requested).
pub fn run_dispatcher(renderers: Vec<String>, ctx: DispatchContext) {
    info!(count = renderers.len(), "Connecting to renderers");

    let mut supervisors = Vec::with_capacity(renderers.len());
    for renderer in renderers {
        let ctx = ctx.clone();
        let spawned = thread::Builder::new()
            .name(format!("dispatch-{renderer}"))
            .spawn(move || supervise_endpoint(&renderer, &ctx));
        match spawned {
            Ok(handle) => supervisors.push(handle),
            Err(err) => error!(%err, "Failed to spawn renderer supervisor"),
        }
    }

    for supervisor in supervisors {
        let _ = supervisor.join();
    }
    info!("Closed all renderer connections");
}

/// Keep one endpoint connected until shutdown, reconnecting whenever the
/// connection loop returns.
fn supervise_endpoint(endpoint: &str, ctx: &DispatchContext) {
    let mut failures = 0u32;
    while !ctx.shutdown.load(Ordering::Relaxed) {
        let stream = match connect(endpoint) {
            Ok(stream) => stream,
            Err(err) => {
                failures += 1;
                if failures >= CONNECT_LOG_INTERVAL {
                    warn!(endpoint, %err, "Renderer still unreachable; retrying");
                    failures = 0;
                }
                thread::sleep(RECONNECT_DELAY);
                continue;
            }
        };

        info!(endpoint, "Connected to renderer");
        failures = 0;

        match connection_loop(stream, ctx) {
            Err(NetError::ShuttingDown) => {}
            Err(err) => warn!(endpoint, %err, "Renderer connection is dead; reconnecting"),
            Ok(()) => {}
        }
    }
    info!(endpoint, "Supervisor exiting");
}

fn connect(endpoint: &str) -> NetResult<TcpStream> {
    let addr = resolve(endpoint)?;
    let stream = TcpStream::connect_timeout(&addr, RECONNECT_DELAY)?;
    stream.set_read_timeout(Some(SOCKET_TIMEOUT))?;
    stream.set_write_timeout(Some(SOCKET_TIMEOUT))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

fn resolve(endpoint: &str) -> NetResult<SocketAddr> {
    endpoint
        .to_socket_addrs()
        .map_err(|_| NetError::InvalidEndpoint(endpoint.to_string()))?
        .next()
        .ok_or_else(|| NetError::InvalidEndpoint(endpoint.to_string()))
}

/// Request/response loop at the renderer's natural pace. Returns when the
/// connection drops, a protocol violation breaks the framing, or shutdown
/// is requested.
fn connection_loop(mut stream: TcpStream, ctx: &DispatchContext) -> NetResult<()> {
    let mut received = 0u64;
    let mut elapsed_ms = 0u128;

    loop {
        if ctx.shutdown.load(Ordering::Relaxed) {
            return Err(NetError::ShuttingDown);
        }

        let request = FrameRequest {
            index: ctx.frame_index.fetch_add(1, Ordering::Relaxed),
            camera: ctx.cameras.get(),
            is_left: false,
        };
        let framed = frame_message(&request)?;
        write_all(&mut stream, &framed, &ctx.shutdown)?;

        let started = Instant::now();
        let mut header = [0u8; LENGTH_PREFIX_BYTES];
        read_exact(&mut stream, &mut header, &ctx.shutdown)?;
        let length = payload_length(header)?;
        let mut payload = vec![0u8; length];
        read_exact(&mut stream, &mut payload, &ctx.shutdown)?;

        let reply: RenderedFrame = match decode_message(&payload) {
            Ok(reply) => reply,
            Err(err) => {
                // The framing stayed consistent; only this exchange is lost.
                warn!(%err, "Discarding undecodable renderer reply");
                continue;
            }
        };

        received += 1;
        elapsed_ms += started.elapsed().as_millis();
        if received == RECEIVE_STATS_INTERVAL {
            debug!(
                avg_ms = (elapsed_ms / received as u128) as u64,
                "Average frame receive time over the last 100 frames"
            );
            received = 0;
            elapsed_ms = 0;
        }

        let raw = match RawFrame::from_wire(reply) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%err, "Renderer reply failed validation");
                continue;
            }
        };

        if ctx.raw_queue.push(raw).is_err() {
            // The pipeline is saturated; real-time wins over completeness.
            debug!("Raw frame queue is full; dropping frame");
        }
    }
}

/// Write the whole buffer, looping past socket timeouts so the shutdown
/// flag stays observable.
fn write_all(stream: &mut TcpStream, buf: &[u8], shutdown: &AtomicBool) -> NetResult<()> {
    let mut sent = 0;
    while sent < buf.len() {
        if shutdown.load(Ordering::Relaxed) {
            return Err(NetError::ShuttingDown);
        }
        match stream.write(&buf[sent..]) {
            Ok(0) => return Err(NetError::ConnectionClosed),
            Ok(written) => sent += written,
            Err(err) if retryable(&err) => continue,
            Err(err) => return Err(NetError::Io(err)),
        }
    }
    Ok(())
}

/// Fill the whole buffer, looping past socket timeouts like [`write_all`].
fn read_exact(stream: &mut TcpStream, buf: &mut [u8], shutdown: &AtomicBool) -> NetResult<()> {
    let mut received = 0;
    while received < buf.len() {
        if shutdown.load(Ordering::Relaxed) {
            return Err(NetError::ShuttingDown);
        }
        match stream.read(&mut buf[received..]) {
            Ok(0) => return Err(NetError::ConnectionClosed),
            Ok(read) => received += read,
            Err(err) if retryable(&err) => continue,
            Err(err) => return Err(NetError::Io(err)),
        }
    }
    Ok(())
}

fn retryable(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::Interrupted
    )
}
