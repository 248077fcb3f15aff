//! Renderer dispatch and viewer-facing WebSocket servers.
//!
//! The dispatcher side speaks the length-prefixed TCP protocol to remote
//! renderers on plain blocking sockets, one thread per connection. The
//! viewer side runs two WebSocket servers (packet fan-out and camera
//! control), each confining its async machinery to an internal runtime
//! behind a synchronous API.

mod camera_control;
mod dispatcher;
mod error;
mod packet_stream;
mod ws;

pub use camera_control::CameraControlServer;
pub use dispatcher::{run_dispatcher, DispatchContext};
pub use error::NetError;
pub use packet_stream::PacketStreamServer;

/// Result type for network operations.
pub type NetResult<T> = Result<T, NetError>;
