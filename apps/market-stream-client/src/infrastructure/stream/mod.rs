//! Streaming Connection
//!
//! Everything between the consumer API and the wire:
//!
//! - [`client`]: the public [`StreamClient`] handle
//! - `manager`: the connection manager actor behind it
//! - [`websocket`]: the WebSocket [`Connector`](crate::application::ports::Connector)
//! - [`messages`] and [`codec`]: wire messages and frame encoding
//! - [`compression`]: optional gzip for payloads
//! - [`heartbeat`] and [`reconnect`]: liveness and backoff
//! - [`queue`]: outbound messages held while disconnected
//! - [`timer`]: owned, cancel-on-drop timers

pub mod client;
pub mod codec;
pub mod compression;
pub mod heartbeat;
mod manager;
pub mod messages;
pub mod queue;
pub mod reconnect;
pub mod timer;
pub mod websocket;

pub use client::{ClientError, SendOutcome, StreamClient};
pub use codec::{CodecError, DecodedFrame, FrameCodec};
pub use compression::{CompressionError, Compressor, GzipCompressor, NoopCompressor};
pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor};
pub use messages::{ClientMessage, DataUpdate, ServerMessage};
pub use queue::{OutboundQueue, QueueFull};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use websocket::WebSocketConnector;
