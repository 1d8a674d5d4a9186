//! Shared test fixtures: an in-memory connector whose server side is driven
//! by the test.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use market_stream_client::{
    ClientConfig, Connector, Frame, StreamEvent, TransportCommand, TransportError,
    TransportEvent, TransportLink,
};

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(120);

/// Config pointing at the in-memory server.
pub fn test_config() -> ClientConfig {
    ClientConfig::new("ws://stream.test/quotes")
}

// =============================================================================
// Connector
// =============================================================================

/// Connector that hands each opened transport to a [`TestServer`].
#[derive(Debug)]
pub struct ChannelConnector {
    accepted: mpsc::UnboundedSender<ServerConn>,
    refusing: AtomicBool,
    connects: AtomicUsize,
    delay: Mutex<Duration>,
}

impl ChannelConnector {
    pub fn new() -> (Arc<Self>, TestServer) {
        let (accepted, incoming) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            accepted,
            refusing: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            delay: Mutex::new(Duration::ZERO),
        });
        (connector, TestServer { incoming })
    }

    /// Make every following connection attempt fail.
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Delay every following connection attempt.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Number of connection attempts so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn connect(&self, _url: &str) -> Result<TransportLink, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();

        let _ = self.accepted.send(ServerConn {
            to_client,
            from_client,
        });

        Ok(TransportLink { outbound, inbound })
    }
}

// =============================================================================
// Server Side
// =============================================================================

/// Accepts connections opened through a [`ChannelConnector`].
#[derive(Debug)]
pub struct TestServer {
    incoming: mpsc::UnboundedReceiver<ServerConn>,
}

impl TestServer {
    /// Wait for the next connection.
    pub async fn accept(&mut self) -> ServerConn {
        tokio::time::timeout(WAIT, self.incoming.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }

    /// Check if a connection is waiting without blocking.
    pub fn try_accept(&mut self) -> Option<ServerConn> {
        self.incoming.try_recv().ok()
    }
}

/// Server end of one connection.
#[derive(Debug)]
pub struct ServerConn {
    to_client: mpsc::UnboundedSender<TransportEvent>,
    from_client: mpsc::UnboundedReceiver<TransportCommand>,
}

impl ServerConn {
    /// Push a JSON text frame to the client.
    pub fn send_json(&self, value: &Value) {
        self.send_text(&value.to_string());
    }

    /// Push a raw text frame to the client.
    pub fn send_text(&self, text: &str) {
        let _ = self
            .to_client
            .send(TransportEvent::Frame(Frame::Text(text.to_string())));
    }

    /// Push a raw binary frame to the client.
    pub fn send_binary(&self, bytes: Vec<u8>) {
        let _ = self
            .to_client
            .send(TransportEvent::Frame(Frame::Binary(bytes)));
    }

    /// Report a transport error to the client.
    pub fn fail(&self, message: &str) {
        let _ = self
            .to_client
            .send(TransportEvent::Error(message.to_string()));
    }

    /// Close the connection from the server side.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.send(TransportEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    /// Next command from the client.
    pub async fn recv(&mut self) -> TransportCommand {
        tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client dropped the transport")
    }

    /// Next frame from the client, decoded as JSON. Binary frames are
    /// inflated first.
    pub async fn recv_json(&mut self) -> Value {
        match self.recv().await {
            TransportCommand::Send(frame) => frame_json(&frame),
            TransportCommand::Close { code, reason } => {
                panic!("expected a frame, client closed with {code} ({reason})")
            }
        }
    }

    /// Next raw frame from the client.
    pub async fn recv_frame(&mut self) -> Frame {
        match self.recv().await {
            TransportCommand::Send(frame) => frame,
            TransportCommand::Close { code, reason } => {
                panic!("expected a frame, client closed with {code} ({reason})")
            }
        }
    }

    /// Skip frames until the client closes; returns the close code and reason.
    pub async fn expect_close(&mut self) -> (u16, String) {
        loop {
            if let TransportCommand::Close { code, reason } = self.recv().await {
                return (code, reason);
            }
        }
    }

    /// Frames already sent by the client, without waiting.
    pub fn drain_json(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(command) = self.from_client.try_recv() {
            if let TransportCommand::Send(frame) = command {
                frames.push(frame_json(&frame));
            }
        }
        frames
    }
}

/// Decode a client frame as JSON.
pub fn frame_json(frame: &Frame) -> Value {
    match frame {
        Frame::Text(text) => serde_json::from_str(text).unwrap(),
        Frame::Binary(bytes) => {
            let mut text = String::new();
            GzDecoder::new(bytes.as_slice())
                .read_to_string(&mut text)
                .unwrap();
            serde_json::from_str(&text).unwrap()
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Wait for the first event matching `predicate`, skipping the rest.
pub async fn wait_for<F>(events: &mut broadcast::Receiver<StreamEvent>, predicate: F) -> StreamEvent
where
    F: Fn(&StreamEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Events already published, without waiting.
pub fn drain_events(events: &mut broadcast::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
