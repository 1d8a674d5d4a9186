//! Metrics Module
//!
//! Passive counters and gauges updated by the connection manager, readable
//! at any time as a [`MetricsSnapshot`]. Every update is mirrored to the
//! `metrics` facade so a Prometheus recorder (installed by the binary) sees
//! the same numbers.
//!
//! # Metrics Categories
//!
//! - **Messages**: frames and bytes sent and received
//! - **Connection**: state, reconnect attempts, errors by kind
//! - **Subscriptions**: active subscription count
//! - **Batching**: queued outbound messages, buffered inbound updates
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use serde::Serialize;

use crate::domain::connection::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Idempotent: later calls return the handle installed by the first.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Message counters
    describe_counter!(
        "market_stream_messages_sent_total",
        "Total frames sent to the stream source"
    );
    describe_counter!(
        "market_stream_bytes_sent_total",
        "Total payload bytes sent to the stream source"
    );
    describe_counter!(
        "market_stream_messages_received_total",
        "Total frames received from the stream source"
    );
    describe_counter!(
        "market_stream_bytes_received_total",
        "Total payload bytes received from the stream source"
    );

    // Connection
    describe_gauge!(
        "market_stream_connection_state",
        "Connection state (0 disconnected, 1 connecting, 2 connected, 3 paused)"
    );
    describe_counter!(
        "market_stream_reconnects_total",
        "Total reconnection attempts"
    );
    describe_counter!("market_stream_errors_total", "Total errors by kind");

    // Subscription and batching gauges
    describe_gauge!(
        "market_stream_subscriptions",
        "Number of confirmed subscriptions"
    );
    describe_gauge!(
        "market_stream_queued_messages",
        "Outbound messages waiting for a connection"
    );
    describe_gauge!(
        "market_stream_batched_updates",
        "Inbound updates buffered in the current batch window"
    );
    describe_histogram!(
        "market_stream_batch_size",
        "Number of updates delivered per batch flush"
    );
}

// =============================================================================
// Labels
// =============================================================================

/// Metric labels for error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport open failed.
    Connect,
    /// Transport reported an error.
    Transport,
    /// Inbound frame or element could not be decoded.
    Decode,
    /// Outbound payload rejected by a full queue.
    QueueFull,
    /// Consumer event handler panicked.
    Handler,
}

impl ErrorKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Transport => "transport",
            Self::Decode => "decode",
            Self::QueueFull => "queue_full",
            Self::Handler => "handler",
        }
    }
}

// =============================================================================
// Collector
// =============================================================================

/// Point-in-time copy of the client's metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Connection state.
    pub state: ConnectionState,
    /// Confirmed subscriptions.
    pub subscription_count: u64,
    /// Outbound messages waiting for a connection.
    pub queued_message_count: u64,
    /// Inbound updates in the current batch window.
    pub batched_update_count: u64,
    /// Frames sent.
    pub messages_sent: u64,
    /// Payload bytes sent.
    pub bytes_sent: u64,
    /// Frames received.
    pub messages_received: u64,
    /// Payload bytes received.
    pub bytes_received: u64,
    /// Reconnection attempts.
    pub reconnect_count: u64,
    /// Errors of any kind.
    pub error_count: u64,
}

/// Lock-free metrics store shared between the connection manager and the
/// client handles.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    state: AtomicU8,
    subscriptions: AtomicU64,
    queued: AtomicU64,
    batched: AtomicU64,
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
    messages_received: AtomicU64,
    bytes_received: AtomicU64,
    reconnects: AtomicU64,
    errors: AtomicU64,
}

impl MetricsCollector {
    /// Create a zeroed collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame sent.
    pub fn record_sent(&self, bytes: usize) {
        let bytes = bytes as u64;
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        counter!("market_stream_messages_sent_total").increment(1);
        counter!("market_stream_bytes_sent_total").increment(bytes);
    }

    /// Record a frame received.
    pub fn record_received(&self, bytes: usize) {
        let bytes = bytes as u64;
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
        counter!("market_stream_messages_received_total").increment(1);
        counter!("market_stream_bytes_received_total").increment(bytes);
    }

    /// Record a reconnection attempt.
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        counter!("market_stream_reconnects_total").increment(1);
    }

    /// Record an error.
    pub fn record_error(&self, kind: ErrorKind) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        counter!("market_stream_errors_total", "kind" => kind.as_str()).increment(1);
    }

    /// Record the size of a flushed batch.
    pub fn record_batch(&self, size: usize) {
        #[allow(clippy::cast_precision_loss)]
        histogram!("market_stream_batch_size").record(size as f64);
    }

    /// Update the connection state gauge.
    pub fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
        gauge!("market_stream_connection_state").set(f64::from(state.as_u8()));
    }

    /// Update the confirmed subscription gauge.
    pub fn set_subscriptions(&self, count: usize) {
        self.subscriptions.store(count as u64, Ordering::Relaxed);
        #[allow(clippy::cast_precision_loss)]
        gauge!("market_stream_subscriptions").set(count as f64);
    }

    /// Update the queued outbound message gauge.
    pub fn set_queued(&self, count: usize) {
        self.queued.store(count as u64, Ordering::Relaxed);
        #[allow(clippy::cast_precision_loss)]
        gauge!("market_stream_queued_messages").set(count as f64);
    }

    /// Update the buffered inbound update gauge.
    pub fn set_batched(&self, count: usize) {
        self.batched.store(count as u64, Ordering::Relaxed);
        #[allow(clippy::cast_precision_loss)]
        gauge!("market_stream_batched_updates").set(count as f64);
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Copy every counter and gauge.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            state: self.state(),
            subscription_count: self.subscriptions.load(Ordering::Relaxed),
            queued_message_count: self.queued.load(Ordering::Relaxed),
            batched_update_count: self.batched.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            reconnect_count: self.reconnects.load(Ordering::Relaxed),
            error_count: self.errors.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter and gauge. Only `destroy()` calls this.
    pub fn reset(&self) {
        for value in [
            &self.subscriptions,
            &self.queued,
            &self.batched,
            &self.messages_sent,
            &self.bytes_sent,
            &self.messages_received,
            &self.bytes_received,
            &self.reconnects,
            &self.errors,
        ] {
            value.store(0, Ordering::Relaxed);
        }
        self.set_state(ConnectionState::Disconnected);
    }
}

// =============================================================================
// Tests
// =============================================================================
