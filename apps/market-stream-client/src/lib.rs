#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Market Stream Client - Resilient Quote Subscription Client
//!
//! Maintains one persistent duplex connection to a streaming market-data
//! source and exposes a subscription and event API that hides the
//! connection's instability, bandwidth cost and burstiness from consumers.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure state, no I/O
//!   - `connection`: Connection state machine values
//!   - `subscription`: Desired vs. confirmed subscriptions
//!   - `delta`: Field-level merge of partial updates
//!   - `batching`: Per-key coalescing window
//!   - `events`: Events and topics published to consumers
//!   - `quote`: Typed view over a merged quote record
//!
//! - **Application**: Port definitions
//!   - `ports`: Transport connector trait, frames, close codes
//!
//! - **Infrastructure**: Adapters and the connection manager
//!   - `stream`: Client handle, connection manager, WebSocket connector,
//!     wire codec, compression, heartbeat, reconnect, outbound queue
//!   - `broadcast`: Event dispatcher
//!   - `config`: Environment configuration
//!   - `metrics`: Counters, gauges and Prometheus export
//!   - `health`: Health check HTTP endpoint
//!   - `telemetry`: Tracing subscriber and OpenTelemetry export
//!
//! # Data Flow
//!
//! ```text
//!                        ┌───────────────────────────── connection manager ─┐
//! WebSocket ─► decode ─► │ control ─► subscription registry / heartbeat     │
//!                        │ data    ─► delta store ─► batching window ─┐     │
//!                        └────────────────────────────────────────────┼─────┘
//!                                                                     ▼
//!                                             event dispatcher ─► handlers
//!                                                              └► broadcast receivers
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Connection, subscription, delta and batching state.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and the connection manager.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::batching::BatchEntry;
pub use domain::connection::ConnectionState;
pub use domain::delta::{DeltaRecord, Fields};
pub use domain::events::{EventTopic, StreamEvent, UnknownTopic};
pub use domain::quote::{Quote, QuoteError};
pub use domain::subscription::{Subscription, SubscriptionStats, SubscriptionStatus};

// Ports
pub use application::ports::{
    Connector, Frame, TransportCommand, TransportError, TransportEvent, TransportLink,
    close_codes,
};

// Client
pub use infrastructure::stream::{ClientError, SendOutcome, StreamClient, WebSocketConnector};

// Event dispatch
pub use infrastructure::broadcast::{EventDispatcher, HandlerId};

// Infrastructure config
pub use infrastructure::config::{
    BatchSettings, ClientConfig, CompressionSettings, ConfigError, ConnectionSettings,
    Credentials, HeartbeatSettings, QueueSettings, ReconnectSettings, ServerSettings,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::{MetricsSnapshot, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
