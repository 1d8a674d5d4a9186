//! Domain Layer - Core stream client state and types.
//!
//! This layer holds the pure state the connection manager mutates: no I/O
//! and no timers. Every type here is plain Rust with serialization support
//! where consumers need it.

/// Connection lifecycle state.
pub mod connection;

/// Desired vs. confirmed subscription tracking.
pub mod subscription;

/// Last-known full record per key with delta merging.
pub mod delta;

/// Inbound update batching window.
pub mod batching;

/// Events and topics published to consumers.
pub mod events;

/// Typed quote view over merged records.
pub mod quote;
