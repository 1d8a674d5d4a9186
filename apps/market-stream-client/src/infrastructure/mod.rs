//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, and the connection manager that drives
//! them.

/// Connection manager, client handle and wire protocol.
pub mod stream;

/// Event dispatch to consumers.
pub mod broadcast;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Client metrics and Prometheus instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
