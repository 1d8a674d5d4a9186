//! Application Layer - Port definitions.
//!
//! This layer defines the contracts through which the connection manager
//! talks to the outside world.

/// Port interfaces for external systems (duplex transport).
pub mod ports;
