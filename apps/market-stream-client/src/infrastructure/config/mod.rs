//! Configuration Module
//!
//! Configuration loading for the stream client.

mod settings;

pub use settings::{
    BatchSettings, ClientConfig, CompressionSettings, ConfigError, ConnectionSettings,
    Credentials, HeartbeatSettings, QueueSettings, ReconnectSettings, ServerSettings,
};
