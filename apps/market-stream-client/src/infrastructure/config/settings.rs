//! Client Configuration Settings
//!
//! Configuration types for the stream client, loaded from environment
//! variables (`STREAM_CLIENT_*`). Unparsable numeric values fall back to
//! their defaults.

use std::time::Duration;

/// Per-message credentials attached to control frames.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self { token }
    }

    /// Get the token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// WebSocket URL of the stream source.
    pub url: String,
    /// Optional per-message credentials.
    pub credentials: Option<Credentials>,
}

/// Reconnection backoff settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectSettings {
    /// Initial reconnection delay.
    pub initial_delay: Duration,
    /// Maximum reconnection delay (before jitter).
    pub max_delay: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub multiplier: f64,
    /// Positive jitter as a fraction of the delay.
    pub jitter: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
            max_attempts: 10,
        }
    }
}

/// Heartbeat settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSettings {
    /// Heartbeat ping interval.
    pub ping_interval: Duration,
    /// Time to wait for a pong before forcing a reconnect.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
        }
    }
}

/// Inbound batching settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    /// Flush interval of a batch window.
    pub interval: Duration,
    /// Number of records that forces an immediate flush.
    pub max_size: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            max_size: 50,
        }
    }
}

/// Outbound compression settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionSettings {
    /// Whether outbound payloads may be compressed.
    pub enabled: bool,
    /// Minimum payload size that gets compressed.
    pub threshold: usize,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 1024,
        }
    }
}

/// Outbound queue settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    /// Maximum number of payloads queued while disconnected.
    pub capacity: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

/// Server port settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Endpoint settings.
    pub connection: ConnectionSettings,
    /// Reconnection settings.
    pub reconnect: ReconnectSettings,
    /// Heartbeat settings.
    pub heartbeat: HeartbeatSettings,
    /// Batching settings.
    pub batch: BatchSettings,
    /// Compression settings.
    pub compression: CompressionSettings,
    /// Outbound queue settings.
    pub queue: QueueSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Keys the binary subscribes to at startup.
    pub symbols: Vec<String>,
}

impl ClientConfig {
    /// Configuration with default settings for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            connection: ConnectionSettings {
                url: url.into(),
                credentials: None,
            },
            reconnect: ReconnectSettings::default(),
            heartbeat: HeartbeatSettings::default(),
            batch: BatchSettings::default(),
            compression: CompressionSettings::default(),
            queue: QueueSettings::default(),
            server: ServerSettings::default(),
            symbols: Vec::new(),
        }
    }

    /// Attach per-message credentials.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.connection.credentials = Some(Credentials::new(token.into()));
        self
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if `STREAM_CLIENT_URL` is missing or empty, or if
    /// `STREAM_CLIENT_TOKEN` is set but empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("STREAM_CLIENT_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("STREAM_CLIENT_URL".to_string()))?;

        if url.trim().is_empty() {
            return Err(ConfigError::EmptyValue("STREAM_CLIENT_URL".to_string()));
        }

        let credentials = match lookup("STREAM_CLIENT_TOKEN") {
            Some(token) if token.is_empty() => {
                return Err(ConfigError::EmptyValue("STREAM_CLIENT_TOKEN".to_string()));
            }
            Some(token) => Some(Credentials::new(token)),
            None => None,
        };

        let env = Env(&lookup);

        let reconnect = ReconnectSettings {
            initial_delay: env.duration_millis(
                "STREAM_CLIENT_RECONNECT_DELAY_INITIAL_MS",
                ReconnectSettings::default().initial_delay,
            ),
            max_delay: env.duration_millis(
                "STREAM_CLIENT_RECONNECT_DELAY_MAX_MS",
                ReconnectSettings::default().max_delay,
            ),
            multiplier: env.fraction(
                "STREAM_CLIENT_RECONNECT_DELAY_MULTIPLIER",
                ReconnectSettings::default().multiplier,
            ),
            jitter: env.fraction(
                "STREAM_CLIENT_RECONNECT_JITTER",
                ReconnectSettings::default().jitter,
            ),
            max_attempts: env.parse(
                "STREAM_CLIENT_MAX_RECONNECT_ATTEMPTS",
                ReconnectSettings::default().max_attempts,
            ),
        };

        let heartbeat = HeartbeatSettings {
            ping_interval: env.nonzero_secs(
                "STREAM_CLIENT_PING_INTERVAL_SECS",
                HeartbeatSettings::default().ping_interval,
            ),
            pong_timeout: env.nonzero_secs(
                "STREAM_CLIENT_PONG_TIMEOUT_SECS",
                HeartbeatSettings::default().pong_timeout,
            ),
        };

        let batch = BatchSettings {
            interval: env.duration_millis(
                "STREAM_CLIENT_BATCH_INTERVAL_MS",
                BatchSettings::default().interval,
            ),
            max_size: env.parse(
                "STREAM_CLIENT_MAX_BATCH_SIZE",
                BatchSettings::default().max_size,
            ),
        };

        let compression = CompressionSettings {
            enabled: env.flag(
                "STREAM_CLIENT_COMPRESSION_ENABLED",
                CompressionSettings::default().enabled,
            ),
            threshold: env.parse(
                "STREAM_CLIENT_COMPRESSION_THRESHOLD",
                CompressionSettings::default().threshold,
            ),
        };

        let queue = QueueSettings {
            capacity: env.parse(
                "STREAM_CLIENT_QUEUE_CAPACITY",
                QueueSettings::default().capacity,
            ),
        };

        let server = ServerSettings {
            health_port: env.parse(
                "STREAM_CLIENT_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let symbols = lookup("STREAM_CLIENT_SYMBOLS")
            .map(|s| parse_symbols(&s))
            .unwrap_or_default();

        Ok(Self {
            connection: ConnectionSettings { url, credentials },
            reconnect,
            heartbeat,
            batch,
            compression,
            queue,
            server,
            symbols,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

/// Split a comma separated key list, trimming and upper-casing entries.
fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .collect()
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        (self.0)(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Finite, non-negative float; anything else keeps `default`.
    fn fraction(&self, key: &str, default: f64) -> f64 {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(default)
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        (self.0)(key).map_or(default, |v| {
            match v.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => default,
            }
        })
    }

    fn nonzero_secs(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
