//! Heartbeat Monitor
//!
//! Detects connections that are open at the transport level but no longer
//! delivering anything. Two owned timers drive it: a repeating ping interval
//! and a one-shot pong deadline, both alive only while the connection is
//! `Connected`.
//!
//! The monitor does no I/O itself. The connection manager feeds it timer
//! events and pongs and acts on what it returns.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;

use super::timer::{TimerEvent, TimerHandle, TimerKind};

/// Default interval between pings.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Default time to wait for a pong.
pub const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between ping messages.
    pub ping_interval: Duration,
    /// Timeout for pong response before connection is considered dead.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
            pong_timeout: DEFAULT_PONG_TIMEOUT,
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            ping_interval,
            pong_timeout,
        }
    }

    /// Create configuration from `HeartbeatSettings`.
    #[must_use]
    pub const fn from_settings(settings: &crate::HeartbeatSettings) -> Self {
        Self {
            ping_interval: settings.ping_interval,
            pong_timeout: settings.pong_timeout,
        }
    }
}

/// Ping/pong liveness state machine.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    timers: mpsc::UnboundedSender<TimerEvent>,
    ping: Option<TimerHandle>,
    pong: Option<TimerHandle>,
    outstanding: Vec<i64>,
}

impl HeartbeatMonitor {
    /// Create a stopped monitor that posts its timer events to `timers`.
    #[must_use]
    pub const fn new(config: HeartbeatConfig, timers: mpsc::UnboundedSender<TimerEvent>) -> Self {
        Self {
            config,
            timers,
            ping: None,
            pong: None,
            outstanding: Vec::new(),
        }
    }

    /// Start (or restart) the ping cycle. The first ping goes out after one
    /// full interval.
    pub fn start(&mut self) {
        self.stop();
        self.ping = Some(TimerHandle::repeating(
            TimerKind::PingInterval,
            self.config.ping_interval,
            self.timers.clone(),
        ));
    }

    /// Cancel both timers and forget outstanding pings.
    pub fn stop(&mut self) {
        self.ping = None;
        self.pong = None;
        self.outstanding.clear();
    }

    /// Check if the ping cycle is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.ping.is_some()
    }

    /// Check if a pong is outstanding.
    #[must_use]
    pub const fn awaiting_pong(&self) -> bool {
        self.pong.is_some()
    }

    /// Handle a ping-interval tick.
    ///
    /// Returns the timestamp to put in the ping frame, or `None` if the event
    /// is from a cancelled cycle. Arms the pong deadline unless one is
    /// already running, so a stalled connection cannot postpone it.
    pub fn on_ping_tick(&mut self, event: TimerEvent) -> Option<i64> {
        if !self.ping.as_ref().is_some_and(|t| t.matches(event)) {
            return None;
        }

        let timestamp = Utc::now().timestamp_millis();
        self.outstanding.push(timestamp);

        if self.pong.is_none() {
            self.pong = Some(TimerHandle::once(
                TimerKind::PongTimeout,
                self.config.pong_timeout,
                self.timers.clone(),
            ));
        }

        Some(timestamp)
    }

    /// Handle a pong frame.
    ///
    /// A pong without a timestamp matches any outstanding ping. Returns
    /// `true` if the pong cleared the deadline.
    pub fn on_pong(&mut self, timestamp: Option<i64>) -> bool {
        if self.pong.is_none() {
            return false;
        }

        let matched = timestamp.is_none_or(|ts| self.outstanding.contains(&ts));
        if matched {
            self.pong = None;
            self.outstanding.clear();
        }

        matched
    }

    /// Handle a pong-deadline event. Returns `true` if the connection should
    /// be treated as stale.
    pub fn on_pong_timeout(&mut self, event: TimerEvent) -> bool {
        if !self.pong.as_ref().is_some_and(|t| t.matches(event)) {
            return false;
        }

        tracing::warn!(
            timeout_secs = self.config.pong_timeout.as_secs(),
            outstanding = self.outstanding.len(),
            "Heartbeat timeout detected"
        );
        self.stop();
        true
    }
}
