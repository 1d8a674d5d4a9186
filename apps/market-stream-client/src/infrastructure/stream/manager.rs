//! Connection Manager
//!
//! The actor behind [`StreamClient`](super::StreamClient). A single tokio
//! task owns the connection state, the subscription registry, the delta
//! store, the batching window, the outbound queue and every timer, and
//! processes three inputs strictly one at a time:
//!
//! - **Commands** from client handles
//! - **Internal events** from the transport open task and the per-connection
//!   pump (decoded frames, errors, close)
//! - **Timer events** from owned [`TimerHandle`]s
//!
//! Each transport open bumps a generation counter. Internal events carry the
//! generation they were produced for, and anything from a superseded
//! connection is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::client::{ClientError, SendOutcome};
use super::codec::{CodecError, DecodedFrame, FrameCodec};
use super::heartbeat::{HeartbeatConfig, HeartbeatMonitor};
use super::messages::{ClientMessage, ServerMessage};
use super::queue::OutboundQueue;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::timer::{TimerEvent, TimerHandle, TimerKind};
use crate::application::ports::{
    Connector, Frame, TransportCommand, TransportError, TransportEvent, TransportLink,
    close_codes,
};
use crate::domain::batching::{BatchWindow, PushOutcome};
use crate::domain::connection::ConnectionState;
use crate::domain::delta::{DeltaRecord, DeltaStore};
use crate::domain::events::StreamEvent;
use crate::domain::subscription::{Subscription, SubscriptionRegistry};
use crate::infrastructure::broadcast::EventDispatcher;
use crate::infrastructure::config::ClientConfig;
use crate::infrastructure::metrics::{ErrorKind, MetricsCollector};

// =============================================================================
// Shared State
// =============================================================================

/// State readable from client handles without a round trip to the actor.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) metrics: MetricsCollector,
    pub(crate) dispatcher: EventDispatcher,
    pub(crate) destroyed: AtomicBool,
}

impl Shared {
    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Dispatch an event, counting each handler that panicked as an error.
    fn emit(&self, event: &StreamEvent) {
        for _ in 0..self.dispatcher.emit(event) {
            self.metrics.record_error(ErrorKind::Handler);
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

/// Requests from client handles.
#[derive(Debug)]
pub(crate) enum Command {
    Connect {
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Disconnect,
    Subscribe {
        keys: Vec<String>,
    },
    Unsubscribe {
        keys: Vec<String>,
    },
    Pause,
    Resume,
    SetVisible(bool),
    SetOnline(bool),
    Send {
        payload: Value,
        reply: oneshot::Sender<Result<SendOutcome, ClientError>>,
    },
    Subscriptions {
        reply: oneshot::Sender<Vec<Subscription>>,
    },
    Delta {
        key: String,
        reply: oneshot::Sender<Option<DeltaRecord>>,
    },
    ClearDeltas {
        reply: oneshot::Sender<()>,
    },
    Destroy {
        reply: oneshot::Sender<()>,
    },
}

/// Events produced off the actor for one connection generation.
#[derive(Debug)]
enum Internal {
    Opened {
        generation: u64,
        result: Result<TransportLink, TransportError>,
    },
    Inbound {
        generation: u64,
        bytes: usize,
        decoded: Result<DecodedFrame, CodecError>,
    },
    TransportError {
        generation: u64,
        message: String,
    },
    Closed {
        generation: u64,
        code: u16,
        reason: String,
    },
}

// =============================================================================
// Actor
// =============================================================================

pub(crate) struct ConnectionManager {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    codec: FrameCodec,
    shared: Arc<Shared>,

    state: ConnectionState,
    generation: u64,
    connection_id: Option<Uuid>,
    transport: Option<mpsc::UnboundedSender<TransportCommand>>,
    connect_waiter: Option<oneshot::Sender<Result<(), ClientError>>>,

    registry: SubscriptionRegistry,
    deltas: DeltaStore,
    window: BatchWindow,
    batch_timer: Option<TimerHandle>,
    queue: OutboundQueue,

    heartbeat: HeartbeatMonitor,
    reconnect: ReconnectPolicy,
    reconnect_timer: Option<TimerHandle>,

    visible: bool,
    online: bool,

    timer_tx: mpsc::UnboundedSender<TimerEvent>,
    internal_tx: mpsc::UnboundedSender<Internal>,
}

impl ConnectionManager {
    /// Spawn the actor. It runs until [`Command::Destroy`] or until every
    /// command sender is dropped.
    pub(crate) fn spawn(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        codec: FrameCodec,
        shared: Arc<Shared>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let heartbeat = HeartbeatMonitor::new(
            HeartbeatConfig::from_settings(&config.heartbeat),
            timer_tx.clone(),
        );
        let reconnect = ReconnectPolicy::new(ReconnectConfig::from_settings(&config.reconnect));
        let window = BatchWindow::new(config.batch.max_size);
        let queue = OutboundQueue::new(config.queue.capacity);

        let manager = Self {
            config,
            connector,
            codec,
            shared,
            state: ConnectionState::Disconnected,
            generation: 0,
            connection_id: None,
            transport: None,
            connect_waiter: None,
            registry: SubscriptionRegistry::new(),
            deltas: DeltaStore::new(),
            window,
            batch_timer: None,
            queue,
            heartbeat,
            reconnect,
            reconnect_timer: None,
            visible: true,
            online: true,
            timer_tx,
            internal_tx,
        };

        tokio::spawn(manager.run(commands, internal_rx, timer_rx));
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
        mut timers: mpsc::UnboundedReceiver<TimerEvent>,
    ) {
        tracing::debug!(url = %self.config.connection.url, "Connection manager started");

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        tracing::debug!("All client handles dropped");
                        self.teardown(close_codes::GOING_AWAY, "client dropped");
                        break;
                    };
                    if let Command::Destroy { reply } = command {
                        self.teardown(close_codes::GOING_AWAY, "client destroyed");
                        let _ = reply.send(());
                        break;
                    }
                    self.handle_command(command);
                }
                Some(event) = internal.recv() => self.handle_internal(event),
                Some(event) = timers.recv() => self.handle_timer(event),
            }
        }

        tracing::debug!("Connection manager stopped");
    }

    // =========================================================================
    // Commands
    // =========================================================================

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => self.connect(reply),
            Command::Disconnect => self.disconnect(),
            Command::Subscribe { keys } => self.subscribe(&keys),
            Command::Unsubscribe { keys } => self.unsubscribe(&keys),
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
            Command::SetVisible(visible) => {
                self.visible = visible;
                if visible {
                    self.resume();
                } else {
                    self.pause();
                }
            }
            Command::SetOnline(online) => self.set_online(online),
            Command::Send { payload, reply } => {
                let _ = reply.send(self.send(payload));
            }
            Command::Subscriptions { reply } => {
                let _ = reply.send(self.registry.snapshot());
            }
            Command::Delta { key, reply } => {
                let _ = reply.send(self.deltas.get(&key));
            }
            Command::ClearDeltas { reply } => {
                self.deltas.clear();
                let _ = reply.send(());
            }
            // Handled by the run loop
            Command::Destroy { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn connect(&mut self, reply: oneshot::Sender<Result<(), ClientError>>) {
        match self.state {
            ConnectionState::Connected | ConnectionState::Paused => {
                let _ = reply.send(Ok(()));
            }
            ConnectionState::Connecting => {
                let _ = reply.send(Err(ClientError::ConnectionInProgress));
            }
            ConnectionState::Disconnected => {
                // An explicit connect replaces any scheduled attempt
                self.reconnect_timer = None;
                if !self.reconnect.should_retry() {
                    self.reconnect.reset();
                }
                self.connect_waiter = Some(reply);
                self.begin_connect();
            }
        }
    }

    fn begin_connect(&mut self) {
        self.generation += 1;
        self.connection_id = None;
        self.set_state(ConnectionState::Connecting);

        let generation = self.generation;
        let url = self.config.connection.url.clone();
        let connector = Arc::clone(&self.connector);
        let internal_tx = self.internal_tx.clone();

        tracing::info!(url = %url, generation, "Connecting");

        tokio::spawn(async move {
            let result = connector.connect(&url).await;
            let _ = internal_tx.send(Internal::Opened { generation, result });
        });
    }

    fn disconnect(&mut self) {
        self.reconnect_timer = None;
        self.reconnect.reset();

        match self.state {
            ConnectionState::Disconnected => {}
            ConnectionState::Connecting => {
                self.generation += 1;
                self.set_state(ConnectionState::Disconnected);
                self.fail_waiter(ClientError::NotConnected);
            }
            ConnectionState::Connected | ConnectionState::Paused => {
                self.drop_connection(close_codes::NORMAL, "client disconnect");
            }
        }
    }

    fn set_online(&mut self, online: bool) {
        if self.online == online {
            return;
        }
        self.online = online;

        if online {
            tracing::info!("Network online");
            self.reconnect.reset();
            if self.state == ConnectionState::Disconnected {
                self.reconnect_timer = None;
                self.begin_connect();
            }
            return;
        }

        tracing::info!("Network offline");
        self.shared.emit(&StreamEvent::Offline);
        self.reconnect_timer = None;

        match self.state {
            ConnectionState::Disconnected => {}
            ConnectionState::Connecting => {
                self.generation += 1;
                self.set_state(ConnectionState::Disconnected);
                self.fail_waiter(ClientError::NotConnected);
            }
            ConnectionState::Connected | ConnectionState::Paused => {
                self.drop_connection(close_codes::GOING_OFFLINE, "going offline");
            }
        }
    }

    /// Close the open transport on the client's initiative. The close frame
    /// the pump will report belongs to a superseded generation, so the
    /// `disconnected` event is emitted here instead.
    fn drop_connection(&mut self, code: u16, reason: &str) {
        self.close_transport(code, reason);
        self.generation += 1;
        self.heartbeat.stop();
        self.set_state(ConnectionState::Disconnected);
        self.shared.emit(&StreamEvent::Disconnected {
            code,
            reason: reason.to_string(),
        });
    }

    fn subscribe(&mut self, keys: &[String]) {
        let added = self.registry.add(keys);
        if added.is_empty() {
            return;
        }

        tracing::debug!(keys = ?added, "Subscription requested");
        if self.state == ConnectionState::Connected {
            self.flush_pending_subscribe();
        }
        self.update_subscription_gauge();
    }

    fn unsubscribe(&mut self, keys: &[String]) {
        let removed = self.registry.remove(keys);
        if removed.is_empty() {
            return;
        }

        for key in &removed {
            self.deltas.remove(key);
        }

        tracing::debug!(keys = ?removed, "Unsubscription requested");
        if self.state == ConnectionState::Connected {
            self.send_control(&ClientMessage::Unsubscribe { keys: removed });
        }
        self.update_subscription_gauge();
    }

    fn pause(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }

        let keys = self.registry.tracked_keys();
        self.send_control(&ClientMessage::Pause { keys: keys.clone() });
        self.heartbeat.stop();
        self.set_state(ConnectionState::Paused);

        tracing::info!(keys = keys.len(), "Stream paused");
        self.shared.emit(&StreamEvent::Paused { keys });
    }

    fn resume(&mut self) {
        if self.state != ConnectionState::Paused {
            return;
        }

        let keys = self.registry.tracked_keys();
        self.send_control(&ClientMessage::Resume { keys: keys.clone() });
        self.set_state(ConnectionState::Connected);
        self.heartbeat.start();
        self.flush_pending_subscribe();
        self.flush_pending_unsubscribe();
        self.flush_queue();

        tracing::info!(keys = keys.len(), "Stream resumed");
        self.shared.emit(&StreamEvent::Resumed { keys });
    }

    fn send(&mut self, payload: Value) -> Result<SendOutcome, ClientError> {
        if self.state == ConnectionState::Connected {
            self.flush_queue();

            if self.queue.is_empty() {
                match self.codec.encode_payload(&payload) {
                    Ok(frame) => {
                        if self.transmit(frame) {
                            return Ok(SendOutcome::Sent);
                        }
                    }
                    Err(e) => {
                        // Not retryable, so it is not queued either
                        tracing::warn!(error = %e, "Dropping unencodable outbound payload");
                        self.shared.metrics.record_error(ErrorKind::Transport);
                        return Ok(SendOutcome::Sent);
                    }
                }
            }
        }

        match self.queue.push(payload) {
            Ok(len) => {
                self.shared.metrics.set_queued(len);
                Ok(SendOutcome::Queued)
            }
            Err(full) => {
                tracing::warn!(capacity = full.capacity, "Outbound queue full");
                self.shared.metrics.record_error(ErrorKind::QueueFull);
                Err(ClientError::QueueFull(full.capacity))
            }
        }
    }

    // =========================================================================
    // Internal Events
    // =========================================================================

    fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::Opened { generation, result } => {
                if generation != self.generation || self.state != ConnectionState::Connecting {
                    tracing::debug!(generation, "Discarding superseded transport");
                    return;
                }
                match result {
                    Ok(link) => self.on_open(link),
                    Err(e) => self.on_open_failed(&e),
                }
            }
            Internal::Inbound {
                generation,
                bytes,
                decoded,
            } => {
                if generation == self.generation {
                    self.on_inbound(bytes, decoded);
                }
            }
            Internal::TransportError {
                generation,
                message,
            } => {
                if generation == self.generation {
                    tracing::warn!(
                        connection_id = ?self.connection_id,
                        error = %message,
                        "Transport error"
                    );
                    self.shared.metrics.record_error(ErrorKind::Transport);
                    self.shared.emit(&StreamEvent::Error { message });
                }
            }
            Internal::Closed {
                generation,
                code,
                reason,
            } => {
                if generation == self.generation && self.state.is_open() {
                    self.on_close(code, reason);
                }
            }
        }
    }

    fn on_open(&mut self, link: TransportLink) {
        let connection_id = Uuid::new_v4();
        self.connection_id = Some(connection_id);
        self.transport = Some(link.outbound);
        spawn_pump(
            self.generation,
            link.inbound,
            self.codec.clone(),
            self.internal_tx.clone(),
        );

        self.set_state(ConnectionState::Connected);
        self.reconnect.reset();
        self.reconnect_timer = None;
        self.heartbeat.start();

        self.registry.mark_all_pending();
        self.flush_pending_subscribe();
        self.flush_queue();
        self.update_subscription_gauge();

        tracing::info!(%connection_id, "Connected");
        self.shared.emit(&StreamEvent::Connected {
            connection_id: connection_id.to_string(),
        });

        if let Some(waiter) = self.connect_waiter.take() {
            let _ = waiter.send(Ok(()));
        }

        if !self.visible {
            self.pause();
        }
    }

    fn on_open_failed(&mut self, error: &TransportError) {
        let message = error.to_string();
        tracing::warn!(error = %message, "Connection attempt failed");

        self.set_state(ConnectionState::Disconnected);
        self.shared.metrics.record_error(ErrorKind::Connect);
        self.shared.emit(&StreamEvent::Error {
            message: message.clone(),
        });
        self.shared.emit(&StreamEvent::Disconnected {
            code: close_codes::ABNORMAL,
            reason: message.clone(),
        });
        self.fail_waiter(ClientError::ConnectFailed(message));

        if self.online {
            self.schedule_reconnect();
        }
    }

    fn on_close(&mut self, code: u16, reason: String) {
        tracing::info!(
            connection_id = ?self.connection_id,
            code,
            reason = %reason,
            "Connection closed"
        );

        self.transport = None;
        self.heartbeat.stop();
        self.set_state(ConnectionState::Disconnected);
        self.shared.emit(&StreamEvent::Disconnected { code, reason });

        if self.online {
            self.schedule_reconnect();
        }
    }

    fn on_inbound(&mut self, bytes: usize, decoded: Result<DecodedFrame, CodecError>) {
        self.shared.metrics.record_received(bytes);

        let decoded = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(error = %e, bytes, "Dropping undecodable frame");
                self.shared.metrics.record_error(ErrorKind::Decode);
                return;
            }
        };

        for rejected in &decoded.rejected {
            tracing::debug!(error = %rejected, "Dropping malformed message");
            self.shared.metrics.record_error(ErrorKind::Decode);
        }

        for message in decoded.messages {
            self.on_message(message);
        }
    }

    fn on_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Subscribed { keys } => {
                let confirmed = self.registry.confirm_subscribed(&keys, Utc::now());
                self.update_subscription_gauge();
                if !confirmed.is_empty() {
                    tracing::debug!(keys = ?confirmed, "Subscription confirmed");
                    self.shared.emit(&StreamEvent::Subscribed { keys: confirmed });
                }
            }
            ServerMessage::Unsubscribed { keys } => {
                let confirmed = self.registry.confirm_unsubscribed(&keys);
                if !confirmed.is_empty() {
                    tracing::debug!(keys = ?confirmed, "Unsubscription confirmed");
                    self.shared.emit(&StreamEvent::Unsubscribed { keys: confirmed });
                }
            }
            ServerMessage::Pong { timestamp } => {
                if self.heartbeat.on_pong(timestamp) {
                    tracing::trace!(?timestamp, "Pong received");
                }
            }
            ServerMessage::Data(update) => {
                let record = self.deltas.merge_update(&update.key, update.fields);
                match self.window.push(record) {
                    PushOutcome::Opened => {
                        self.batch_timer = Some(TimerHandle::once(
                            TimerKind::BatchFlush,
                            self.config.batch.interval,
                            self.timer_tx.clone(),
                        ));
                    }
                    PushOutcome::Buffered => {}
                    PushOutcome::Full => self.flush_batch(),
                }
                self.shared.metrics.set_batched(self.window.len());
            }
        }
    }

    // =========================================================================
    // Timers
    // =========================================================================

    fn handle_timer(&mut self, event: TimerEvent) {
        match event.kind {
            TimerKind::PingInterval => {
                if let Some(timestamp) = self.heartbeat.on_ping_tick(event) {
                    self.send_control(&ClientMessage::Ping { timestamp });
                }
            }
            TimerKind::PongTimeout => {
                if self.heartbeat.on_pong_timeout(event) {
                    self.force_reconnect();
                }
            }
            TimerKind::BatchFlush => {
                if self.batch_timer.as_ref().is_some_and(|t| t.matches(event)) {
                    self.flush_batch();
                }
            }
            TimerKind::Reconnect => {
                if !self.reconnect_timer.as_ref().is_some_and(|t| t.matches(event)) {
                    return;
                }
                self.reconnect_timer = None;
                if self.state != ConnectionState::Disconnected || !self.online {
                    return;
                }

                self.reconnect.record_attempt();
                self.shared.metrics.record_reconnect();
                self.begin_connect();
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        let Some(delay) = self.reconnect.next_delay() else {
            let attempts = self.reconnect.attempt_count();
            tracing::error!(attempts, "Max reconnection attempts reached");
            self.shared.emit(&StreamEvent::MaxReconnectAttemptsReached { attempts });
            return;
        };

        let attempt = self.reconnect.attempt_count() + 1;
        tracing::info!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Scheduling reconnect"
        );

        self.reconnect_timer = Some(TimerHandle::once(
            TimerKind::Reconnect,
            delay,
            self.timer_tx.clone(),
        ));
        self.shared.emit(&StreamEvent::Reconnecting { attempt, delay });
    }

    /// Replace a stale connection right away, without backoff.
    fn force_reconnect(&mut self) {
        tracing::warn!(connection_id = ?self.connection_id, "Forcing reconnect");

        self.drop_connection(close_codes::HEARTBEAT_TIMEOUT, "heartbeat timeout");
        self.shared.metrics.record_reconnect();

        if self.online {
            self.begin_connect();
        }
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    fn flush_pending_subscribe(&mut self) {
        let keys = self.registry.take_pending_subscribe();
        if !keys.is_empty() {
            self.send_control(&ClientMessage::Subscribe { keys });
        }
    }

    fn flush_pending_unsubscribe(&mut self) {
        let keys = self.registry.pending_unsubscribe();
        if !keys.is_empty() {
            self.send_control(&ClientMessage::Unsubscribe { keys });
        }
    }

    fn flush_queue(&mut self) {
        if self.queue.is_empty() {
            return;
        }

        let queued = self.queue.len();
        while self.state == ConnectionState::Connected {
            let Some(payload) = self.queue.pop() else {
                break;
            };

            let frame = match self.codec.encode_payload(&payload) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping unencodable queued payload");
                    self.shared.metrics.record_error(ErrorKind::Transport);
                    continue;
                }
            };

            if !self.transmit(frame) {
                self.queue.push_front(payload);
                break;
            }
        }

        tracing::debug!(
            flushed = queued - self.queue.len(),
            remaining = self.queue.len(),
            "Flushed outbound queue"
        );
        self.shared.metrics.set_queued(self.queue.len());
    }

    fn send_control(&mut self, message: &ClientMessage) {
        match self.codec.encode_control(message) {
            Ok(frame) => {
                if self.transmit(frame) {
                    tracing::trace!(kind = message.kind(), "Sent control message");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, kind = message.kind(), "Failed to encode control message");
            }
        }
    }

    /// Hand a frame to the transport. Returns `false` if there is no live
    /// transport to take it.
    fn transmit(&self, frame: Frame) -> bool {
        let Some(transport) = &self.transport else {
            return false;
        };

        let bytes = frame.len();
        if transport.send(TransportCommand::Send(frame)).is_err() {
            tracing::debug!("Transport writer gone");
            return false;
        }

        self.shared.metrics.record_sent(bytes);
        true
    }

    fn close_transport(&mut self, code: u16, reason: &str) {
        if let Some(transport) = self.transport.take() {
            let _ = transport.send(TransportCommand::Close {
                code,
                reason: reason.to_string(),
            });
        }
    }

    // =========================================================================
    // Batching
    // =========================================================================

    fn flush_batch(&mut self) {
        self.batch_timer = None;

        let flush = self.window.take();
        if flush.is_empty() {
            return;
        }

        let shared = &self.shared;
        for batch in flush.keys {
            shared.emit(&StreamEvent::KeyUpdate {
                key: batch.key.clone(),
                record: batch.latest.clone(),
            });
            shared.emit(&StreamEvent::Update {
                key: batch.key,
                latest: batch.latest,
                window: batch.entries,
            });
        }
        shared.emit(&StreamEvent::BatchComplete { count: flush.total });

        self.shared.metrics.record_batch(flush.total);
        self.shared.metrics.set_batched(0);
    }

    // =========================================================================
    // State
    // =========================================================================

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "Connection state changed");
        }
        self.state = state;
        self.shared.metrics.set_state(state);
    }

    fn fail_waiter(&mut self, error: ClientError) {
        if let Some(waiter) = self.connect_waiter.take() {
            let _ = waiter.send(Err(error));
        }
    }

    fn update_subscription_gauge(&self) {
        self.shared
            .metrics
            .set_subscriptions(self.registry.active_count());
    }

    fn teardown(&mut self, code: u16, reason: &str) {
        tracing::info!(reason, "Shutting down stream client");

        self.shared.destroyed.store(true, Ordering::Release);
        self.reconnect_timer = None;
        self.batch_timer = None;
        self.heartbeat.stop();
        self.close_transport(code, reason);
        self.generation += 1;
        self.fail_waiter(ClientError::Destroyed);

        self.registry.clear();
        self.deltas.clear();
        self.window.clear();
        self.queue.clear();
        self.state = ConnectionState::Disconnected;

        self.shared.dispatcher.clear();
        self.shared.metrics.reset();
    }
}

/// Read one connection's transport events, decode frames off the actor and
/// forward the results tagged with `generation`.
fn spawn_pump(
    generation: u64,
    mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
    codec: FrameCodec,
    internal_tx: mpsc::UnboundedSender<Internal>,
) {
    tokio::spawn(async move {
        while let Some(event) = inbound.recv().await {
            let internal = match event {
                TransportEvent::Frame(frame) => Internal::Inbound {
                    generation,
                    bytes: frame.len(),
                    decoded: codec.decode(&frame),
                },
                TransportEvent::Error(message) => Internal::TransportError {
                    generation,
                    message,
                },
                TransportEvent::Closed { code, reason } => {
                    let _ = internal_tx.send(Internal::Closed {
                        generation,
                        code,
                        reason,
                    });
                    return;
                }
            };

            if internal_tx.send(internal).is_err() {
                return;
            }
        }

        let _ = internal_tx.send(Internal::Closed {
            generation,
            code: close_codes::ABNORMAL,
            reason: "transport dropped".to_string(),
        });
    });
}
