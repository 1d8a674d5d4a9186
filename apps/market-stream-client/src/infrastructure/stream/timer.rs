//! Owned Timers
//!
//! A [`TimerHandle`] is a spawned sleep that posts a [`TimerEvent`] back to
//! the connection manager. Dropping the handle cancels it. Every timer gets a
//! process-unique id so an event already in flight when its timer was
//! replaced can be recognised and ignored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// What a timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Heartbeat ping interval (repeating).
    PingInterval,
    /// Heartbeat pong deadline.
    PongTimeout,
    /// Batch window flush.
    BatchFlush,
    /// Backoff before a reconnect attempt.
    Reconnect,
}

/// A fired timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    /// Timer purpose.
    pub kind: TimerKind,
    /// Id of the handle that fired.
    pub id: u64,
}

/// Cancel-on-drop timer.
#[derive(Debug)]
pub struct TimerHandle {
    kind: TimerKind,
    id: u64,
    cancel: CancellationToken,
}

impl TimerHandle {
    /// Fire once after `delay`.
    #[must_use]
    pub fn once(
        kind: TimerKind,
        delay: Duration,
        tx: mpsc::UnboundedSender<TimerEvent>,
    ) -> Self {
        let handle = Self::allocate(kind);
        let event = TimerEvent { kind, id: handle.id };
        let cancel = handle.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let _ = tx.send(event);
                }
            }
        });

        handle
    }

    /// Fire every `period`, first after one full period. Missed ticks are
    /// skipped. A zero period never fires.
    #[must_use]
    pub fn repeating(
        kind: TimerKind,
        period: Duration,
        tx: mpsc::UnboundedSender<TimerEvent>,
    ) -> Self {
        let handle = Self::allocate(kind);
        if period.is_zero() {
            tracing::warn!(?kind, "Zero period, repeating timer disabled");
            return handle;
        }

        let event = TimerEvent { kind, id: handle.id };
        let cancel = handle.cancel.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        handle
    }

    fn allocate(kind: TimerKind) -> Self {
        Self {
            kind,
            id: NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed),
            cancel: CancellationToken::new(),
        }
    }

    /// Timer id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Timer purpose.
    #[must_use]
    pub const fn kind(&self) -> TimerKind {
        self.kind
    }

    /// Check if `event` came from this timer.
    #[must_use]
    pub fn matches(&self, event: TimerEvent) -> bool {
        self.kind == event.kind && self.id == event.id
    }

    /// Stop the timer.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_pending, task};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn once_fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let timer = TimerHandle::once(TimerKind::BatchFlush, Duration::from_millis(100), tx);

        tokio::time::sleep(Duration::from_millis(99)).await;
        {
            let mut next = task::spawn(rx.recv());
            assert_pending!(next.poll());
        }

        let event = rx.recv().await.unwrap();
        assert!(timer.matches(event));
        assert_eq!(event.kind, TimerKind::BatchFlush);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let timer = TimerHandle::once(TimerKind::Reconnect, Duration::from_secs(1), tx);
        drop(timer);

        tokio::time::sleep(Duration::from_secs(5)).await;
        // Sender moved into the cancelled task is gone
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn repeating_fires_every_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = Instant::now();

        let timer = TimerHandle::repeating(TimerKind::PingInterval, Duration::from_secs(30), tx);

        for n in 1..=3u32 {
            let event = rx.recv().await.unwrap();
            assert!(timer.matches(event));
            let elapsed = start.elapsed();
            assert!(elapsed >= Duration::from_secs(30) * n);
            assert!(elapsed < Duration::from_secs(30) * n + Duration::from_millis(10));
        }

        timer.cancel();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _timer = TimerHandle::repeating(TimerKind::PingInterval, Duration::ZERO, tx);

        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn ids_are_unique() {
        let a = TimerHandle::allocate(TimerKind::PongTimeout);
        let b = TimerHandle::allocate(TimerKind::PongTimeout);

        assert_ne!(a.id(), b.id());
        assert!(!a.matches(TimerEvent {
            kind: TimerKind::PongTimeout,
            id: b.id(),
        }));
    }
}
