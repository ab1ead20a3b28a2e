//! Cancellable once-per-second countdowns used for the ready, round and turn
//! deadlines.
//!
//! A [`TimedEvent`] lives inside the state it drives (the host) and the
//! countdown task re-acquires the host's mutex for every tick. Starting or
//! cancelling bumps a generation counter, and the task checks that counter
//! under the same mutex before delivering anything, so a cancelled timer can
//! never fire into newer state: for every started instance exactly one of
//! "expired" or "cancelled" is observed.

use std::sync::Weak;
use std::time::Duration;

use hangman_core::protocol::TimerKind;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// State that owns timers and receives their callbacks.
pub trait TimerHost: Send + 'static {
    fn timer_mut(&mut self, kind: TimerKind) -> &mut TimedEvent;

    /// Called once per second while the timer is running, with the whole
    /// seconds left.
    fn on_timer_tick(&mut self, kind: TimerKind, remaining: u32);

    /// Called exactly once when a timer that was not cancelled runs out.
    fn on_timer_expired(&mut self, kind: TimerKind);
}

#[derive(Debug)]
pub struct TimedEvent {
    kind: TimerKind,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl TimedEvent {
    pub fn new(kind: TimerKind) -> Self {
        Self {
            kind,
            generation: 0,
            task: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    /// Start a countdown of `duration` (whole seconds, at least one).
    ///
    /// A running instance is cancelled first.
    pub fn start<H: TimerHost>(&mut self, host: Weak<Mutex<H>>, duration: Duration) {
        self.cancel();
        self.generation += 1;
        let seconds = u32::try_from(duration.as_secs()).unwrap_or(u32::MAX).max(1);
        let task = tokio::spawn(run_countdown(host, self.kind, self.generation, seconds));
        self.task = Some(task);
    }

    /// Stop the countdown. Returns whether anything was running; cancelling
    /// an idle, cancelled or expired timer is a no-op.
    pub fn cancel(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                self.generation += 1;
                task.abort();
                true
            }
            None => false,
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.task.is_some() && self.generation == generation
    }

    /// Claim the expiry for `generation`; fails if it was cancelled or
    /// replaced in the meantime.
    fn claim_expiry(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        // Dropping the handle detaches the (finishing) task.
        self.task = None;
        true
    }
}

impl Drop for TimedEvent {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_countdown<H: TimerHost>(
    host: Weak<Mutex<H>>,
    kind: TimerKind,
    generation: u64,
    seconds: u32,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    // The first tick completes immediately.
    ticker.tick().await;

    let mut remaining = seconds;
    loop {
        ticker.tick().await;
        remaining -= 1;

        let Some(shared) = host.upgrade() else {
            return;
        };
        let mut state = shared.lock().await;

        if remaining == 0 {
            if state.timer_mut(kind).claim_expiry(generation) {
                tracing::debug!(%kind, "timer expired");
                state.on_timer_expired(kind);
            }
            return;
        }
        if !state.timer_mut(kind).is_current(generation) {
            return;
        }
        state.on_timer_tick(kind, remaining);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Recorder {
        timer: TimedEvent,
        ticks: Vec<u32>,
        expired: usize,
    }

    impl TimerHost for Recorder {
        fn timer_mut(&mut self, _kind: TimerKind) -> &mut TimedEvent {
            &mut self.timer
        }

        fn on_timer_tick(&mut self, _kind: TimerKind, remaining: u32) {
            self.ticks.push(remaining);
        }

        fn on_timer_expired(&mut self, _kind: TimerKind) {
            self.expired += 1;
        }
    }

    fn recorder() -> Arc<Mutex<Recorder>> {
        Arc::new(Mutex::new(Recorder {
            timer: TimedEvent::new(TimerKind::Turn),
            ticks: Vec::new(),
            expired: 0,
        }))
    }

    async fn start(host: &Arc<Mutex<Recorder>>, secs: u64) {
        let weak = Arc::downgrade(host);
        host.lock()
            .await
            .timer
            .start(weak, Duration::from_secs(secs));
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_then_expires_once() {
        let host = recorder();
        start(&host, 3).await;

        tokio::time::sleep(Duration::from_millis(3500)).await;

        let state = host.lock().await;
        assert_eq!(state.ticks, vec![2, 1]);
        assert_eq!(state.expired, 1);
        assert!(!state.timer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_expires() {
        let host = recorder();
        start(&host, 3).await;
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(host.lock().await.timer.cancel());
        tokio::time::sleep(Duration::from_secs(5)).await;

        let mut state = host.lock().await;
        assert_eq!(state.ticks, vec![2]);
        assert_eq!(state.expired, 0);
        assert!(!state.timer.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_replaces_the_previous_instance() {
        let host = recorder();
        start(&host, 2).await;
        tokio::time::sleep(Duration::from_millis(1500)).await;
        start(&host, 2).await;

        tokio::time::sleep(Duration::from_secs(5)).await;

        let state = host.lock().await;
        assert_eq!(state.expired, 1);
        assert_eq!(state.ticks, vec![1, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_wins_against_an_expiry_waiting_on_the_lock() {
        let host = recorder();
        let weak = Arc::downgrade(&host);
        let mut state = host.lock().await;
        state.timer.start(weak, Duration::from_secs(1));

        // The countdown reaches zero while the host is held and blocks on the
        // lock; the cancel lands before it gets in.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(state.timer.cancel());
        drop(state);

        tokio::time::sleep(Duration::from_secs(3)).await;
        let state = host.lock().await;
        assert_eq!(state.expired, 0);
        assert!(!state.timer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_expiry_is_a_no_op() {
        let host = recorder();
        start(&host, 1).await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        let mut state = host.lock().await;
        assert_eq!(state.expired, 1);
        assert!(!state.timer.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_host_stops_the_countdown() {
        let host = recorder();
        start(&host, 2).await;
        let weak = Arc::downgrade(&host);
        drop(host);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(weak.upgrade().is_none());
    }
}
