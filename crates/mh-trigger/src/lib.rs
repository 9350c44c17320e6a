//! In-process wake signal from the ingress adapter to the worker cohort.
//!
//! `TriggerChannel` is deliberately dumb: it carries no payload, just a
//! "something might be claimable" token. A full channel means the cohort
//! is already saturated and a dropped signal costs nothing, because every
//! worker also polls on a timeout (spec.md §4.2, §9 "no signal, no
//! starvation").

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

/// Why a call to [`TriggerChannel::wait`] returned.
///
/// Both variants proceed into the worker's work step; the distinction is
/// observability only (spec.md §4.3 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Triggered,
    TimedOut,
}

/// A bounded, single-producer/multi-consumer signal. Cloning shares the
/// same underlying channel: every clone's `signal()` feeds the same queue,
/// and every clone's `wait()` competes for the same tokens, so exactly one
/// waiter is released per signal no matter how many worker handles exist.
#[derive(Clone)]
pub struct TriggerChannel {
    tx: mpsc::Sender<()>,
    rx: Arc<Mutex<mpsc::Receiver<()>>>,
}

impl TriggerChannel {
    /// `capacity` should be at least the worker count — one slot per
    /// worker is sufficient headroom (spec.md §4.2).
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Enqueue one wake token. If the channel is full, the signal is
    /// dropped silently — workers already have more work queued than they
    /// can immediately claim, and the polling fallback covers the rest.
    pub fn signal(&self) {
        if self.tx.try_send(()).is_err() {
            tracing::trace!("trigger channel full; signal dropped, polling fallback covers it");
        }
    }

    /// Wait until either a token is available or `timeout` elapses.
    ///
    /// Only one concurrent caller can be receiving at a time (the shared
    /// receiver is behind a mutex); a delivered token always goes to
    /// exactly one waiter, never broadcast to all of them.
    pub async fn wait(&self, timeout: Duration) -> Wake {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            received = rx.recv() => match received {
                Some(()) => Wake::Triggered,
                // All senders dropped; treat like a timeout so callers
                // fall back to polling rather than panicking.
                None => Wake::TimedOut,
            },
            _ = tokio::time::sleep(timeout) => Wake::TimedOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn signal_then_wait_is_triggered() {
        let tc = TriggerChannel::new(4);
        tc.signal();
        let wake = tc.wait(Duration::from_millis(200)).await;
        assert_eq!(wake, Wake::Triggered);
    }

    #[tokio::test]
    async fn wait_without_signal_times_out() {
        let tc = TriggerChannel::new(4);
        let wake = tc.wait(Duration::from_millis(20)).await;
        assert_eq!(wake, Wake::TimedOut);
    }

    #[tokio::test]
    async fn excess_signals_collapse_harmlessly() {
        let tc = TriggerChannel::new(1);
        tc.signal();
        tc.signal(); // dropped, capacity 1
        tc.signal(); // dropped

        assert_eq!(tc.wait(Duration::from_millis(50)).await, Wake::Triggered);
        // No more tokens queued: the extra signals really did collapse.
        assert_eq!(tc.wait(Duration::from_millis(20)).await, Wake::TimedOut);
    }

    #[tokio::test]
    async fn exactly_one_waiter_is_released_per_token() {
        let tc = TriggerChannel::new(4);
        let a = tc.clone();
        let b = tc.clone();

        let handle_a = tokio::spawn(async move { a.wait(Duration::from_millis(200)).await });
        let handle_b = tokio::spawn(async move { b.wait(Duration::from_millis(200)).await });

        // Give both tasks a chance to start waiting before signaling once.
        tokio::time::sleep(Duration::from_millis(20)).await;
        tc.signal();

        let (res_a, res_b) = tokio::join!(handle_a, handle_b);
        let wakes = [res_a.unwrap(), res_b.unwrap()];
        let triggered_count = wakes.iter().filter(|w| **w == Wake::Triggered).count();
        assert_eq!(triggered_count, 1, "exactly one waiter should see Triggered");
    }
}
