//! Single-shot reconnect timer.
//!
//! The scheduler is either idle or armed with exactly one pending timer.
//! Expiry is delivered as [`LoopEvent::ReconnectDue`] on the manager's loop;
//! a generation counter lets the manager drop expiries that raced with a
//! cancel.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::transport::LoopEvent;

pub(crate) struct ReconnectScheduler {
    delay: Duration,
    generation: u64,
    pending: Option<(u64, CancellationToken)>,
}

impl ReconnectScheduler {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: 0,
            pending: None,
        }
    }

    pub(crate) fn delay(&self) -> Duration {
        self.delay
    }

    pub(crate) fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Arms the timer. Returns `false` without spawning anything if a timer
    /// is already pending or no tokio runtime is running.
    pub(crate) fn arm(&mut self, tx: &mpsc::UnboundedSender<LoopEvent>) -> bool {
        if self.pending.is_some() {
            trace!("reconnect already armed");
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime, reconnect not armed");
            return false;
        };

        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let cancel = CancellationToken::new();
        self.pending = Some((generation, cancel.clone()));

        let delay = self.delay;
        let tx = tx.clone();
        runtime.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    trace!(generation, "reconnect timer cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(LoopEvent::ReconnectDue { generation });
                }
            }
        });

        debug!(delay_ms = delay.as_millis() as u64, "reconnect armed");
        true
    }

    /// Cancels the pending timer. Returns `true` if one was armed.
    pub(crate) fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some((generation, token)) => {
                token.cancel();
                debug!(generation, "reconnect cancelled");
                true
            }
            None => false,
        }
    }

    /// Consumes an expiry. Returns `true` only if `generation` is the timer
    /// that is still pending; the scheduler is idle afterwards.
    pub(crate) fn fire(&mut self, generation: u64) -> bool {
        let current = self.pending.as_ref().is_some_and(|(g, _)| *g == generation);
        if current {
            self.pending = None;
        } else {
            trace!(generation, "ignoring stale reconnect expiry");
        }
        current
    }
}

impl Drop for ReconnectScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn due_generation(event: LoopEvent) -> u64 {
        match event {
            LoopEvent::ReconnectDue { generation } => generation,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn arm_twice_keeps_one_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sched = ReconnectScheduler::new(Duration::from_secs(3));

        assert!(sched.arm(&tx));
        assert!(!sched.arm(&tx));
        assert!(sched.is_armed());

        let generation = due_generation(rx.recv().await.unwrap());
        assert!(sched.fire(generation));
        assert!(!sched.is_armed());

        // Only one expiry was ever sent.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_expiry() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sched = ReconnectScheduler::new(Duration::from_secs(3));

        assert!(sched.arm(&tx));
        assert!(sched.cancel());
        assert!(!sched.cancel());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_expiry_is_ignored() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut sched = ReconnectScheduler::new(Duration::from_secs(3));

        sched.arm(&tx);
        sched.cancel();
        sched.arm(&tx);

        // Generation 1 was cancelled; only generation 2 counts.
        assert!(!sched.fire(1));
        assert!(sched.is_armed());
        assert!(sched.fire(2));
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_waits_for_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sched = ReconnectScheduler::new(Duration::from_secs(3));
        sched.arm(&tx);

        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn arm_without_runtime_stays_idle() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut sched = ReconnectScheduler::new(Duration::from_secs(3));

        assert!(!sched.arm(&tx));
        assert!(!sched.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_pending_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let mut sched = ReconnectScheduler::new(Duration::from_secs(3));
            sched.arm(&tx);
        }
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }
}
