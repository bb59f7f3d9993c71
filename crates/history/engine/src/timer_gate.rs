//! Resettable alarm for the timer queue processor.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Holds the next wake-up deadline.
///
/// [`TimerGate::update`] only ever moves the deadline earlier and wakes a
/// sleeping waiter when it does. A wake issued while nobody waits is kept as a
/// permit, so an update racing with the start of a sleep is never lost.
#[derive(Debug, Default)]
pub struct TimerGate {
    next: Mutex<Option<DateTime<Utc>>>,
    notify: Notify,
}

impl TimerGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the wake-up to `deadline` if it is earlier and wake the waiter so
    /// it re-arms. Returns whether it moved.
    pub fn update(&self, deadline: DateTime<Utc>) -> bool {
        if !self.schedule(deadline) {
            return false;
        }
        self.notify.notify_one();
        true
    }

    /// Move the wake-up to `deadline` if it is earlier, without waking anyone.
    /// Used by the waiter itself when it re-arms after a poll.
    pub fn schedule(&self, deadline: DateTime<Utc>) -> bool {
        let mut next = self.next.lock();
        if next.is_some_and(|current| current <= deadline) {
            return false;
        }
        *next = Some(deadline);
        true
    }

    /// Wake the waiter now without changing the deadline.
    pub fn fire(&self) {
        self.notify.notify_one();
    }

    /// Forget the current deadline. Called before the processor lists due tasks.
    pub fn clear(&self) {
        *self.next.lock() = None;
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        *self.next.lock()
    }

    /// Sleep until the deadline (as seen from `now`), a wake-up, or `max_wait`.
    ///
    /// Cancel-safe: dropping the future leaves the gate unchanged.
    pub async fn wait(&self, now: DateTime<Utc>, max_wait: Duration) {
        let sleep_for = match self.next_deadline() {
            Some(deadline) => (deadline - now)
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(max_wait),
            None => max_wait,
        };
        if sleep_for.is_zero() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = self.notify.notified() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn wake_before_wait_is_not_lost() {
        let gate = TimerGate::new();
        let now = Utc::now();
        gate.schedule(now + chrono::Duration::seconds(30));
        gate.fire();

        let started = tokio::time::Instant::now();
        gate.wait(now, Duration::from_secs(60)).await;
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[test]
    fn update_only_moves_earlier() {
        let gate = TimerGate::new();
        let now = Utc::now();
        assert!(gate.update(now + chrono::Duration::seconds(10)));
        assert!(!gate.update(now + chrono::Duration::seconds(20)));
        assert!(gate.update(now + chrono::Duration::seconds(5)));
        assert_eq!(gate.next_deadline(), Some(now + chrono::Duration::seconds(5)));

        gate.clear();
        assert_eq!(gate.next_deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_until_deadline() {
        let gate = TimerGate::new();
        let now = Utc::now();
        gate.schedule(now + chrono::Duration::seconds(3));

        let started = tokio::time::Instant::now();
        gate.wait(now, Duration::from_secs(60)).await;
        let slept = started.elapsed();
        assert!(slept >= Duration::from_secs(3) && slept < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_deadline_wakes_sleeper() {
        let gate = Arc::new(TimerGate::new());
        let now = Utc::now();
        gate.schedule(now + chrono::Duration::seconds(30));

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let started = tokio::time::Instant::now();
                gate.wait(now, Duration::from_secs(60)).await;
                started.elapsed()
            })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(gate.update(now + chrono::Duration::seconds(2)));

        let slept = waiter.await.unwrap();
        assert!(slept >= Duration::from_secs(1));
        assert!(slept < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn past_deadline_returns_immediately() {
        let gate = TimerGate::new();
        let now = Utc::now();
        gate.schedule(now - chrono::Duration::seconds(1));

        let started = tokio::time::Instant::now();
        gate.wait(now, Duration::from_secs(60)).await;
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
