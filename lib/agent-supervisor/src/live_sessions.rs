//! A "sync-group" counter (spec.md §9 Design Notes: "sync-group
//! counters (live-session wait) are first-class requirements"): tracks
//! how many Capture Sessions are currently running so
//! `PodSupervisor::shutdown` can wait for the last one to exit before
//! returning, mirroring a `sync.WaitGroup`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Default)]
pub struct LiveSessionCounter {
    count: AtomicUsize,
    zero: Notify,
}

impl LiveSessionCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrements the counter and wakes any waiter once it reaches zero.
    pub fn decrement(&self) {
        let previous = self.count.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "live session counter underflowed");
        if previous == 1 {
            self.zero.notify_waiters();
        }
    }

    pub fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Blocks until the counter reaches zero. Safe to call concurrently
    /// with `decrement`: if the count is already zero by the time this
    /// is polled, it returns immediately without waiting on a
    /// notification that will never come.
    pub async fn wait_for_zero(&self) {
        loop {
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            let notified = self.zero.notified();
            // Re-check after subscribing but before awaiting, closing the
            // race where the last `decrement` fires between the load
            // above and the subscription below.
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_returns_immediately_when_already_zero() {
        let counter = LiveSessionCounter::new();
        counter.wait_for_zero().await;
    }

    #[tokio::test]
    async fn wait_unblocks_after_last_decrement() {
        let counter = LiveSessionCounter::new();
        counter.increment();
        counter.increment();

        let waiter = Arc::clone(&counter);
        let handle = tokio::spawn(async move {
            waiter.wait_for_zero().await;
        });

        tokio::task::yield_now().await;
        counter.decrement();
        assert!(!handle.is_finished());
        counter.decrement();

        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("wait_for_zero should unblock")
            .unwrap();
    }
}
