// ABOUTME: Barrier tracking writes accepted for the log but not yet durable.
// ABOUTME: Atomic counter with an async wait-for-zero.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;

/// Counts events accepted for writing that have not yet been durably
/// persisted. Producers call `add` at enqueue time; the writer task calls
/// `done` once the event is on disk (or will never be). `wait` suspends
/// until the count drains to zero.
///
/// Every `add` must be paired with exactly one `done`, whichever side of
/// the queue the event dies on.
#[derive(Debug, Default)]
pub struct PendingWrites {
    count: AtomicU64,
    drained: Notify,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one accepted write.
    pub fn add(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Record one completed write.
    pub fn done(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }

    pub fn outstanding(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Suspend until every accepted write has completed. Returns
    /// immediately if none are outstanding.
    pub async fn wait(&self) {
        loop {
            // Register interest before checking the count so a done()
            // landing between the check and the await is not lost.
            let drained = self.drained.notified();
            if self.count.load(Ordering::Acquire) == 0 {
                return;
            }
            drained.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn wait_returns_immediately_when_nothing_pending() {
        let pending = PendingWrites::new();
        pending.wait().await;
    }

    #[tokio::test]
    async fn wait_blocks_until_all_writes_complete() {
        let pending = Arc::new(PendingWrites::new());
        pending.add();
        pending.add();

        let waiter = {
            let pending = Arc::clone(&pending);
            tokio::spawn(async move { pending.wait().await })
        };

        pending.done();
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished(), "one write still outstanding");

        pending.done();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait should complete")
            .expect("waiter task should not panic");
    }

    #[tokio::test]
    async fn counter_tracks_outstanding_writes() {
        let pending = PendingWrites::new();
        assert_eq!(pending.outstanding(), 0);
        pending.add();
        pending.add();
        assert_eq!(pending.outstanding(), 2);
        pending.done();
        assert_eq!(pending.outstanding(), 1);
    }
}
