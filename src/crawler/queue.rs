//! Work queue shared between the execution manager and the crawlers
//!
//! A FIFO of crawl targets with at-most-once delivery. Besides the queued
//! items it counts outstanding work (queued plus in flight), which is what the
//! execution manager looks at to tell a drained cycle from one that is still
//! running.

use crate::crawler::types::CrawlTarget;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Result of offering a target to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    /// The queue is at capacity, the target was dropped
    Rejected,
    /// The queue has been closed
    Closed,
}

#[derive(Debug)]
pub struct WorkQueue {
    items: Mutex<VecDeque<CrawlTarget>>,
    capacity: Option<usize>,
    closed: AtomicBool,
    notify: Notify,
    outstanding: AtomicUsize,
    rejected: AtomicU64,
}

impl WorkQueue {
    /// Creates a queue holding at most `capacity` targets, `None` for unbounded
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity: capacity.filter(|c| *c > 0),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
            outstanding: AtomicUsize::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    fn lock_items(&self) -> MutexGuard<'_, VecDeque<CrawlTarget>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a target, never blocking
    pub fn push(&self, target: CrawlTarget) -> PushOutcome {
        let mut items = self.lock_items();

        if self.closed.load(Ordering::Acquire) {
            return PushOutcome::Closed;
        }

        if let Some(capacity) = self.capacity {
            if items.len() >= capacity {
                drop(items);
                self.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "Work queue full ({} items), dropping target {}",
                    capacity,
                    target.node_id
                );
                return PushOutcome::Rejected;
            }
        }

        items.push_back(target);
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        drop(items);

        self.notify.notify_one();
        PushOutcome::Accepted
    }

    /// Takes the next target, waiting until one is available
    ///
    /// Returns `None` once the queue is closed. A popped target counts as
    /// outstanding until [`WorkQueue::complete`] is called for it.
    pub async fn pop(&self) -> Option<CrawlTarget> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a push in between is not missed
            notified.as_mut().enable();

            {
                let mut items = self.lock_items();
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
                if let Some(target) = items.pop_front() {
                    let more = !items.is_empty();
                    drop(items);
                    if more {
                        // Pass the wakeup on, another waiter may be parked
                        self.notify.notify_one();
                    }
                    return Some(target);
                }
            }

            notified.await;
        }
    }

    /// Marks one popped target as fully processed
    pub fn complete(&self) {
        let _ = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Returns a guard that calls [`WorkQueue::complete`] when dropped
    pub fn completion(&self) -> Completion<'_> {
        Completion { queue: self }
    }

    /// Closes the queue and discards whatever is still queued
    ///
    /// Every pending and future `pop` returns `None`. Returns the number of
    /// discarded targets.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut items = self.lock_items();
            self.closed.store(true, Ordering::Release);
            let discarded = items.len();
            items.clear();
            discarded
        };

        for _ in 0..discarded {
            self.complete();
        }
        self.notify.notify_waiters();

        if discarded > 0 {
            tracing::info!("Work queue closed, discarded {} queued targets", discarded);
        }
        discarded
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of targets waiting to be picked up
    pub fn len(&self) -> usize {
        self.lock_items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_items().is_empty()
    }

    /// Queued plus in-flight targets
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// True when nothing is queued and nothing is being crawled
    pub fn is_idle(&self) -> bool {
        self.outstanding() == 0
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Targets dropped because the queue was full
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Marks a popped target complete when dropped, even if the crawl was cancelled
#[derive(Debug)]
pub struct Completion<'a> {
    queue: &'a WorkQueue,
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        self.queue.complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    fn target(id: &str) -> CrawlTarget {
        CrawlTarget::new(id, "dsp", format!("http://{}.example.com", id))
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = WorkQueue::unbounded();
        for id in ["a", "b", "c"] {
            assert_eq!(queue.push(target(id)), PushOutcome::Accepted);
        }

        assert_eq!(queue.pop().await.unwrap().node_id, "a");
        assert_eq!(queue.pop().await.unwrap().node_id, "b");
        assert_eq!(queue.pop().await.unwrap().node_id, "c");
    }

    #[tokio::test]
    async fn test_outstanding_tracks_in_flight_work() {
        let queue = WorkQueue::unbounded();
        queue.push(target("a"));
        queue.push(target("b"));
        assert_eq!(queue.outstanding(), 2);

        let _a = queue.pop().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.outstanding(), 2);

        queue.complete();
        assert_eq!(queue.outstanding(), 1);

        {
            let _b = queue.pop().await.unwrap();
            let _done = queue.completion();
            assert!(queue.is_empty());
            assert!(!queue.is_idle());
        }
        assert!(queue.is_idle());

        // Never goes below zero
        queue.complete();
        assert_eq!(queue.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_bounded_queue_rejects_when_full() {
        let queue = WorkQueue::new(Some(2));
        assert_eq!(queue.push(target("a")), PushOutcome::Accepted);
        assert_eq!(queue.push(target("b")), PushOutcome::Accepted);
        assert_eq!(queue.push(target("c")), PushOutcome::Rejected);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.outstanding(), 2);
        assert_eq!(queue.rejected_count(), 1);
    }

    #[test]
    fn test_zero_capacity_means_unbounded() {
        assert_eq!(WorkQueue::new(Some(0)).capacity(), None);
    }

    #[tokio::test]
    async fn test_close_discards_and_wakes_waiters() {
        let queue = Arc::new(WorkQueue::unbounded());

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(queue.close(), 0);
        assert!(waiter.await.unwrap().is_none());

        assert_eq!(queue.push(target("late")), PushOutcome::Closed);
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn test_close_with_queued_items() {
        let queue = WorkQueue::unbounded();
        queue.push(target("a"));
        queue.push(target("b"));

        assert_eq!(queue.close(), 2);
        assert!(queue.is_closed());
        assert!(queue.is_idle());
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn test_each_item_delivered_once() {
        let queue = Arc::new(WorkQueue::unbounded());

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move {
                    let mut seen = Vec::new();
                    while let Some(target) = queue.pop().await {
                        seen.push(target.node_id);
                        queue.complete();
                    }
                    seen
                })
            })
            .collect();

        for i in 0..200 {
            queue.push(target(&format!("node-{}", i)));
        }

        while !queue.is_idle() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        queue.close();

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        let unique: HashSet<_> = all.iter().cloned().collect();
        assert_eq!(all.len(), 200);
        assert_eq!(unique.len(), 200);
    }
}
