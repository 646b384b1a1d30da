//! Admission permits for concurrent handler execution.
//!
//! The router takes a permit before spawning a handler and the handler task
//! holds it until its reply has been written. With a limit configured, a
//! flood of requests queues at the read loop instead of spawning unbounded
//! work; without one, acquisition never waits.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct HandlerPermits {
    semaphore: Option<Arc<Semaphore>>,
    limit: Option<NonZeroUsize>,
    in_flight: Arc<AtomicUsize>,
}

/// Held by a running handler; releases its slot on drop.
#[must_use = "dropping the permit immediately releases the handler slot"]
pub struct HandlerPermit {
    _permit: Option<OwnedSemaphorePermit>,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for HandlerPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl HandlerPermits {
    /// A zero limit is unrepresentable: it would never admit a handler.
    pub fn new(limit: Option<NonZeroUsize>) -> Self {
        Self {
            semaphore: limit.map(|n| Arc::new(Semaphore::new(n.get()))),
            limit,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> HandlerPermit {
        let permit = match &self.semaphore {
            Some(semaphore) => {
                if semaphore.available_permits() == 0 {
                    tracing::debug!(
                        limit = ?self.limit,
                        in_flight = self.in_flight(),
                        "Handler limit reached, waiting for a slot"
                    );
                }
                // The semaphore is never closed, so acquisition only fails if that changes.
                Arc::clone(semaphore).acquire_owned().await.ok()
            }
            None => None,
        };
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        HandlerPermit {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Handlers currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn acquire_within(permits: &HandlerPermits) -> Option<HandlerPermit> {
        tokio::time::timeout(Duration::from_millis(20), permits.acquire())
            .await
            .ok()
    }

    #[tokio::test]
    async fn bounded_pool_blocks_at_limit() {
        let permits = HandlerPermits::new(NonZeroUsize::new(2));

        let a = permits.acquire().await;
        let _b = permits.acquire().await;
        assert_eq!(permits.in_flight(), 2);
        assert!(acquire_within(&permits).await.is_none());
        assert_eq!(permits.in_flight(), 2);

        drop(a);
        assert_eq!(permits.in_flight(), 1);
        let _c = acquire_within(&permits).await.expect("slot freed");
        assert_eq!(permits.in_flight(), 2);
    }

    #[tokio::test]
    async fn single_slot_pool_admits_one_at_a_time() {
        let permits = HandlerPermits::new(Some(NonZeroUsize::MIN));

        let first = acquire_within(&permits).await.expect("one slot");
        assert!(acquire_within(&permits).await.is_none());
        drop(first);
        assert!(acquire_within(&permits).await.is_some());
    }

    #[tokio::test]
    async fn unbounded_pool_never_waits() {
        let permits = HandlerPermits::new(None);
        let held: Vec<_> = futures::future::join_all((0..100).map(|_| permits.acquire())).await;

        assert_eq!(permits.in_flight(), 100);
        drop(held);
        assert_eq!(permits.in_flight(), 0);
    }
}
