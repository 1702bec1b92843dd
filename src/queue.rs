//! FIFO hand-off between a producer worker and a consumer worker.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// An unbounded FIFO queue guarded by its own lock.
///
/// Producers never block. A consumer parked in [`Queue::pop`] is woken by the next
/// [`Queue::push`] or by cancellation, whichever comes first.
#[derive(Debug)]
pub struct Queue<T> {
    items: Mutex<VecDeque<T>>,
    available: Notify,
}

impl<T> Queue<T> {
    pub fn new() -> Queue<T> {
        Queue {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
        }
    }

    pub fn push(&self, item: T) {
        self.lock().push_back(item);
        // Stores a permit when nobody is parked yet, so the wake-up is never lost.
        self.available.notify_one();
    }

    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Removes the head of the queue, waiting for one to arrive if the queue is empty.
    ///
    /// Returns `None` only when `shutdown` has been cancelled and nothing is left to hand out:
    /// items pushed before cancellation are still delivered.
    pub async fn pop(&self, shutdown: &CancellationToken) -> Option<T> {
        loop {
            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            if shutdown.is_cancelled() {
                return None;
            }
            tokio::select! {
                () = self.available.notified() => {}
                () = shutdown.cancelled() => {}
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // A panic while holding the lock cannot leave the deque half-modified.
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Queue::new()
    }
}
