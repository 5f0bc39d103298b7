//! Counting semaphore with strict FIFO hand-off.
//!
//! A released permit goes straight to the oldest waiter instead of back to
//! the pool, so a caller arriving later can never overtake a queued one and a
//! single release never both wakes a waiter and increments the count.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::oneshot;

use crate::util::lock_unpoisoned;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("semaphore is closed")]
pub struct AcquireError;

pub struct Semaphore {
    state: Mutex<State>,
}

struct State {
    permits: usize,
    waiters: VecDeque<Waiter>,
    next_waiter_id: u64,
    closed: bool,
}

struct Waiter {
    id: u64,
    grant: oneshot::Sender<()>,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            state: Mutex::new(State {
                permits,
                waiters: VecDeque::new(),
                next_waiter_id: 0,
                closed: false,
            }),
        }
    }

    /// Waits for a permit. Waiters are served in arrival order.
    ///
    /// Cancel safe: dropping the future while queued removes the waiter, and
    /// a permit handed to a waiter that went away is passed on.
    pub async fn acquire(self: &Arc<Self>) -> Result<Permit, AcquireError> {
        let (id, receiver) = {
            let mut state = lock_unpoisoned(&self.state);
            if state.closed {
                return Err(AcquireError);
            }
            if state.permits > 0 {
                state.permits -= 1;
                return Ok(Permit::new(Arc::clone(self)));
            }
            let (grant, receiver) = oneshot::channel();
            let id = state.next_waiter_id;
            state.next_waiter_id = state.next_waiter_id.wrapping_add(1);
            state.waiters.push_back(Waiter { id, grant });
            (id, receiver)
        };

        let mut queued = QueuedWaiter {
            semaphore: self,
            id,
            receiver,
            granted: false,
        };
        match (&mut queued.receiver).await {
            Ok(()) => {
                queued.granted = true;
                Ok(Permit::new(Arc::clone(self)))
            }
            Err(_) => {
                queued.granted = true;
                Err(AcquireError)
            }
        }
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        let mut state = lock_unpoisoned(&self.state);
        if state.closed || state.permits == 0 {
            return None;
        }
        state.permits -= 1;
        Some(Permit::new(Arc::clone(self)))
    }

    pub fn available_permits(&self) -> usize {
        lock_unpoisoned(&self.state).permits
    }

    /// Number of callers currently queued in [`acquire`](Self::acquire).
    pub fn waiting(&self) -> usize {
        lock_unpoisoned(&self.state).waiters.len()
    }

    /// Fails every queued and future `acquire`. Outstanding permits stay valid.
    pub fn close(&self) {
        let waiters = {
            let mut state = lock_unpoisoned(&self.state);
            state.closed = true;
            std::mem::take(&mut state.waiters)
        };
        drop(waiters);
    }

    pub fn is_closed(&self) -> bool {
        lock_unpoisoned(&self.state).closed
    }

    fn release(&self) {
        let mut state = lock_unpoisoned(&self.state);
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.grant.send(()).is_ok() {
                return;
            }
        }
        state.permits += 1;
    }

    fn forget_waiter(&self, id: u64) -> bool {
        let mut state = lock_unpoisoned(&self.state);
        match state.waiters.iter().position(|waiter| waiter.id == id) {
            Some(index) => {
                state.waiters.remove(index);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock_unpoisoned(&self.state);
        formatter
            .debug_struct("Semaphore")
            .field("permits", &state.permits)
            .field("waiting", &state.waiters.len())
            .field("closed", &state.closed)
            .finish()
    }
}

struct QueuedWaiter<'a> {
    semaphore: &'a Semaphore,
    id: u64,
    receiver: oneshot::Receiver<()>,
    granted: bool,
}

impl Drop for QueuedWaiter<'_> {
    fn drop(&mut self) {
        if self.granted || self.semaphore.forget_waiter(self.id) {
            return;
        }
        // Dequeued by `release` before we could observe it: hand the permit on.
        if self.receiver.try_recv().is_ok() {
            self.semaphore.release();
        }
    }
}

/// Holds one unit of capacity; dropping it releases the capacity.
#[must_use = "the permit is released as soon as it is dropped"]
pub struct Permit {
    semaphore: Arc<Semaphore>,
}

impl Permit {
    fn new(semaphore: Arc<Semaphore>) -> Self {
        Self { semaphore }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

impl std::fmt::Debug for Permit {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("Permit").finish_non_exhaustive()
    }
}
