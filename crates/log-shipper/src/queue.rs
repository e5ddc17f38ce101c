// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded FIFO shared between producers and the flush worker.
//!
//! Producers are plain threads: [`BoundedQueue::push`] parks the calling thread
//! until space frees up, [`BoundedQueue::try_push`] never blocks. The single
//! consumer is the async flush worker, which waits for documents with
//! [`BoundedQueue::pop_timeout`].
//!
//! # Unfinished items
//!
//! Every accepted item counts as *unfinished* until the consumer reports it
//! done with [`BoundedQueue::task_done`]. A queue is *settled* when it is empty
//! and nothing dequeued is still being worked on, which is what a flush waits
//! for.
//!
//! ```text
//!   push ──> [ items ] ──pop──> in flight ──task_done──> settled
//!    │                                                      ^
//!    └──────────────── unfinished counter ──────────────────┘
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{self, Instant};

/// Why an item was handed back instead of being enqueued.
pub enum PushError<T> {
    /// The queue is at capacity.
    Full(T),
    /// The queue no longer accepts items.
    Closed(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(item) | PushError::Closed(item) => item,
        }
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => write!(f, "Full(..)"),
            PushError::Closed(_) => write!(f, "Closed(..)"),
        }
    }
}

struct QueueState<T> {
    items: VecDeque<T>,
    unfinished: usize,
    closed: bool,
}

pub struct BoundedQueue<T> {
    state: Mutex<QueueState<T>>,
    capacity: usize,
    /// Signalled when an item leaves the queue
    space: Condvar,
    /// Signalled when the unfinished count drops to zero
    settled: Condvar,
    /// Wakes the consumer when an item arrives
    available: Notify,
}

impl<T> BoundedQueue<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                unfinished: 0,
                closed: false,
            }),
            capacity,
            space: Condvar::new(),
            settled: Condvar::new(),
            available: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued items right now.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Enqueues without blocking; a full queue hands the item back.
    pub fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(PushError::Closed(item));
            }
            if state.items.len() >= self.capacity {
                return Err(PushError::Full(item));
            }
            state.items.push_back(item);
            state.unfinished += 1;
        }
        self.available.notify_one();
        Ok(())
    }

    /// Enqueues, parking the calling thread while the queue is full.
    ///
    /// Must not be called from inside an async task: it blocks the thread.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        {
            let mut state = self.lock();
            while state.items.len() >= self.capacity && !state.closed {
                state = self
                    .space
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if state.closed {
                return Err(PushError::Closed(item));
            }
            state.items.push_back(item);
            state.unfinished += 1;
        }
        self.available.notify_one();
        Ok(())
    }

    /// Removes the oldest item, if any.
    pub fn try_pop(&self) -> Option<T> {
        let item = self.lock().items.pop_front();
        if item.is_some() {
            self.space.notify_one();
        }
        item
    }

    /// Removes the oldest item, waiting at most `timeout` for one to arrive.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now()
            .checked_add(timeout)
            .unwrap_or_else(far_future);
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            if time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }

    /// Reports `count` dequeued items as fully handled.
    pub fn task_done(&self, count: usize) {
        if count == 0 {
            return;
        }
        let mut state = self.lock();
        state.unfinished = state.unfinished.saturating_sub(count);
        if state.unfinished == 0 {
            self.settled.notify_all();
        }
    }

    /// Items accepted but not yet reported done, queued or in flight.
    #[must_use]
    pub fn unfinished(&self) -> usize {
        self.lock().unfinished
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.lock().unfinished == 0
    }

    /// Blocks until the queue is settled or `timeout` elapses. Returns whether
    /// the queue settled.
    pub fn wait_settled(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .settled
            .wait_timeout_while(state, timeout, |state| state.unfinished > 0)
            .unwrap_or_else(PoisonError::into_inner);
        state.unfinished == 0
    }

    /// Stops accepting items and wakes every blocked producer. Items already
    /// queued stay available to the consumer.
    pub fn close(&self) {
        self.lock().closed = true;
        self.space.notify_all();
        self.available.notify_waiters();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity)
            .field("len", &state.items.len())
            .field("unfinished", &state.unfinished)
            .field("closed", &state.closed)
            .finish()
    }
}

/// An instant far enough away to stand in for "never".
pub(crate) fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400 * 365 * 30)
}
