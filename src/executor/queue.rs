//! Bounded blocking FIFO queue.
//!
//! One mutex guards the items; two condition variables wake the opposite
//! side on the transitions it waits for (space freed wakes adders, an item
//! appearing wakes takers). Closing the queue wakes everyone: blocked adders
//! get their item back and takers stop waiting once the queue is empty.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Item handed back by a failed add.
pub enum PushError<T> {
    /// No space became available (immediately, or within the timeout).
    Full(T),
    /// The queue was closed.
    Closed(T),
}

impl<T> PushError<T> {
    /// Recover the rejected item.
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(item) | PushError::Closed(item) => item,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, PushError::Full(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, PushError::Closed(_))
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

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Thread-safe FIFO holding at most `capacity` items.
pub struct BoundedQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Create an empty queue.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Append `item`, blocking while the queue is full.
    pub fn add(&self, item: T) -> Result<(), PushError<T>> {
        let mut state = self.state.lock();
        let capacity = self.capacity;
        self.not_full
            .wait_while(&mut state, |s| !s.closed && s.items.len() >= capacity);

        if state.closed {
            return Err(PushError::Closed(item));
        }
        state.items.push_back(item);
        debug_assert!(state.items.len() <= self.capacity);
        drop(state);

        self.not_empty.notify_one();
        Ok(())
    }

    /// Append `item`, waiting at most `timeout` for space.
    pub fn add_timeout(&self, item: T, timeout: Duration) -> Result<(), PushError<T>> {
        let mut state = self.state.lock();
        let capacity = self.capacity;
        self.not_full.wait_while_for(
            &mut state,
            |s| !s.closed && s.items.len() >= capacity,
            timeout,
        );

        if state.closed {
            return Err(PushError::Closed(item));
        }
        if state.items.len() >= self.capacity {
            return Err(PushError::Full(item));
        }
        state.items.push_back(item);
        drop(state);

        self.not_empty.notify_one();
        Ok(())
    }

    /// Append `item` only if there is space right now.
    pub fn try_add(&self, item: T) -> Result<(), PushError<T>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PushError::Closed(item));
        }
        if state.items.len() >= self.capacity {
            return Err(PushError::Full(item));
        }
        state.items.push_back(item);
        drop(state);

        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the head, blocking while the queue is empty.
    ///
    /// Returns `None` only once the queue is closed and empty.
    pub fn take(&self) -> Option<T> {
        let mut state = self.state.lock();
        self.not_empty
            .wait_while(&mut state, |s| !s.closed && s.items.is_empty());
        self.pop_locked(state)
    }

    /// Remove the head, waiting at most `timeout` for one to arrive.
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        let mut state = self.state.lock();
        self.not_empty
            .wait_while_for(&mut state, |s| !s.closed && s.items.is_empty(), timeout);
        self.pop_locked(state)
    }

    /// Remove the head if there is one.
    pub fn try_take(&self) -> Option<T> {
        let state = self.state.lock();
        self.pop_locked(state)
    }

    fn pop_locked(&self, mut state: parking_lot::MutexGuard<'_, State<T>>) -> Option<T> {
        let item = state.items.pop_front()?;
        // Unlock first so the woken adder doesn't immediately block on the mutex.
        drop(state);
        self.not_full.notify_one();
        Some(item)
    }

    /// Inspect the head without removing it.
    pub fn peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.state.lock().items.front().map(f)
    }

    /// Remove every queued item at once, in order.
    pub fn drain(&self) -> Vec<T> {
        let drained: Vec<T> = {
            let mut state = self.state.lock();
            if state.items.is_empty() {
                return Vec::new();
            }
            state.items.drain(..).collect()
        };
        self.not_full.notify_all();
        drained
    }

    /// Close the queue. Pending and future adds fail with
    /// [`PushError::Closed`]; takers drain what is left, then get `None`.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Current length. Stale as soon as it returns.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
