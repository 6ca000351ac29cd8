//! Single-slot mailbox with overwrite-on-publish semantics
//!
//! A producer (e.g. a training worker) publishes snapshots; a consumer
//! (e.g. a UI thread) takes the latest one whenever it is ready. Unconsumed
//! snapshots are replaced, never queued.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};

/// Shared handle to a single-slot mailbox
pub struct Mailbox<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

struct State<T> {
    slot: Option<T>,
    closed: bool,
    published: u64,
}

impl<T> Mailbox<T> {
    /// Create an empty, open mailbox
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    slot: None,
                    closed: false,
                    published: 0,
                }),
                ready: Condvar::new(),
            }),
        }
    }

    /// Store `value`, returning the snapshot it displaced, if any
    pub fn publish(&self, value: T) -> Result<Option<T>> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(Error::Closed);
        }
        let displaced = state.slot.replace(value);
        state.published += 1;
        drop(state);

        self.inner.ready.notify_one();
        Ok(displaced)
    }

    /// Take the current snapshot without waiting
    pub fn try_take(&self) -> Option<T> {
        self.inner.state.lock().slot.take()
    }

    /// Wait up to `timeout` for a snapshot.
    ///
    /// Returns `None` on timeout, or once the mailbox is closed and drained.
    /// A timeout too large to express as a deadline waits like [`Mailbox::recv`].
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.recv();
        };
        let mut state = self.inner.state.lock();

        while state.slot.is_none() && !state.closed {
            if self.inner.ready.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }

        state.slot.take()
    }

    /// Block until a snapshot is available or the mailbox is closed and drained
    pub fn recv(&self) -> Option<T> {
        let mut state = self.inner.state.lock();
        while state.slot.is_none() && !state.closed {
            self.inner.ready.wait(&mut state);
        }
        state.slot.take()
    }

    /// Refuse further publishes and wake every waiting reader
    pub fn close(&self) {
        self.inner.state.lock().closed = true;
        self.inner.ready.notify_all();
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Total number of successful publishes
    pub fn published(&self) -> u64 {
        self.inner.state.lock().published
    }
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}
