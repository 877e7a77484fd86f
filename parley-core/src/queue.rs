//! A thread-safe outbound queue that participates in readiness selection.
//!
//! Pushing from any thread wakes a reactor blocked on the queue's readiness
//! handle. The trick is a self-pipe: every `push` writes one byte to a pipe
//! whose read end is registered with the poller, and every successful `pop`
//! consumes one byte. The pipe therefore reads as "ready" exactly while the
//! queue is non-empty.
//!
//! Popping is meant to be done by a single consumer (the reactor); pushing
//! may happen from arbitrarily many producer threads.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use mio::unix::pipe;
use mio::{Interest, Registry, Token};
use parking_lot::Mutex;

/// FIFO of opaque outbound payloads with a selectable readiness handle.
pub struct SelectableQueue {
    items: Mutex<VecDeque<String>>,
    wake_tx: pipe::Sender,
    wake_rx: Mutex<pipe::Receiver>,
}

impl SelectableQueue {
    /// Create a new queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the wake pipe cannot be created.
    pub fn new() -> io::Result<Self> {
        let (wake_tx, wake_rx) = pipe::new()?;

        Ok(Self {
            items: Mutex::new(VecDeque::new()),
            wake_tx,
            wake_rx: Mutex::new(wake_rx),
        })
    }

    /// Append an item and wake any selection wait on the readiness handle.
    pub fn push(&self, item: impl Into<String>) {
        let mut items = self.items.lock();
        items.push_back(item.into());

        // A full pipe means plenty of wake bytes are already pending, so a
        // failed write never loses a wakeup.
        let _ = (&self.wake_tx).write(&[b'.']);
    }

    /// Pop the oldest item without blocking.
    ///
    /// Returns `None` when the queue is empty.
    pub fn pop(&self) -> Option<String> {
        let mut items = self.items.lock();
        let item = items.pop_front()?;

        let mut byte = [0u8; 1];
        let _ = (&*self.wake_rx.lock()).read(&mut byte);

        Some(item)
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Check whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Register the readiness handle with a poll registry.
    pub fn register(&self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        registry.register(&mut *self.wake_rx.lock(), token, interests)
    }

    /// Re-register the readiness handle, re-arming event delivery.
    pub fn reregister(
        &self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        registry.reregister(&mut *self.wake_rx.lock(), token, interests)
    }

    /// Remove the readiness handle from a poll registry.
    pub fn deregister(&self, registry: &Registry) -> io::Result<()> {
        registry.deregister(&mut *self.wake_rx.lock())
    }
}

impl std::fmt::Debug for SelectableQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectableQueue")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn pops_in_fifo_order() {
        let queue = SelectableQueue::new().unwrap();
        queue.push("one");
        queue.push("two");
        queue.push("three");

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop().as_deref(), Some("one"));
        assert_eq!(queue.pop().as_deref(), Some("two"));
        assert_eq!(queue.pop().as_deref(), Some("three"));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn pop_on_empty_signals_empty() {
        let queue = SelectableQueue::new().unwrap();
        assert_eq!(queue.pop(), None);

        queue.push("one");
        queue.pop();
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn push_wakes_a_selection_wait() {
        let queue = SelectableQueue::new().unwrap();
        let mut poll = mio::Poll::new().unwrap();
        let mut events = mio::Events::with_capacity(4);

        queue
            .register(poll.registry(), Token(0), Interest::READABLE)
            .unwrap();

        // Nothing queued: the wait times out with no events.
        poll.poll(&mut events, Some(Duration::from_millis(10))).unwrap();
        assert!(events.is_empty());

        queue.push("wake up");
        poll.poll(&mut events, Some(Duration::from_secs(1))).unwrap();
        assert!(events.iter().any(|e| e.token() == Token(0) && e.is_readable()));
    }

    #[test]
    fn readiness_persists_while_non_empty() {
        let queue = SelectableQueue::new().unwrap();
        let mut poll = mio::Poll::new().unwrap();
        let mut events = mio::Events::with_capacity(4);

        queue
            .register(poll.registry(), Token(0), Interest::READABLE)
            .unwrap();

        queue.push("one");
        queue.push("two");
        assert!(queue.pop().is_some());

        // One item remains, so one wake byte remains in the pipe.
        queue
            .reregister(poll.registry(), Token(0), Interest::READABLE)
            .unwrap();
        poll.poll(&mut events, Some(Duration::from_secs(1))).unwrap();
        assert!(events.iter().any(|e| e.token() == Token(0)));
    }

    #[test]
    fn tolerates_many_producers() {
        let queue = Arc::new(SelectableQueue::new().unwrap());
        let mut handles = Vec::new();

        for t in 0..8 {
            let queue = Arc::clone(&queue);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    queue.push(format!("{t}-{i}"));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let mut count = 0;
        while queue.pop().is_some() {
            count += 1;
        }
        assert_eq!(count, 8 * 50);
    }
}
