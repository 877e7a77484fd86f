//! Per-network task group for concurrent plugin dispatch.
//!
//! Concurrent dispatch runs each plugin invocation on a bounded worker pool
//! rather than a thread per event, so a burst of traffic cannot exhaust
//! process threads. The group tracks every outstanding invocation and
//! offers two teardown-related operations:
//!
//! - [`TaskGroup::drain`] blocks until all previously spawned tasks finish,
//!   without affecting future dispatch.
//! - [`TaskGroup::seal_and_drain`] additionally seals the group: later
//!   spawns fail with [`StoppedHandling`].

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::trace;

/// Raised when dispatch is attempted after the group was sealed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("waiting for running plugin tasks to finish")]
pub struct StoppedHandling;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Outstanding {
    count: Mutex<usize>,
    done: Condvar,
}

impl Outstanding {
    fn increment(&self) {
        *self.count.lock() += 1;
    }

    fn decrement(&self) {
        let mut count = self.count.lock();
        *count -= 1;
        if *count == 0 {
            self.done.notify_all();
        }
    }

    fn wait_for_zero(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.done.wait(&mut count);
        }
    }
}

/// A joinable group of plugin invocations backed by a bounded worker pool.
pub struct TaskGroup {
    // None once sealed; dropping the sender lets the workers run dry.
    jobs: Mutex<Option<flume::Sender<Job>>>,
    outstanding: Arc<Outstanding>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskGroup {
    /// Create a group with `workers` pool threads.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = flume::unbounded::<Job>();
        let outstanding = Arc::new(Outstanding::default());

        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let rx = rx.clone();
            let outstanding = Arc::clone(&outstanding);
            let handle = std::thread::Builder::new()
                .name(format!("parley-dispatch-{index}"))
                .spawn(move || {
                    for job in rx.iter() {
                        job();
                        outstanding.decrement();
                    }
                })
                .expect("failed to spawn dispatch worker");
            handles.push(handle);
        }

        Self {
            jobs: Mutex::new(Some(tx)),
            outstanding,
            workers: Mutex::new(handles),
        }
    }

    /// Queue one invocation on the pool.
    ///
    /// # Errors
    ///
    /// [`StoppedHandling`] once the group is sealed.
    pub fn spawn(&self, job: Job) -> Result<(), StoppedHandling> {
        let jobs = self.jobs.lock();
        let Some(tx) = jobs.as_ref() else {
            return Err(StoppedHandling);
        };

        self.outstanding.increment();
        if tx.send(job).is_err() {
            // Workers are gone; undo the accounting.
            self.outstanding.decrement();
            return Err(StoppedHandling);
        }

        Ok(())
    }

    /// Block until every previously spawned task has completed.
    ///
    /// Later spawns are unaffected.
    pub fn drain(&self) {
        self.outstanding.wait_for_zero();
    }

    /// Seal the group against further dispatch and block until all
    /// outstanding tasks complete.
    ///
    /// Idempotent; the drain barrier holds on every call.
    pub fn seal_and_drain(&self) {
        // Dropping the sender ends the workers' job iterators.
        self.jobs.lock().take();
        self.outstanding.wait_for_zero();

        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            let _ = handle.join();
        }
        trace!("task group drained and sealed");
    }

    /// Check whether the group has been sealed.
    #[must_use]
    pub fn sealed(&self) -> bool {
        self.jobs.lock().is_none()
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        self.jobs.get_mut().take();
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn runs_spawned_jobs() {
        let group = TaskGroup::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..32 {
            let counter = Arc::clone(&counter);
            group
                .spawn(Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        group.drain();
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn seal_waits_for_all_outstanding_tasks() {
        let group = TaskGroup::new(2);
        let finished = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let finished = Arc::clone(&finished);
            group
                .spawn(Box::new(move || {
                    std::thread::sleep(Duration::from_millis(20));
                    finished.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        group.seal_and_drain();
        assert_eq!(finished.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn spawn_after_seal_fails_with_stopped_handling() {
        let group = TaskGroup::new(1);
        group.seal_and_drain();

        let result = group.spawn(Box::new(|| {}));
        assert_eq!(result, Err(StoppedHandling));
        assert!(group.sealed());
    }

    #[test]
    fn drain_does_not_seal() {
        let group = TaskGroup::new(1);
        group.spawn(Box::new(|| {})).unwrap();
        group.drain();

        assert!(!group.sealed());
        assert!(group.spawn(Box::new(|| {})).is_ok());
        group.drain();
    }
}
