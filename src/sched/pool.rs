//! The execution-pool seam and a fixed-size OS-thread implementation.
//!
//! The scheduler never owns threads; it hands closures to a [`TaskPool`].
//! Production callers can adapt whatever executor they already run, tests
//! can inject a pool they control, and [`FixedThreadPool`] covers the common
//! case of N dedicated workers.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

/// A boxed unit of work handed to the pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// External execution pool onto which work is dispatched.
///
/// Implementations must run every spawned job eventually; the scheduler's
/// completion protocol counts on it.
pub trait TaskPool: Send + Sync {
    fn spawn(&self, job: Job);
}

/// Fixed-size pool of OS threads fed from an MPMC channel.
///
/// - Jobs run in spawn order per channel semantics, on whichever worker is
///   free; no affinity.
/// - Panicking jobs are caught so a worker thread survives them.
/// - Dropping the pool closes the channel, lets queued jobs finish, and
///   joins all workers.
pub struct FixedThreadPool {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl FixedThreadPool {
    /// Spawns `workers` threads.
    ///
    /// # Panics
    /// Panics if `workers` is zero or a thread cannot be spawned.
    pub fn new(workers: usize) -> Self {
        assert!(workers > 0, "pool needs at least one worker");

        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let handles = (0..workers)
            .map(|i| {
                let rx: Receiver<Job> = rx.clone();
                thread::Builder::new()
                    .name(format!("task-pool-{i}"))
                    .spawn(move || {
                        while let Ok(job) = rx.recv() {
                            // A panicking job must not take the worker down;
                            // the payload is dropped and the loop continues.
                            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                                tracing::debug!("pool job panicked");
                            }
                        }
                    })
                    .expect("spawn pool worker")
            })
            .collect();

        Self {
            tx: Some(tx),
            workers: handles,
        }
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }
}

impl TaskPool for FixedThreadPool {
    fn spawn(&self, job: Job) {
        self.tx
            .as_ref()
            .expect("pool sender present until drop")
            .send(job)
            .expect("pool workers alive");
    }
}

impl Drop for FixedThreadPool {
    fn drop(&mut self) {
        // Closing the channel ends each worker's recv loop after the queue
        // drains.
        drop(self.tx.take());
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
