//! The bucketed scheduler: two-lock dispatch protocol, composite priority,
//! and the stop-and-drain shutdown path.
//!
//! # Locking
//! Two mutexes per scheduler: `buckets` (outer) and `heap` (inner). The
//! acquisition order `buckets -> heap` is invariant; no path here takes
//! `buckets` while holding `heap`. The composite-priority counter and the
//! pending count are atomics touched outside both locks.
//!
//! # Why this shape
//! The per-bucket invariant (at most one item of a bucket in flight) holds
//! because only the worker that finished bucket B's item ever moves B's
//! successor out of its FIFO, and it moves it into the ready heap, not
//! directly into execution. The heap is therefore the single source of the
//! next ready item, for fresh cross-bucket work and promoted successors
//! alike, and the dispatcher is one uniform pop.

use std::cmp::Ordering as CmpOrdering;
use std::collections::hash_map::Entry;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use crossbeam_channel::Sender;

use super::pool::TaskPool;
use crate::heap::BinaryHeap;

/// Initial value of the per-scheduler sequence counter. Decremented before
/// use, so live sequence values always fit in the low 56 bits.
const SEQ_START: u64 = 1 << 56;

/// Scheduler options.
#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    /// Maximum number of concurrently dispatched items. Zero or negative
    /// means unlimited.
    pub max_parallelism: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_parallelism: 0 }
    }
}

/// A work item annotated with its scheduling labels.
///
/// `composite` packs the user priority into the high byte and an inverted
/// insertion counter into the low 56 bits, so a single `u64` comparison
/// orders by priority first and insertion order second. No two items of one
/// scheduler share a composite value.
struct WorkItem<T> {
    value: T,
    bucket: i64,
    composite: u64,
}

// The ready heap is a min-heap; reversing the comparison turns it into the
// max-heap the dispatch order needs.
impl<T> PartialEq for WorkItem<T> {
    fn eq(&self, other: &Self) -> bool {
        self.composite == other.composite
    }
}

impl<T> Eq for WorkItem<T> {}

impl<T> PartialOrd for WorkItem<T> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for WorkItem<T> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.composite.cmp(&self.composite)
    }
}

/// State guarded by the inner `heap` lock.
struct HeapState<T> {
    /// Items whose bucket is idle, ordered by composite priority.
    ready: BinaryHeap<WorkItem<T>>,
    /// Currently dispatched items. Never exceeds the parallelism cap.
    active: usize,
    /// One-shot completion signal; present iff a stop call is waiting.
    completion: Option<Sender<bool>>,
}

/// Per-bucket state, guarded by the outer `buckets` lock.
///
/// A map entry means the bucket has an item dispatched or in the ready heap
/// (or, after stop, parked work). `None` = no queued successors; `Some(q)` =
/// successors waiting their turn, in FIFO order.
type BucketSlot<T> = Option<VecDeque<WorkItem<T>>>;

struct Shared<T> {
    routine: Arc<dyn Fn(T) + Send + Sync>,
    pool: Arc<dyn TaskPool>,
    max_parallelism: usize,
    seq: AtomicU64,
    /// Items not yet handed to the pool: ready heap plus every bucket FIFO.
    pending: AtomicU64,
    stopped: AtomicBool,
    buckets: Mutex<AHashMap<i64, BucketSlot<T>>>,
    heap: Mutex<HeapState<T>>,
}

/// Concurrent scheduler with per-bucket mutual exclusion.
///
/// # Examples
/// ```
/// use std::sync::atomic::{AtomicI64, Ordering};
/// use std::sync::Arc;
/// use compact_collections::{BucketScheduler, FixedThreadPool, SchedulerConfig};
///
/// let pool = Arc::new(FixedThreadPool::new(4));
/// let sum = Arc::new(AtomicI64::new(0));
/// let sum_in_routine = Arc::clone(&sum);
///
/// let scheduler = BucketScheduler::new(pool, SchedulerConfig::default(), move |v: i64| {
///     sum_in_routine.fetch_add(v, Ordering::SeqCst);
/// });
///
/// for v in 1..=4 {
///     scheduler.enqueue(v, v);
/// }
/// let drained = scheduler.stop_and_wait_for_completion();
/// assert!(drained.is_empty());
/// assert_eq!(sum.load(Ordering::SeqCst), 10);
/// ```
pub struct BucketScheduler<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BucketScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> BucketScheduler<T> {
    /// Creates a scheduler that runs `routine` on `pool` for every item.
    pub fn new<F>(pool: Arc<dyn TaskPool>, config: SchedulerConfig, routine: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let max_parallelism = if config.max_parallelism <= 0 {
            usize::MAX
        } else {
            config.max_parallelism as usize
        };

        Self {
            shared: Arc::new(Shared {
                routine: Arc::new(routine),
                pool,
                max_parallelism,
                seq: AtomicU64::new(SEQ_START),
                pending: AtomicU64::new(0),
                stopped: AtomicBool::new(false),
                buckets: Mutex::new(AHashMap::new()),
                heap: Mutex::new(HeapState {
                    ready: BinaryHeap::new(),
                    active: 0,
                    completion: None,
                }),
            }),
        }
    }

    /// Enqueues `value` under `bucket` at priority 0.
    pub fn enqueue(&self, value: T, bucket: i64) {
        self.enqueue_with_priority(value, bucket, 0);
    }

    /// Enqueues `value` under `bucket`. Higher `priority` dispatches earlier
    /// across buckets; within one bucket, insertion order always wins.
    ///
    /// Accepted in every scheduler state. After a stop has been signalled the
    /// item is parked in its bucket's FIFO and comes back out of the next
    /// [`Self::stop_and_wait_for_completion`] call.
    pub fn enqueue_with_priority(&self, value: T, bucket: i64, priority: u8) {
        let shared = &self.shared;

        // Reserve the composite priority outside both locks. The counter
        // decrements, so earlier reservations order first within a priority.
        let seq = shared.seq.fetch_sub(1, Ordering::Relaxed) - 1;
        assert!(seq > 0 && seq < SEQ_START, "sequence counter exhausted");
        let composite = ((priority as u64) << 56) | seq;
        let item = WorkItem {
            value,
            bucket,
            composite,
        };
        shared.pending.fetch_add(1, Ordering::Relaxed);

        let mut buckets = shared.buckets.lock().unwrap();
        let stopped = shared.stopped.load(Ordering::SeqCst);
        match buckets.entry(bucket) {
            Entry::Occupied(mut occupied) => {
                // Bucket busy (or parked): the item waits its turn.
                occupied
                    .get_mut()
                    .get_or_insert_with(VecDeque::new)
                    .push_back(item);
                tracing::trace!(bucket, priority, "enqueued behind running bucket");
                return;
            }
            Entry::Vacant(vacant) => {
                if stopped {
                    vacant.insert(Some(VecDeque::from([item])));
                    tracing::trace!(bucket, priority, "parked while stopped");
                    return;
                }
                vacant.insert(None);
            }
        }

        // Bucket idle and the scheduler accepting: dispatch now if a worker
        // slot is free, otherwise park in the ready heap.
        let mut heap = shared.heap.lock().unwrap();
        if heap.active < shared.max_parallelism {
            heap.active += 1;
            shared.pending.fetch_sub(1, Ordering::Relaxed);
            drop(heap);
            drop(buckets);
            tracing::trace!(bucket, priority, "dispatching immediately");
            Self::dispatch(Arc::clone(shared), item);
        } else {
            heap.ready.push(item).expect("ready heap at index capacity");
            tracing::trace!(bucket, priority, "queued in ready heap");
        }
    }

    /// Signals stop, waits for in-flight routines to settle, and returns all
    /// undispatched work in composite-priority order (priority descending,
    /// insertion order within a priority).
    ///
    /// Does not cancel running routines. May be called repeatedly (later
    /// calls return whatever was parked since the previous one), but at most
    /// one call may be waiting at a time.
    pub fn stop_and_wait_for_completion(&self) -> Vec<T> {
        let shared = &self.shared;

        let wait = {
            let _buckets = shared.buckets.lock().unwrap();
            let mut heap = shared.heap.lock().unwrap();
            shared.stopped.store(true, Ordering::SeqCst);
            if heap.active == 0 {
                None
            } else {
                let (tx, rx) = crossbeam_channel::bounded(1);
                assert!(heap.completion.is_none(), "one stop waiter at a time");
                heap.completion = Some(tx);
                Some(rx)
            }
        };

        if let Some(rx) = wait {
            tracing::debug!("stop: waiting for in-flight work");
            let _ = rx.recv();
        }

        let mut drained: Vec<WorkItem<T>> = Vec::new();
        {
            let mut buckets = shared.buckets.lock().unwrap();
            let mut heap = shared.heap.lock().unwrap();
            while let Ok(item) = heap.ready.pop() {
                drained.push(item);
            }
            for (_, slot) in buckets.drain() {
                if let Some(queue) = slot {
                    drained.extend(queue);
                }
            }
        }
        shared
            .pending
            .fetch_sub(drained.len() as u64, Ordering::Relaxed);

        drained.sort_by(|a, b| b.composite.cmp(&a.composite));
        tracing::debug!(count = drained.len(), "stop: drained undispatched work");
        drained.into_iter().map(|item| item.value).collect()
    }

    /// Items not yet handed to the pool (ready heap plus bucket FIFOs).
    pub fn pending_work_items(&self) -> usize {
        self.shared.pending.load(Ordering::Relaxed) as usize
    }

    /// True once a stop has been signalled.
    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// The parallelism cap; `usize::MAX` when unlimited.
    pub fn max_parallelism(&self) -> usize {
        self.shared.max_parallelism
    }

    fn dispatch(shared: Arc<Shared<T>>, item: WorkItem<T>) {
        let pool = Arc::clone(&shared.pool);
        pool.spawn(Box::new(move || Self::worker_loop(shared, item)));
    }

    /// One dispatched item's life on the pool. Keeps pulling ready work until
    /// the heap is empty or a stop is signalled.
    fn worker_loop(shared: Arc<Shared<T>>, mut item: WorkItem<T>) {
        loop {
            let WorkItem { value, bucket, .. } = item;

            // The routine's own failures are its caller's business; a panic
            // still counts as a completed item so the protocol can't wedge.
            let routine = Arc::clone(&shared.routine);
            if catch_unwind(AssertUnwindSafe(move || routine(value))).is_err() {
                tracing::debug!(bucket, "work routine panicked");
            }

            // Promote this bucket's successor into the ready heap, or retire
            // the bucket entry. Only this worker touches this bucket's FIFO.
            {
                let mut buckets = shared.buckets.lock().unwrap();
                let successor = buckets
                    .get_mut(&bucket)
                    .and_then(|slot| slot.as_mut().and_then(|queue| queue.pop_front()));
                match successor {
                    Some(next) => {
                        if let Some(slot) = buckets.get_mut(&bucket) {
                            if slot.as_ref().is_some_and(|queue| queue.is_empty()) {
                                *slot = None;
                            }
                        }
                        // Still pending: it moved from the FIFO into the heap.
                        let mut heap = shared.heap.lock().unwrap();
                        heap.ready.push(next).expect("ready heap at index capacity");
                    }
                    // Absent is possible when a stop call drained the map
                    // while this item was still running.
                    None => {
                        buckets.remove(&bucket);
                    }
                }
            }

            let mut heap = shared.heap.lock().unwrap();
            if shared.stopped.load(Ordering::SeqCst) {
                heap.active -= 1;
                if heap.active == 0 {
                    if let Some(tx) = heap.completion.take() {
                        let _ = tx.send(true);
                    }
                }
                return;
            }
            match heap.ready.pop() {
                Ok(next) => {
                    shared.pending.fetch_sub(1, Ordering::Relaxed);
                    drop(heap);
                    item = next;
                }
                Err(_) => {
                    heap.active -= 1;
                    return;
                }
            }
        }
    }
}
