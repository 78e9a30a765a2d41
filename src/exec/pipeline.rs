//! Executor glue: the pull-based `get_next()` contract and morsel
//! distribution for scans (spec §4.9, component J).
//!
//! Grounded on the teacher's `execution::parallel::WorkStealingScheduler`
//! (fixed-size worker pool, pre-sized per-worker queues, a `WorkItem` as a
//! `(start, end)` range) generalized from its `tokio`-task/async-fn shape
//! to the synchronous state-machine pull model spec §4.8/§4.9 describes:
//! operators are plain functions returning the next chunk or `None`, never
//! `.await`ed, since the only blocking in this core happens inside the page
//! cache's `std::fs` calls (spec §4.9's "no suspension points within an
//! operator"). The worker pool itself is `std::thread` + `crossbeam_channel`
//! rather than a `tokio::Runtime`, since there is no async I/O left to
//! justify carrying tokio into this core (see DESIGN.md).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam::channel::{bounded, Receiver, Sender};

/// A contiguous range of row/page ids handed to one worker at a time, the
/// unit morsel-driven scans pull from a shared source (spec glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Morsel {
    pub start: usize,
    pub end: usize,
}

impl Morsel {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// A shared source of morsels over `[0, total)`, pulled under a mutex by
/// whichever worker asks next (spec §4.9: "morsels are pulled from a
/// shared source under a mutex; downstream work is thread-local").
pub struct MorselSource {
    total: usize,
    morsel_size: usize,
    next: Mutex<usize>,
}

impl MorselSource {
    pub fn new(total: usize, morsel_size: usize) -> Self {
        Self {
            total,
            morsel_size: morsel_size.max(1),
            next: Mutex::new(0),
        }
    }

    /// Hands out the next morsel, or `None` once `total` is exhausted.
    /// Whichever worker calls this next gets the next range; there is no
    /// affinity between a worker and a particular morsel.
    pub fn next_morsel(&self) -> Option<Morsel> {
        let mut cursor = self.next.lock().unwrap();
        if *cursor >= self.total {
            return None;
        }
        let start = *cursor;
        let end = (start + self.morsel_size).min(self.total);
        *cursor = end;
        Some(Morsel { start, end })
    }
}

/// Per-query cooperative cancellation: operators check this at chunk
/// boundaries and return `DONE` once set (spec §4.8/§4.9). The orchestrator
/// may set it from a timer, or a failed sibling pipeline task may set it so
/// the rest of the query drains promptly (spec §7's error propagation).
#[derive(Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A pull-based operator: `get_next` returns the next chunk of `T` or
/// `None` when exhausted, never blocking on anything but page-cache I/O
/// (spec §4.8's state-machine contract, generalized over the chunk type
/// so scans, probes, and sinks all implement the same shape).
pub trait PullOperator<T> {
    fn get_next(&mut self, interrupt: &InterruptFlag) -> Option<T>;
}

/// A fixed-size worker pool scheduling pipeline tasks over a shared
/// `MorselSource`, mirroring the teacher's `ParallelExecutor`'s
/// `worker_count`-sized pool but dispatching plain closures over a
/// channel instead of spawning `tokio` tasks.
pub struct ExecutorPool {
    sender: Sender<Job>,
    handles: Vec<std::thread::JoinHandle<()>>,
    active: Arc<AtomicUsize>,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

impl ExecutorPool {
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let (sender, receiver): (Sender<Job>, Receiver<Job>) = bounded(num_threads * 4);
        let active = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::with_capacity(num_threads);
        for worker_id in 0..num_threads {
            let receiver = receiver.clone();
            let active = active.clone();
            handles.push(
                std::thread::Builder::new()
                    .name(format!("rusty-db-worker-{worker_id}"))
                    .spawn(move || {
                        while let Ok(job) = receiver.recv() {
                            active.fetch_add(1, Ordering::SeqCst);
                            job();
                            active.fetch_sub(1, Ordering::SeqCst);
                        }
                    })
                    .expect("failed to spawn executor worker thread"),
            );
        }
        Self {
            sender,
            handles,
            active,
        }
    }

    /// Submits a pipeline task; blocks if every worker's queue is full
    /// rather than spawning unbounded work (spec §4.9: "fixed thread pool
    /// sized by maxNumThreads").
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        self.sender.send(Box::new(job)).expect("executor pool workers must outlive submitted jobs");
    }

    pub fn active_task_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn num_threads(&self) -> usize {
        self.handles.len()
    }
}

impl Drop for ExecutorPool {
    fn drop(&mut self) {
        // Dropping `sender` closes the channel once this is the last
        // handle to it, so worker threads exit their `recv` loop.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    #[test]
    fn morsel_source_partitions_without_overlap_or_gaps() {
        let source = MorselSource::new(100, 30);
        let mut seen = Vec::new();
        while let Some(m) = source.next_morsel() {
            seen.push(m);
        }
        assert_eq!(seen, vec![
            Morsel { start: 0, end: 30 },
            Morsel { start: 30, end: 60 },
            Morsel { start: 60, end: 90 },
            Morsel { start: 90, end: 100 },
        ]);
        assert!(source.next_morsel().is_none());
    }

    #[test]
    fn concurrent_workers_partition_a_shared_source_exactly_once() {
        let source = Arc::new(MorselSource::new(10_000, 137));
        let pool = ExecutorPool::new(4);
        let total = Arc::new(AtomicU64::new(0));
        let (done_tx, done_rx) = bounded::<()>(8);
        for _ in 0..8 {
            let source = source.clone();
            let total = total.clone();
            let done_tx = done_tx.clone();
            pool.submit(move || {
                while let Some(m) = source.next_morsel() {
                    total.fetch_add(m.len() as u64, Ordering::SeqCst);
                }
                done_tx.send(()).unwrap();
            });
        }
        drop(done_tx);
        for _ in 0..8 {
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(total.load(Ordering::SeqCst), 10_000);
    }

    #[test]
    fn interrupt_flag_is_observed_across_clones() {
        let flag = InterruptFlag::new();
        let cloned = flag.clone();
        assert!(!cloned.is_set());
        flag.set();
        assert!(cloned.is_set(), "interrupt must be visible through a cloned handle");
    }
}
