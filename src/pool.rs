//! Bounded worker pool used by the analysis phases.
//!
//! Tasks flow through a bounded crossbeam channel (capacity `2 × width`) to a
//! fixed set of scoped worker threads; results come back tagged with their
//! input index so `execute` returns them in submission order. Workers observe
//! cancellation at task boundaries only — the inner traversals are bounded by
//! depth and sample size and finish on their own.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded};

use crate::config::{ProgressCallback, ProgressEvent};
use crate::errors::HprofRetainError;

const PROGRESS_TICK: Duration = Duration::from_millis(500);

/// Cooperative cancellation flag plus an optional absolute deadline.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// The error a task reports when it stops at this token.
    pub fn to_error(&self, phase: &str) -> HprofRetainError {
        if self.cancelled.load(Ordering::Acquire) {
            HprofRetainError::Cancelled {
                phase: phase.to_string(),
            }
        } else {
            HprofRetainError::DeadlineExceeded {
                phase: phase.to_string(),
            }
        }
    }
}

pub struct WorkerPool {
    width: usize,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(width: usize, cancel: CancellationToken) -> Self {
        Self {
            width: width.max(1),
            cancel,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Runs `worker` over every item, returning results in input order.
    ///
    /// A failing task does not stop its siblings; each slot carries its own
    /// result. Items not attempted because of cancellation report the
    /// cancellation error.
    pub fn execute<I, O, F>(
        &self,
        items: Vec<I>,
        phase: &'static str,
        worker: F,
    ) -> Vec<Result<O, HprofRetainError>>
    where
        I: Send,
        O: Send,
        F: Fn(I) -> Result<O, HprofRetainError> + Sync,
    {
        let total = items.len();
        if total == 0 {
            return Vec::new();
        }
        let (task_tx, task_rx) = bounded::<(usize, I)>(self.width * 2);
        let (result_tx, result_rx) = unbounded::<(usize, Result<O, HprofRetainError>)>();

        let mut slots: Vec<Option<Result<O, HprofRetainError>>> =
            (0..total).map(|_| None).collect();

        thread::scope(|s| {
            for _ in 0..self.width {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                let worker = &worker;
                let cancel = &self.cancel;
                s.spawn(move || {
                    while let Ok((idx, item)) = task_rx.recv() {
                        let result = if cancel.is_cancelled() {
                            Err(cancel.to_error(phase))
                        } else {
                            // a panicking task fails alone; siblings keep going
                            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                                worker(item)
                            }))
                            .unwrap_or_else(|panic| {
                                Err(HprofRetainError::WorkerPanic {
                                    message: panic_message(&panic),
                                })
                            })
                        };
                        if result_tx.send((idx, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(task_rx);
            drop(result_tx);

            for pair in items.into_iter().enumerate() {
                if task_tx.send(pair).is_err() {
                    break;
                }
            }
            drop(task_tx);

            while let Ok((idx, result)) = result_rx.recv() {
                slots[idx] = Some(result);
            }
        });

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(self.cancel.to_error(phase))))
            .collect()
    }

    /// Maps fixed-size chunks of `items` in parallel and folds the partial
    /// results single-threaded.
    pub fn reduce_chunks<I, R, F, M>(
        &self,
        items: Vec<I>,
        chunk_size: usize,
        phase: &'static str,
        map: F,
        mut merge: M,
    ) -> Result<R, HprofRetainError>
    where
        I: Send,
        R: Send + Default,
        F: Fn(Vec<I>) -> R + Sync,
        M: FnMut(R, R) -> R,
    {
        let chunks = split_into_chunks(items, chunk_size.max(1));
        let partials = self.execute(chunks, phase, |chunk| Ok(map(chunk)));
        let mut acc = R::default();
        for partial in partials {
            acc = merge(acc, partial?);
        }
        Ok(acc)
    }

    /// Key-value aggregation: each worker folds its chunk into a local map,
    /// the local maps are merged at the end with `combine`.
    pub fn aggregate_map<I, K, V, F, C>(
        &self,
        items: Vec<I>,
        phase: &'static str,
        fold: F,
        combine: C,
    ) -> Result<ahash::AHashMap<K, V>, HprofRetainError>
    where
        I: Send,
        K: Send + Eq + std::hash::Hash,
        V: Send,
        F: Fn(&mut ahash::AHashMap<K, V>, I) + Sync,
        C: Fn(&mut V, V),
    {
        let per_worker = items.len().div_ceil(self.width).max(1);
        let chunks = split_into_chunks(items, per_worker);
        let locals = self.execute(chunks, phase, |chunk| {
            let mut local = ahash::AHashMap::new();
            for item in chunk {
                fold(&mut local, item);
            }
            Ok(local)
        });
        let mut merged: ahash::AHashMap<K, V> = ahash::AHashMap::new();
        for local in locals {
            for (key, value) in local? {
                match merged.entry(key) {
                    std::collections::hash_map::Entry::Occupied(mut occupied) => {
                        combine(occupied.get_mut(), value);
                    }
                    std::collections::hash_map::Entry::Vacant(vacant) => {
                        vacant.insert(value);
                    }
                }
            }
        }
        Ok(merged)
    }

    /// Runs `f` over every item, bumping `counter` once per completed item.
    pub fn for_each_counted<I, F>(
        &self,
        items: Vec<I>,
        phase: &'static str,
        counter: &AtomicUsize,
        f: F,
    ) -> Result<(), HprofRetainError>
    where
        I: Send,
        F: Fn(I) + Sync,
    {
        let results = self.execute(items, phase, |item| {
            f(item);
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
        for result in results {
            result?;
        }
        Ok(())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

fn split_into_chunks<I>(items: Vec<I>, chunk_size: usize) -> Vec<Vec<I>> {
    let mut chunks = Vec::with_capacity(items.len().div_ceil(chunk_size.max(1)));
    let mut current = Vec::with_capacity(chunk_size.min(items.len()));
    for item in items {
        current.push(item);
        if current.len() == chunk_size {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Ticks the user's progress callback at ~500 ms intervals while a phase
/// increments the shared counter.
pub struct ProgressTracker {
    counter: Arc<AtomicUsize>,
    done: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ProgressTracker {
    pub fn start(
        phase: &'static str,
        total: usize,
        callback: Option<ProgressCallback>,
    ) -> Self {
        let counter = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicBool::new(false));
        let handle = callback.map(|callback| {
            let counter = Arc::clone(&counter);
            let done = Arc::clone(&done);
            thread::Builder::new()
                .name("hprof-progress".to_string())
                .spawn(move || {
                    while !done.load(Ordering::Acquire) {
                        thread::sleep(PROGRESS_TICK);
                        callback(ProgressEvent {
                            phase,
                            done: counter.load(Ordering::Relaxed),
                            total,
                        });
                    }
                    // final tick so the consumer sees completion
                    callback(ProgressEvent {
                        phase,
                        done: counter.load(Ordering::Relaxed),
                        total,
                    });
                })
                .expect("progress thread should spawn")
        });
        Self {
            counter,
            done,
            handle,
        }
    }

    pub fn counter(&self) -> &Arc<AtomicUsize> {
        &self.counter
    }

    pub fn finish(mut self) {
        self.done.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap_or_default();
        }
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.done.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap_or_default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_preserves_input_order() {
        let pool = WorkerPool::new(4, CancellationToken::new());
        let items: Vec<u64> = (0..100).collect();
        let results = pool.execute(items, "test", |n| Ok(n * 2));
        let doubled: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(doubled, (0..100).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn execute_collects_errors_without_stopping_siblings() {
        let pool = WorkerPool::new(2, CancellationToken::new());
        let results = pool.execute(vec![1u64, 2, 3, 4], "test", |n| {
            if n == 2 {
                Err(HprofRetainError::InvalidArgument {
                    message: "boom".to_string(),
                })
            } else {
                Ok(n)
            }
        });
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
        assert!(results[3].is_ok());
    }

    #[test]
    fn cancelled_pool_reports_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pool = WorkerPool::new(2, cancel);
        let results = pool.execute(vec![1u64, 2], "test", Ok);
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(HprofRetainError::Cancelled { .. }))));
    }

    #[test]
    fn panicking_task_fails_alone() {
        let pool = WorkerPool::new(2, CancellationToken::new());
        let results = pool.execute(vec![1u64, 2, 3], "test", |n| {
            if n == 2 {
                panic!("task blew up");
            }
            Ok(n)
        });
        assert!(results[0].is_ok());
        assert!(matches!(
            &results[1],
            Err(HprofRetainError::WorkerPanic { message }) if message.contains("blew up")
        ));
        assert!(results[2].is_ok());
    }

    #[test]
    fn expired_deadline_reports_deadline_exceeded() {
        let cancel = CancellationToken::with_timeout(Some(Duration::from_millis(0)));
        assert!(cancel.is_cancelled());
        assert!(matches!(
            cancel.to_error("phase"),
            HprofRetainError::DeadlineExceeded { .. }
        ));
    }

    #[test]
    fn reduce_chunks_sums() {
        let pool = WorkerPool::new(3, CancellationToken::new());
        let total = pool
            .reduce_chunks(
                (1u64..=100).collect(),
                7,
                "test",
                |chunk| chunk.iter().sum::<u64>(),
                |a, b| a + b,
            )
            .unwrap();
        assert_eq!(total, 5050);
    }

    #[test]
    fn aggregate_map_merges_worker_locals() {
        let pool = WorkerPool::new(4, CancellationToken::new());
        let items: Vec<u64> = (0..1000).collect();
        let counts = pool
            .aggregate_map(
                items,
                "test",
                |local, n| {
                    *local.entry(n % 10).or_insert(0u64) += 1;
                },
                |a, b| *a += b,
            )
            .unwrap();
        assert_eq!(counts.len(), 10);
        assert!(counts.values().all(|&c| c == 100));
    }

    #[test]
    fn for_each_counted_counts_all_items() {
        let pool = WorkerPool::new(4, CancellationToken::new());
        let counter = AtomicUsize::new(0);
        pool.for_each_counted((0..250).collect::<Vec<u32>>(), "test", &counter, |_| {})
            .unwrap();
        assert_eq!(counter.load(Ordering::Relaxed), 250);
    }
}
