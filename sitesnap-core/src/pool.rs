//! Bounded worker pool and progress reporting.
//!
//! A [`WorkerPool`] runs one *wave* of tasks with at most `concurrency` in
//! flight and returns once every task has finished. Task results are
//! collected per task; the caller decides what to do with failures after the
//! wave has drained. Abort flags are consulted each time a new task is about
//! to be dispatched; tasks already in flight always run to completion.
//!
//! Waves may nest (snapshot tasks run their own upload waves). Uploads from
//! every wave share one [`UploadSlot`] budget of `concurrency` permits, so
//! the total number of uploads in flight never exceeds the pool size.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::stream::{self, StreamExt};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::info;

pub const DEFAULT_THREADS: usize = 10;
pub const MAX_THREADS: usize = 50;

/// Outcome of one task in a wave.
#[derive(Debug, PartialEq, Eq)]
pub enum Dispatch<T> {
    Ran(T),
    /// Never started because the abort flag was already set.
    Skipped,
}

/// Held for the duration of one upload.
pub type UploadSlot<'a> = SemaphorePermit<'a>;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    concurrency: usize,
    uploads: Arc<Semaphore>,
}

impl WorkerPool {
    /// Clamped to `1..=MAX_THREADS`.
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.clamp(1, MAX_THREADS);
        Self {
            concurrency,
            uploads: Arc::new(Semaphore::new(concurrency)),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Waits for one of the pool-wide upload permits.
    ///
    /// Returns `None` only if the semaphore was closed, which this pool never
    /// does.
    pub async fn upload_slot(&self) -> Option<UploadSlot<'_>> {
        self.uploads.acquire().await.ok()
    }

    /// Runs `task` for every item and waits for all of them.
    ///
    /// An item is skipped instead of started once any flag in `abort` is set.
    /// Results come back in completion order.
    pub async fn run<I, F, Fut, T>(
        &self,
        items: I,
        abort: &[&AtomicBool],
        task: F,
    ) -> Vec<Dispatch<T>>
    where
        I: IntoIterator,
        F: Fn(I::Item) -> Fut,
        Fut: Future<Output = T>,
    {
        let task = &task;
        stream::iter(items)
            .map(|item| async move {
                if abort.iter().any(|flag| flag.load(Ordering::Acquire)) {
                    return Dispatch::Skipped;
                }
                Dispatch::Ran(task(item).await)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_THREADS)
    }
}

/// Receives count-based progress updates.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, completed: usize, total: usize, label: &str);

    /// Called as snapshot `index` (1-based) of `total` is dispatched.
    fn on_snapshot(&self, _index: usize, _total: usize, _url: &str) {}
}

/// Logs progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn on_progress(&self, completed: usize, total: usize, label: &str) {
        info!(completed, total, resource_url = label, "[UPLOAD] Progress");
    }

    fn on_snapshot(&self, index: usize, total: usize, url: &str) {
        info!(index, total, url, "[SNAPSHOT] Uploading snapshot");
    }
}

/// Shared counter for one wave; updates are serialised so the sink always
/// sees a monotonically increasing count.
pub struct Progress<'a> {
    total: usize,
    completed: Mutex<usize>,
    sink: &'a dyn ProgressSink,
}

impl<'a> Progress<'a> {
    pub fn new(total: usize, sink: &'a dyn ProgressSink) -> Self {
        Self {
            total,
            completed: Mutex::new(0),
            sink,
        }
    }

    pub fn increment(&self, label: &str) {
        let mut completed = self
            .completed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *completed += 1;
        self.sink.on_progress(*completed, self.total, label);
    }

    pub fn completed(&self) -> usize {
        *self
            .completed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
