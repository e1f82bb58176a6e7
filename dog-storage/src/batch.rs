//! Bounded-parallelism runner for multi-record operations.
//!
//! A [`BatchExecutor`] owns a fixed pool of worker threads (a dedicated
//! multi-thread tokio runtime) that every batch shares. It is built once at
//! startup and handed to its consumers behind an `Arc`.
//!
//! ```rust,no_run
//! use dog_storage::{BatchExecutor, BatchUnit, StorageResult};
//!
//! # async fn run() -> StorageResult<()> {
//! let executor = BatchExecutor::new(8)?;
//! let units: Vec<BatchUnit<usize>> = (0..4)
//!     .map(|i| -> BatchUnit<usize> { Box::pin(async move { Ok(i * 2) }) })
//!     .collect();
//!
//! let report = executor.execute(units).await;
//! assert!(report.all_succeeded());
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, error, info, warn};

use crate::{StorageError, StorageResult};

/// Smallest pool the executor will run with
pub const MIN_POOL_SIZE: usize = 2;

/// Largest pool the executor will run with
pub const MAX_POOL_SIZE: usize = 50;

const THREAD_NAME_PREFIX: &str = "dog-storage-batch";

/// One independent unit of work
pub type BatchUnit<T> = BoxFuture<'static, StorageResult<T>>;

/// Runs batches of units on a shared, fixed-size worker pool
pub struct BatchExecutor {
    runtime: Option<Runtime>,
    handle: Handle,
    pool_size: usize,
    submitted: AtomicU64,
}

impl std::fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("pool_size", &self.pool_size)
            .field("submitted", &self.submitted())
            .finish()
    }
}

impl BatchExecutor {
    /// Create an executor with `requested` workers, clamped into
    /// [`MIN_POOL_SIZE`]..=[`MAX_POOL_SIZE`]
    pub fn new(requested: usize) -> StorageResult<Self> {
        let pool_size = clamp_pool_size(requested);
        info!(pool_size, "batch executor maximum number of threads");

        let counter = Arc::new(AtomicUsize::new(0));
        let runtime = Builder::new_multi_thread()
            .worker_threads(pool_size)
            .thread_name_fn(move || {
                let id = counter.fetch_add(1, Ordering::Relaxed) + 1;
                format!("{}-{}", THREAD_NAME_PREFIX, id)
            })
            .enable_all()
            .build()?;

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
            pool_size,
            submitted: AtomicU64::new(0),
        })
    }

    /// Number of worker threads after clamping
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Units handed to the worker pool since creation
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Run every unit and wait for all of them.
    ///
    /// Units after the first go to the worker pool; the first runs on the
    /// calling task alongside them. A failing or panicking unit never stops
    /// its siblings and never fails the call: its error is logged and lands in
    /// its own slot of the returned report.
    pub async fn execute<T: Send + 'static>(&self, units: Vec<BatchUnit<T>>) -> BatchReport<T> {
        let count = units.len();
        if count == 0 {
            return BatchReport::default();
        }

        debug!(count, "starting batch");
        let started = Instant::now();

        let mut units = units.into_iter();
        let first = units.next();
        let handles: Vec<_> = units.map(|unit| self.handle.spawn(unit)).collect();
        self.submitted.fetch_add(handles.len() as u64, Ordering::Relaxed);

        let mut outcomes = Vec::with_capacity(count);
        if let Some(first) = first {
            let outcome = match AssertUnwindSafe(first).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(StorageError::unit_failed(0, panic_message(panic.as_ref()))),
            };
            outcomes.push(outcome);
        }

        for (offset, handle) in handles.into_iter().enumerate() {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(e) => Err(StorageError::unit_failed(offset + 1, e.to_string())),
            };
            outcomes.push(outcome);
        }

        let report = BatchReport { outcomes };
        for (index, e) in report.failures() {
            error!(index, "batch unit failed: {}", e);
        }

        debug!(
            count,
            failed = report.failed(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch finished"
        );
        report
    }
}

impl Drop for BatchExecutor {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Clamp a requested pool size into the supported range
pub fn clamp_pool_size(requested: usize) -> usize {
    if requested > MAX_POOL_SIZE {
        warn!(requested, "batch executor cannot have more than {} threads", MAX_POOL_SIZE);
        MAX_POOL_SIZE
    } else if requested < MIN_POOL_SIZE {
        warn!(requested, "batch executor cannot have less than {} threads", MIN_POOL_SIZE);
        MIN_POOL_SIZE
    } else {
        requested
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

/// Per-unit outcomes of one batch, in submission order
#[derive(Debug)]
pub struct BatchReport<T> {
    outcomes: Vec<StorageResult<T>>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            outcomes: Vec::new(),
        }
    }
}

impl<T> BatchReport<T> {
    /// Number of units the batch ran
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Outcome of the unit submitted at `index`
    pub fn outcome(&self, index: usize) -> Option<&StorageResult<T>> {
        self.outcomes.get(index)
    }

    /// Number of units that returned `Ok`
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    /// Number of units that failed or panicked
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// True for an empty batch too
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.is_ok())
    }

    /// Index and error of every failed unit
    pub fn failures(&self) -> impl Iterator<Item = (usize, &StorageError)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(index, outcome)| outcome.as_ref().err().map(|e| (index, e)))
    }

    /// Consume the report, outcomes in submission order
    pub fn into_outcomes(self) -> Vec<StorageResult<T>> {
        self.outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_is_clamped() {
        assert_eq!(clamp_pool_size(0), MIN_POOL_SIZE);
        assert_eq!(clamp_pool_size(1), 2);
        assert_eq!(clamp_pool_size(10), 10);
        assert_eq!(clamp_pool_size(1000), 50);
    }

    #[test]
    fn panic_messages_are_extracted() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "panicked: boom");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "panicked: bang");

        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "panicked");
    }

    #[test]
    fn report_counts_outcomes() {
        let report = BatchReport {
            outcomes: vec![Ok(1), Err(StorageError::invalid("x")), Ok(3)],
        };
        assert_eq!(report.len(), 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert!(!report.all_succeeded());
        assert_eq!(report.failures().map(|(i, _)| i).collect::<Vec<_>>(), vec![1]);
    }
}
