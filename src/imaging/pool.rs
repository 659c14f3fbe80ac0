//! Fixed-size worker pool for the resampling passes.
//!
//! A pass hands the pool its whole output buffer. The buffer is cut into
//! rows, rows are dealt into `N` partitions by `row % N`, partitions
//! `1..N` are spawned onto the pool and partition 0 runs on the calling
//! thread. The call returns once every partition has finished, so the
//! caller can read the buffer immediately afterwards.
//!
//! Every partition owns disjoint `&mut` row slices: there is no locking and
//! no shared mutable state between workers.

use super::error::ResampleError;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::OnceLock;
use tracing::{debug, warn};

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    threads: usize,
}

static SHARED: OnceLock<Result<WorkerPool, String>> = OnceLock::new();

impl WorkerPool {
    /// Create a pool with exactly `threads` workers (at least one).
    pub fn new(threads: usize) -> Result<Self, ResampleError> {
        let threads = threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("resample-{i}"))
            .build()
            .map_err(|e| ResampleError::ResamplingFailed(format!("worker pool: {e}")))?;
        debug!(threads, "worker pool created");
        Ok(Self { pool, threads })
    }

    /// Number of partitions each pass is split into.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// The process-wide pool, created on first use with one worker per
    /// available core unless [`install_shared`](Self::install_shared) ran
    /// first.
    pub fn shared() -> Result<&'static WorkerPool, ResampleError> {
        SHARED
            .get_or_init(|| WorkerPool::new(default_threads()).map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| ResampleError::ResamplingFailed(e.clone()))
    }

    /// Create the process-wide pool with `threads` workers. Only the first
    /// call (or first [`shared`](Self::shared) call) decides the size.
    pub fn install_shared(threads: usize) -> Result<&'static WorkerPool, ResampleError> {
        let mut created = false;
        let entry = SHARED.get_or_init(|| {
            created = true;
            WorkerPool::new(threads).map_err(|e| e.to_string())
        });
        let pool = entry
            .as_ref()
            .map_err(|e| ResampleError::ResamplingFailed(e.clone()))?;
        if !created && pool.threads != threads.max(1) {
            warn!(
                requested = threads,
                actual = pool.threads,
                "shared worker pool already running; keeping its size"
            );
        }
        Ok(pool)
    }

    /// Run `f(row_index, row)` over every `row_len`-byte row of `buf`,
    /// spread across the pool. Blocks until all rows are done.
    ///
    /// A panic in any worker is reported as
    /// [`ResamplingFailed`](ResampleError::ResamplingFailed); the contents
    /// of `buf` are unspecified in that case.
    pub fn for_each_row<F>(&self, buf: &mut [u8], row_len: usize, f: F) -> Result<(), ResampleError>
    where
        F: Fn(usize, &mut [u8]) + Sync,
    {
        if row_len == 0 || buf.is_empty() {
            return Ok(());
        }
        if buf.len() % row_len != 0 {
            return Err(ResampleError::InvalidArgument(format!(
                "buffer of {} bytes is not a whole number of {row_len}-byte rows",
                buf.len()
            )));
        }

        let partitions = self.threads;
        let mut buckets: Vec<Vec<(usize, &mut [u8])>> =
            (0..partitions).map(|_| Vec::new()).collect();
        for (y, row) in buf.chunks_exact_mut(row_len).enumerate() {
            buckets[y % partitions].push((y, row));
        }

        let f = &f;
        catch_unwind(AssertUnwindSafe(|| {
            self.pool.in_place_scope(|scope| {
                let mut buckets = buckets.into_iter();
                let own = buckets.next();
                for bucket in buckets {
                    scope.spawn(move |_| run_partition(bucket, f));
                }
                if let Some(bucket) = own {
                    run_partition(bucket, f);
                }
            })
        }))
        .map_err(|payload| ResampleError::ResamplingFailed(panic_message(payload.as_ref())))
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .finish()
    }
}

fn run_partition<F>(rows: Vec<(usize, &mut [u8])>, f: &F)
where
    F: Fn(usize, &mut [u8]),
{
    for (y, row) in rows {
        f(y, row);
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".to_string()
    }
}
