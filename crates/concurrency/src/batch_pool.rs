//! `BatchPool` fans out a set of blocking remote-command operations to
//! a fixed pool of worker threads, barrier-joins on all of them, and
//! reports per-command results. Fixed worker threads, FIFO queue, RAII
//! active-task bookkeeping, panic-safe execution, with no priority
//! queue — every command in a batch is equal priority — and a
//! `run_batch` barrier built on top of submit+drain.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::error;

struct Job {
    index: usize,
    work: Box<dyn FnOnce() + Send>,
}

struct PoolInner {
    queue: Mutex<std::collections::VecDeque<Job>>,
    work_ready: Condvar,
    drain_cond: Condvar,
    shutdown: AtomicBool,
    queue_depth: AtomicUsize,
    active_tasks: AtomicUsize,
}

/// Fixed-size worker pool used for fan-out/barrier-join remote-command
/// batches. `batch_size` is clamped to `[1, 128]` by the caller and
/// further adjusted down to the current segment count at startup;
/// this type itself just runs however many threads it's told to.
pub struct BatchPool {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl BatchPool {
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let inner = Arc::new(PoolInner {
            queue: Mutex::new(std::collections::VecDeque::new()),
            work_ready: Condvar::new(),
            drain_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            queue_depth: AtomicUsize::new(0),
            active_tasks: AtomicUsize::new(0),
        });

        let mut workers = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            let inner_clone = Arc::clone(&inner);
            let handle = std::thread::Builder::new()
                .name(format!("gpexpand-batch-{i}"))
                .spawn(move || worker_loop(&inner_clone))
                .expect("failed to spawn batch pool worker thread");
            workers.push(handle);
        }

        BatchPool {
            inner,
            workers: Mutex::new(workers),
        }
    }

    fn submit(&self, index: usize, work: impl FnOnce() + Send + 'static) {
        let job = Job {
            index,
            work: Box::new(work),
        };
        {
            let mut queue = self.inner.queue.lock();
            queue.push_back(job);
            self.inner.queue_depth.fetch_add(1, Ordering::Release);
        }
        self.inner.work_ready.notify_one();
    }

    fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while self.inner.queue_depth.load(Ordering::Acquire) > 0
            || self.inner.active_tasks.load(Ordering::Acquire) > 0
        {
            self.inner.drain_cond.wait(&mut queue);
        }
    }

    /// Runs every job to completion, fan-out then barrier-join, and
    /// returns results in the same order as `jobs`. `run_batch` is
    /// itself the barrier: it never returns until every command has
    /// finished. A job that panics leaves `None` in its slot instead of
    /// poisoning the batch — the caller inspects per-command results
    /// and halts on any failure itself.
    pub fn run_batch<T, F>(&self, jobs: Vec<F>) -> Vec<Option<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let n = jobs.len();
        let results: Arc<Mutex<Vec<Option<T>>>> = Arc::new(Mutex::new((0..n).map(|_| None).collect()));

        for (index, job) in jobs.into_iter().enumerate() {
            let results = Arc::clone(&results);
            self.submit(index, move || {
                let outcome = job();
                results.lock()[index] = Some(outcome);
            });
        }

        self.drain();

        Arc::try_unwrap(results)
            .unwrap_or_else(|arc| Mutex::new(std::mem::take(&mut arc.lock())))
            .into_inner()
    }

    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        {
            let _queue = self.inner.queue.lock();
            self.inner.work_ready.notify_all();
        }
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for BatchPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        let job = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    inner.queue_depth.fetch_sub(1, Ordering::Release);
                    inner.active_tasks.fetch_add(1, Ordering::Release);
                    break job;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let index = job.index;
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| (job.work)())) {
            error!(target: "gpexpand::batchpool", index, ?panic, "batch job panicked");
        }

        let prev_active = inner.active_tasks.fetch_sub(1, Ordering::Release);
        if prev_active == 1 && inner.queue_depth.load(Ordering::Acquire) == 0 {
            let _queue = inner.queue.lock();
            inner.drain_cond.notify_all();
        }
    }
}
