//! `TablePool` drains the redistribution work queue with up to `P`
//! concurrent workers. Unlike `BatchPool`'s fan-out over a fixed
//! in-memory job list, the queue here lives in the database
//! (`expand.status_detail`); each worker repeatedly claims the next
//! unclaimed row through a caller-supplied closure until the queue is
//! empty or the shared [`CancellationToken`] trips.
//!
//! Named worker threads draining until a stop condition, panic-safe
//! execution, generalized to an external (not in-process) queue.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{error, warn};

use crate::cancellation::CancellationToken;

/// Summary of one drain pass.
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    pub items_processed: usize,
    pub items_cancelled: usize,
    pub had_errors: bool,
}

/// Runs `worker_count` threads against a claim/process loop until
/// `claim_next` returns `None` (queue drained) or `cancel` trips. Each
/// thread calls `make_worker_state` once to build whatever per-thread
/// state it needs (e.g. two database sessions) and passes it to every
/// `process` call on that thread for the thread's lifetime.
///
/// `claim_next` and `process` must themselves be safe to call from
/// multiple threads concurrently (claim_next typically does so via a
/// `SELECT ... FOR UPDATE SKIP LOCKED`-shaped query against the target
/// database; gpexpand-engine provides the real implementation).
pub fn drain<T, S, MakeState, ClaimNext, Process>(
    worker_count: usize,
    cancel: &CancellationToken,
    make_worker_state: MakeState,
    claim_next: ClaimNext,
    process: Process,
) -> DrainReport
where
    T: Send,
    S: Send,
    MakeState: Fn() -> S + Sync,
    ClaimNext: Fn(&mut S) -> Option<T> + Sync,
    Process: Fn(&mut S, T) -> Result<(), String> + Sync,
{
    let worker_count = worker_count.clamp(1, 96);
    let processed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let cancelled_count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let had_errors = Arc::new(std::sync::atomic::AtomicBool::new(false));

    std::thread::scope(|scope| {
        for worker_id in 0..worker_count {
            let cancel = cancel.clone();
            let make_worker_state = &make_worker_state;
            let claim_next = &claim_next;
            let process = &process;
            let processed = Arc::clone(&processed);
            let cancelled_count = Arc::clone(&cancelled_count);
            let had_errors = Arc::clone(&had_errors);

            scope.spawn(move || {
                let mut state = make_worker_state();
                loop {
                    if cancel.is_cancelled() {
                        cancelled_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        break;
                    }
                    let item = match catch_unwind(AssertUnwindSafe(|| claim_next(&mut state))) {
                        Ok(item) => item,
                        Err(panic) => {
                            error!(target: "gpexpand::tablepool", worker_id, ?panic, "claim_next panicked");
                            had_errors.store(true, std::sync::atomic::Ordering::Relaxed);
                            break;
                        }
                    };
                    let Some(item) = item else {
                        break;
                    };
                    match catch_unwind(AssertUnwindSafe(|| process(&mut state, item))) {
                        Ok(Ok(())) => {
                            processed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        }
                        Ok(Err(reason)) => {
                            warn!(target: "gpexpand::tablepool", worker_id, reason, "table redistribution worker reported an error");
                            had_errors.store(true, std::sync::atomic::Ordering::Relaxed);
                        }
                        Err(panic) => {
                            error!(target: "gpexpand::tablepool", worker_id, ?panic, "process panicked");
                            had_errors.store(true, std::sync::atomic::Ordering::Relaxed);
                        }
                    }
                }
            });
        }
    });

    DrainReport {
        items_processed: processed.load(std::sync::atomic::Ordering::Relaxed),
        items_cancelled: cancelled_count.load(std::sync::atomic::Ordering::Relaxed),
        had_errors: had_errors.load(std::sync::atomic::Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn drain_processes_every_item_exactly_once() {
        let queue: Mutex<Vec<u32>> = Mutex::new((0..50).collect());
        let seen: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();

        let seen_for_process = Arc::clone(&seen);
        let report = drain(
            4,
            &cancel,
            || (),
            |_state| queue.lock().unwrap().pop(),
            move |_state, item| {
                seen_for_process.lock().unwrap().push(item);
                Ok(())
            },
        );

        assert_eq!(report.items_processed, 50);
        assert!(!report.had_errors);
        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn drain_stops_promptly_when_cancelled() {
        let queue: Mutex<Vec<u32>> = Mutex::new((0..10_000).collect());
        let cancel = CancellationToken::new();
        let cancel_after_one = cancel.clone();

        let report = drain(
            2,
            &cancel,
            || (),
            move |_state| {
                let next = queue.lock().unwrap().pop();
                if next == Some(9_999) {
                    cancel_after_one.cancel();
                }
                next
            },
            |_state, _item: u32| Ok(()),
        );

        assert!(report.items_processed < 10_000);
    }

    #[test]
    fn drain_records_errors_without_aborting_other_workers() {
        let queue: Mutex<Vec<u32>> = Mutex::new((0..20).collect());
        let cancel = CancellationToken::new();

        let report = drain(
            3,
            &cancel,
            || (),
            |_state| queue.lock().unwrap().pop(),
            |_state, item: u32| {
                if item % 7 == 0 {
                    Err(format!("simulated failure on {item}"))
                } else {
                    Ok(())
                }
            },
        );

        assert!(report.had_errors);
        assert_eq!(report.items_processed, 20 - (0..20).filter(|i| i % 7 == 0).count());
    }
}
