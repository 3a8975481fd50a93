//! Bounded worker pool with index-preserving results.
//!
//! Jobs are pushed onto a shared queue; each worker pulls `(index, job)`
//! pairs and sends back `(index, result)`. The collector writes every result
//! into its reserved slot, so output order never depends on scheduling.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::errors::{CodemapError, Result};

/// Cooperative cancellation flag shared between a caller and its jobs.
///
/// Checked at job boundaries only; a running job always finishes.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the token has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CodemapError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    max_workers: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        let max_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_workers(max_workers)
    }
}

impl WorkerPool {
    /// Pool sized to the available hardware parallelism.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    /// Workers actually spawned for `jobs` jobs; never more than the job count.
    pub fn workers_for(&self, jobs: usize) -> usize {
        self.max_workers.min(jobs).max(1)
    }

    /// Run every job and return results in submission order.
    ///
    /// The first job error stops the remaining workers at their next job
    /// boundary and is returned. A fired `cancel` token yields
    /// `CodemapError::Cancelled`.
    pub fn run<J, R, F>(&self, jobs: Vec<J>, cancel: &CancellationToken, f: F) -> Result<Vec<R>>
    where
        J: Send,
        R: Send,
        F: Fn(J) -> Result<R> + Sync,
    {
        cancel.check()?;
        let total = jobs.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let workers = self.workers_for(total);
        if workers == 1 {
            return run_inline(jobs, cancel, f);
        }

        debug!("Dispatching {} jobs to {} workers", total, workers);

        let (job_tx, job_rx) = unbounded::<(usize, J)>();
        for (index, job) in jobs.into_iter().enumerate() {
            if job_tx.send((index, job)).is_err() {
                break;
            }
        }
        drop(job_tx);

        let (result_tx, result_rx) = unbounded::<(usize, R)>();
        let failed = AtomicBool::new(false);
        let first_error: Mutex<Option<CodemapError>> = Mutex::new(None);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let f = &f;
                let failed = &failed;
                let first_error = &first_error;
                scope.spawn(move || worker_loop(job_rx, result_tx, f, cancel, failed, first_error));
            }
        });
        drop(result_tx);

        if let Some(err) = first_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
        {
            return Err(err);
        }
        cancel.check()?;

        let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
        for (index, result) in result_rx.iter() {
            slots[index] = Some(result);
        }

        let got = slots.iter().filter(|slot| slot.is_some()).count();
        if got != total {
            return Err(CodemapError::IncompleteResults {
                expected: total,
                got,
            });
        }
        Ok(slots.into_iter().flatten().collect())
    }
}

fn worker_loop<J, R, F>(
    jobs: Receiver<(usize, J)>,
    results: Sender<(usize, R)>,
    f: &F,
    cancel: &CancellationToken,
    failed: &AtomicBool,
    first_error: &Mutex<Option<CodemapError>>,
) where
    F: Fn(J) -> Result<R>,
{
    while let Ok((index, job)) = jobs.recv() {
        if failed.load(Ordering::SeqCst) || cancel.is_cancelled() {
            return;
        }
        match f(job) {
            Ok(result) => {
                if results.send((index, result)).is_err() {
                    return;
                }
            }
            Err(err) => {
                failed.store(true, Ordering::SeqCst);
                let mut slot = first_error.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.is_none() {
                    *slot = Some(err);
                }
                return;
            }
        }
    }
}

fn run_inline<J, R, F>(jobs: Vec<J>, cancel: &CancellationToken, f: F) -> Result<Vec<R>>
where
    F: Fn(J) -> Result<R>,
{
    let mut results = Vec::with_capacity(jobs.len());
    for job in jobs {
        cancel.check()?;
        results.push(f(job)?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_results_keep_submission_order() {
        let pool = WorkerPool::with_workers(4);
        let jobs: Vec<u64> = (0..32).collect();
        let out = pool
            .run(jobs, &CancellationToken::new(), |n| {
                // Later jobs finish first.
                std::thread::sleep(Duration::from_millis(32 - n));
                Ok(n * 10)
            })
            .unwrap();
        let expected: Vec<u64> = (0..32).map(|n| n * 10).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_empty_job_list() {
        let pool = WorkerPool::with_workers(4);
        let out: Vec<u32> = pool
            .run(Vec::<u32>::new(), &CancellationToken::new(), Ok)
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_single_job_runs_inline() {
        let pool = WorkerPool::with_workers(8);
        let caller = std::thread::current().id();
        let out = pool
            .run(vec![1], &CancellationToken::new(), |n| {
                Ok((n, std::thread::current().id()))
            })
            .unwrap();
        assert_eq!(out[0].0, 1);
        assert_eq!(out[0].1, caller);
    }

    #[test]
    fn test_never_more_workers_than_jobs() {
        let pool = WorkerPool::with_workers(16);
        assert_eq!(pool.workers_for(3), 3);
        assert_eq!(pool.workers_for(0), 1);

        let seen = Mutex::new(HashSet::new());
        pool.run(vec![(); 3], &CancellationToken::new(), |_| {
            seen.lock().unwrap().insert(std::thread::current().id());
            std::thread::sleep(Duration::from_millis(5));
            Ok(())
        })
        .unwrap();
        assert!(seen.lock().unwrap().len() <= 3);
    }

    #[test]
    fn test_first_error_stops_remaining_jobs() {
        let pool = WorkerPool::with_workers(2);
        let ran = AtomicUsize::new(0);
        let result = pool.run((0..200).collect::<Vec<u32>>(), &CancellationToken::new(), |n| {
            ran.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                return Err(CodemapError::Config("boom".to_string()));
            }
            std::thread::sleep(Duration::from_millis(1));
            Ok(n)
        });
        assert!(matches!(result, Err(CodemapError::Config(_))));
        assert!(ran.load(Ordering::SeqCst) < 200);
    }

    #[test]
    fn test_cancelled_token_returns_cancelled() {
        let pool = WorkerPool::with_workers(4);
        let token = CancellationToken::new();
        token.cancel();
        let result = pool.run(vec![1, 2, 3], &token, Ok);
        assert!(matches!(result, Err(CodemapError::Cancelled)));
    }

    #[test]
    fn test_cancel_mid_run() {
        let pool = WorkerPool::with_workers(2);
        let token = CancellationToken::new();
        let ran = AtomicUsize::new(0);
        let result = pool.run((0..100).collect::<Vec<u32>>(), &token, |n| {
            ran.fetch_add(1, Ordering::SeqCst);
            if n == 3 {
                token.cancel();
            }
            std::thread::sleep(Duration::from_millis(1));
            Ok(n)
        });
        assert!(result.unwrap_err().is_cancelled());
        assert!(ran.load(Ordering::SeqCst) < 100);
    }
}
