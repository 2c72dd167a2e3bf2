//! Bounded worker pool for per-file work.

use crossbeam::channel;

use crate::cancel::CancelToken;
use crate::error::{Result, SourcedexError};

/// Run `work` over `jobs` on `workers` threads.
///
/// At most `capacity` jobs wait in the queue at any time. Cancellation is
/// checked before every dispatch; once it trips no further job is handed
/// out and the call returns `Err(Cancelled)`. Results come back in job order.
pub fn run_pool<J, R, F>(
    jobs: Vec<J>,
    workers: usize,
    capacity: usize,
    cancel: &CancelToken,
    work: F,
) -> Result<Vec<R>>
where
    J: Send,
    R: Send,
    F: Fn(J) -> R + Sync,
{
    let total = jobs.len();
    if total == 0 {
        return Ok(Vec::new());
    }
    let workers = workers.clamp(1, total);
    let (job_tx, job_rx) = channel::bounded::<(usize, J)>(capacity.max(1));
    let (result_tx, result_rx) = channel::unbounded::<(usize, R)>();
    let mut cancelled = false;

    crossbeam::thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let work = &work;
            scope.spawn(move |_| {
                for (i, job) in job_rx.iter() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    if result_tx.send((i, work(job))).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);
        drop(job_rx);

        for (i, job) in jobs.into_iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if job_tx.send((i, job)).is_err() {
                break;
            }
        }
        drop(job_tx);
    })
    .map_err(|_| SourcedexError::Internal("indexing worker panicked".to_string()))?;

    if cancelled || cancel.is_cancelled() {
        return Err(SourcedexError::Cancelled);
    }
    let mut results: Vec<(usize, R)> = result_rx.try_iter().collect();
    if results.len() != total {
        return Err(SourcedexError::Internal(format!(
            "worker pool returned {} of {} results",
            results.len(),
            total
        )));
    }
    results.sort_by_key(|(i, _)| *i);
    Ok(results.into_iter().map(|(_, r)| r).collect())
}
