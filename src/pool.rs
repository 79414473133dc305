//! Bounded worker pool whose results come back in submission order.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};

/// Runs `work` over `items` on up to `workers` threads and returns the
/// results in input order.
///
/// The first error stops collection; outstanding tasks are abandoned once the
/// channels close.
pub fn try_run_ordered<T, R, E, F>(items: Vec<T>, workers: usize, work: F) -> Result<Vec<R>, E>
where
    T: Send,
    R: Send,
    E: Send,
    F: Fn(usize, T) -> Result<R, E> + Sync,
{
    let total = items.len();
    if total == 0 {
        return Ok(Vec::new());
    }
    let workers = workers.max(1).min(total);
    let work = &work;

    thread::scope(|scope| {
        let (task_tx, task_rx) = bounded::<(usize, T)>(workers * 2);
        let (result_tx, result_rx) = bounded::<(usize, Result<R, E>)>(workers * 2);

        for worker_id in 0..workers {
            let worker_rx = task_rx.clone();
            let worker_tx = result_tx.clone();
            scope.spawn(move || {
                for (task_id, item) in worker_rx.iter() {
                    tracing::trace!(worker_id, task_id, "worker picked up task");
                    if worker_tx.send((task_id, work(task_id, item))).is_err() {
                        break;
                    }
                }
            });
        }
        drop(task_rx);
        drop(result_tx);

        scope.spawn(move || {
            for task in items.into_iter().enumerate() {
                if task_tx.send(task).is_err() {
                    break;
                }
            }
        });

        let mut ready: BTreeMap<usize, R> = BTreeMap::new();
        let mut out = Vec::with_capacity(total);
        while out.len() < total {
            match result_rx.recv_timeout(Duration::from_secs(5)) {
                Ok((task_id, Ok(value))) => {
                    ready.insert(task_id, value);
                    while let Some(value) = ready.remove(&out.len()) {
                        out.push(value);
                    }
                }
                Ok((_, Err(err))) => return Err(err),
                Err(RecvTimeoutError::Timeout) => {
                    tracing::info!(
                        pending = total - out.len(),
                        oldest = out.len(),
                        "still waiting on worker results"
                    );
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(out)
    })
}

/// Infallible variant of [`try_run_ordered`].
pub fn run_ordered<T, R, F>(items: Vec<T>, workers: usize, work: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(usize, T) -> R + Sync,
{
    match try_run_ordered(items, workers, |task_id, item| {
        Ok::<R, Infallible>(work(task_id, item))
    }) {
        Ok(results) => results,
        Err(never) => match never {},
    }
}
