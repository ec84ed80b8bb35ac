//! Bounded worker pool draining a shared queue.
//!
//! N long-lived tasks pop from one queue until it is empty. A failing item
//! never stops its worker or its siblings, and `run` only returns once every
//! worker has finished.

use log::{debug, error};
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// What a pool run produced. Positions refer to the order items were given in.
#[derive(Debug)]
pub struct Drained<T, R> {
    /// Results in completion order.
    pub completed: Vec<(usize, R)>,
    /// Items never started, because the run was cancelled or every worker died.
    pub cancelled: Vec<(usize, T)>,
}

impl<T, R> Drained<T, R> {
    /// Positions that neither completed nor were cancelled, e.g. because
    /// their worker panicked mid-item.
    pub fn unaccounted(&self, submitted: usize) -> Vec<usize> {
        let seen: HashSet<usize> = self
            .completed
            .iter()
            .map(|(i, _)| *i)
            .chain(self.cancelled.iter().map(|(i, _)| *i))
            .collect();
        (0..submitted).filter(|i| !seen.contains(i)).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Runs `work` over `items` with at most `concurrency` calls in flight.
    ///
    /// Once `cancel` fires, workers stop taking new items; whatever is still
    /// queued comes back in [`Drained::cancelled`].
    pub async fn run<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        cancel: &CancellationToken,
        work: F,
    ) -> Drained<T, R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(usize, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let worker_count = self.concurrency.min(items.len());
        let queue: Arc<Mutex<VecDeque<(usize, T)>>> =
            Arc::new(Mutex::new(items.into_iter().enumerate().collect()));
        let results: Arc<Mutex<Vec<(usize, R)>>> = Arc::new(Mutex::new(Vec::new()));
        let work = Arc::new(work);

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            let queue = queue.clone();
            let results = results.clone();
            let work = work.clone();
            let cancel = cancel.clone();

            workers.spawn(async move {
                debug!("Worker {} started", worker_id);
                let mut handled = 0usize;
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }

                    let next = queue.lock().await.pop_front();
                    let Some((position, item)) = next else {
                        break;
                    };

                    let result = work(position, item).await;
                    results.lock().await.push((position, result));
                    handled += 1;
                }
                debug!("Worker {} finished after {} items", worker_id, handled);
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Worker task failed: {}", e);
            }
        }

        let completed = std::mem::take(&mut *results.lock().await);
        let cancelled = queue.lock().await.drain(..).collect();
        Drained {
            completed,
            cancelled,
        }
    }
}
