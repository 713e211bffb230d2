//! Fixed-size pools of workers draining a shared work queue.
//!
//! A pool is started with [`run`], which spawns exactly `n` tasks each executing the supplied
//! work function with its worker index. Work functions typically loop on a [`WorkQueue`] until
//! it has been closed by the producer and drained. Workers share nothing beyond what the work
//! function captures.

use crate::Result;
use ohno::IntoAppError;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;

const LOG_TARGET: &str = "   workers";

/// Producer half of an unbounded work queue. Dropping it closes the queue.
#[derive(Debug)]
pub struct WorkSender<T>(mpsc::UnboundedSender<T>);

impl<T> WorkSender<T> {
    pub fn push(&self, item: T) -> Result<()> {
        self.0.send(item).ok().into_app_err("work queue has no remaining workers")
    }
}

/// Consumer half of a work queue, shared by every worker of a pool.
#[derive(Debug)]
pub struct WorkQueue<T>(Arc<Mutex<mpsc::UnboundedReceiver<T>>>);

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> WorkQueue<T> {
    /// Take the next item, or `None` once the queue is closed and empty.
    pub async fn next(&self) -> Option<T> {
        self.0.lock().await.recv().await
    }
}

/// Create an unbounded work queue.
#[must_use]
pub fn work_queue<T>() -> (WorkSender<T>, WorkQueue<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (WorkSender(tx), WorkQueue(Arc::new(Mutex::new(rx))))
}

/// Handle to a running pool.
#[derive(Debug)]
pub struct WaitHandle {
    workers: JoinSet<Result<()>>,
}

impl WaitHandle {
    /// Wait for every worker to return.
    ///
    /// All workers are always awaited; the first failure, if any, is returned afterwards.
    pub async fn wait(mut self) -> Result<()> {
        let mut first_error = None;
        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined.into_app_err("worker task panicked").and_then(core::convert::identity) {
                log::debug!(target: LOG_TARGET, "Worker failed: {e:#}");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

/// Start `n` workers, each running `work(index)`.
pub fn run<F, Fut>(n: usize, work: F) -> WaitHandle
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    log::debug!(target: LOG_TARGET, "Starting {n} workers");
    let mut workers = JoinSet::new();
    for index in 0..n {
        let _ = workers.spawn(work(index));
    }

    WaitHandle { workers }
}
