//! Fixed size worker pool used by every concurrent executor.
//!
//! ```text
//!                 +----------+
//!   input  -----> |  shared  | ---> worker 1 ---+
//!   (bounded)     | receiver | ---> worker 2 ---+---> output (bounded)
//!                 +----------+ ---> worker N ---+
//!                       ^               |
//!                       |   cancel      v
//!                 CancellationToken <-- first error slot
//! ```
//!
//! All workers pull from one receiver, so whichever worker is idle takes the next element. The
//! first worker to fail (or panic) cancels the token and parks its error in a single slot, later
//! errors are logged and dropped. Peers observe the cancellation at their next receive or send.
//! Dropping the pool cancels the token as well. Downstream channels close on their own once the
//! last worker drops its sender.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

/// What a worker sees of the pool: its id, the shared input and the cancellation token.
pub(crate) struct WorkerContext<I> {
    pub(crate) id: usize,
    input: Arc<Mutex<ReceiverStream<I>>>,
    cln_token: CancellationToken,
}

impl<I> WorkerContext<I> {
    /// Next element of the shared input, `None` once the input is exhausted or the pool is
    /// cancelled.
    pub(crate) async fn next(&self) -> Option<I> {
        tokio::select! {
            biased;
            _ = self.cln_token.cancelled() => None,
            item = async { self.input.lock().await.next().await } => item,
        }
    }

    /// Sends to a downstream channel, waiting while it is full. A send racing with the
    /// cancellation is dropped.
    pub(crate) async fn forward<O>(&self, tx: &mpsc::Sender<O>, item: O) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cln_token.cancelled() => Ok(()),
            sent = tx.send(item) => sent.map_err(|_| {
                Error::Stream(format!("worker {} found the downstream receiver dropped", self.id))
            }),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cln_token.is_cancelled()
    }
}

/// Reports errors into the pool's first error slot and cancels the pool.
#[derive(Clone)]
pub(crate) struct ErrorReporter {
    error_tx: mpsc::Sender<Error>,
    cln_token: CancellationToken,
}

impl ErrorReporter {
    pub(crate) fn report(&self, error: Error) {
        self.cln_token.cancel();
        if let Err(e) = self.error_tx.try_send(error) {
            // the slot already holds the first error
            warn!(error = ?e.into_inner(), "dropping error, pool is already failing");
        }
    }
}

pub(crate) struct WorkerPool {
    workers: JoinSet<()>,
    reporter: ErrorReporter,
    error_rx: mpsc::Receiver<Error>,
    // workers run detached from the JoinSet, dropping the pool must still stop them
    _cancel_on_drop: DropGuard,
}

impl WorkerPool {
    /// Spawns `size` workers sharing `input`. Each worker is created by calling `worker` with
    /// its own [WorkerContext]; `worker` itself is dropped once every worker is spawned, so any
    /// senders it captured live only as long as the workers holding clones of them.
    pub(crate) fn spawn<I, F, Fut>(
        size: usize,
        input: ReceiverStream<I>,
        cln_token: CancellationToken,
        worker: F,
    ) -> Self
    where
        I: Send + 'static,
        F: Fn(WorkerContext<I>) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (error_tx, error_rx) = mpsc::channel(1);
        let reporter = ErrorReporter {
            error_tx,
            cln_token: cln_token.clone(),
        };
        let input = Arc::new(Mutex::new(input));

        let mut workers = JoinSet::new();
        for id in 0..size.max(1) {
            let ctx = WorkerContext {
                id,
                input: Arc::clone(&input),
                cln_token: cln_token.clone(),
            };
            // a panic in caller code must cancel the peers right away, not only at join
            let task = tokio::spawn(worker(ctx));
            let reporter = reporter.clone();
            workers.spawn(async move {
                match task.await {
                    Ok(Ok(())) => debug!(worker = id, "worker finished"),
                    Ok(Err(e)) => {
                        error!(worker = id, ?e, "worker failed, cancelling the pool");
                        reporter.report(e);
                    }
                    Err(e) => {
                        error!(worker = id, ?e, "worker panicked, cancelling the pool");
                        reporter.report(e.into());
                    }
                }
            });
        }

        Self {
            workers,
            reporter,
            error_rx,
            _cancel_on_drop: cln_token.drop_guard(),
        }
    }

    /// Reporter for stages running next to the workers (e.g. a merge stage) so their errors
    /// take part in the same first-error-wins race.
    pub(crate) fn reporter(&self) -> ErrorReporter {
        self.reporter.clone()
    }

    /// Waits for every worker to exit and returns the first reported error, if any.
    pub(crate) async fn join(mut self) -> Result<()> {
        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                error!(?e, "worker did not complete");
                self.reporter.report(e.into());
            }
        }
        match self.error_rx.try_recv() {
            Ok(e) => Err(e),
            Err(_) => Ok(()),
        }
    }
}

/// Pushes `items` into `tx` until they run out, the token is cancelled or the receiver is
/// gone. `tx` is dropped on return, which closes the work channel.
pub(crate) fn spawn_feeder<I, It>(
    items: It,
    tx: mpsc::Sender<I>,
    cln_token: CancellationToken,
) -> JoinHandle<()>
where
    I: Send + 'static,
    It: IntoIterator<Item = I> + Send + 'static,
    It::IntoIter: Send,
{
    tokio::spawn(async move {
        let mut fed = 0usize;
        for item in items {
            tokio::select! {
                biased;
                _ = cln_token.cancelled() => {
                    debug!(fed, "feeder cancelled");
                    return;
                }
                sent = tx.send(item) => {
                    if sent.is_err() {
                        debug!(fed, "work channel closed, stopping feeder");
                        return;
                    }
                }
            }
            fed += 1;
        }
        debug!(fed, "feeder done");
    })
}
