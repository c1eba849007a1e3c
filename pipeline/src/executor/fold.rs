use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::chain::OperationChain;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::executor::sequential;
use crate::operation::Fold;
use crate::worker::{WorkerContext, WorkerPool, spawn_feeder};

/// Concurrent `apply_and_fold`, a two level reduction.
///
/// ```text
///                          +--> worker 1 (partial) --+
///  seed | feeder --> [work]+--> worker 2 (partial) --+--> [partials] --> merge(seed, ...)
///                          +--> worker N (partial) --+
/// ```
///
/// The seed (first survivor) is found inline before any worker starts. Every worker then folds
/// the survivors it pulls into its own partial result, and hands that partial to the merge stage
/// once the work channel is exhausted. The merge stage folds partials into the seed in the order
/// the workers finish, see [Fold] for what that requires of the fold function.
pub(crate) async fn apply_and_fold<T, F>(
    chain: Arc<OperationChain<T>>,
    config: PipelineConfig,
    input: Vec<T>,
    fold: Arc<F>,
) -> Result<T>
where
    T: Default + Send + 'static,
    F: Fold<T> + 'static,
{
    let mut remaining = input.into_iter();
    let Some(seed) = sequential::find_seed(&chain, &mut remaining)? else {
        debug!("no element survived the chain, folding to the default value");
        return Ok(T::default());
    };
    if remaining.as_slice().is_empty() {
        return Ok(seed);
    }

    debug!(
        remaining = remaining.len(),
        concurrency = config.concurrency,
        "starting concurrent fold"
    );

    let cln_token = CancellationToken::new();
    let (work_tx, work_rx) = mpsc::channel(config.capacity());
    let (partial_tx, mut partial_rx) = mpsc::channel(config.capacity());

    let feeder = spawn_feeder(remaining, work_tx, cln_token.clone());

    let worker_fold = Arc::clone(&fold);
    let pool = WorkerPool::spawn(
        config.concurrency,
        ReceiverStream::new(work_rx),
        cln_token,
        move |ctx| {
            let chain = Arc::clone(&chain);
            let fold = Arc::clone(&worker_fold);
            let partial_tx = partial_tx.clone();
            async move { accumulate(ctx, &chain, fold.as_ref(), &partial_tx).await }
        },
    );

    let merged = match merge(seed, &mut partial_rx, fold.as_ref()).await {
        Ok(merged) => Some(merged),
        Err(e) => {
            error!(?e, "merge stage failed, cancelling workers");
            pool.reporter().report(e);
            None
        }
    };
    drop(partial_rx);

    pool.join().await?;
    feeder.await?;

    merged.ok_or_else(|| Error::Worker("merge stage stopped without a result".to_string()))
}

/// Folds everything the worker pulls into a local partial result and emits it at the end. A
/// worker that never saw a survivor emits nothing, a cancelled worker emits nothing either.
async fn accumulate<T, F>(
    ctx: WorkerContext<T>,
    chain: &OperationChain<T>,
    fold: &F,
    partial_tx: &mpsc::Sender<T>,
) -> Result<()>
where
    F: Fold<T> + ?Sized,
{
    let mut partial: Option<T> = None;
    let mut survivors = 0usize;
    while let Some(value) = ctx.next().await {
        let Some(value) = chain.process(value)? else {
            continue;
        };
        partial = Some(match partial.take() {
            Some(acc) => fold.fold(acc, value).map_err(Error::Fold)?,
            None => value,
        });
        survivors += 1;
    }

    if ctx.is_cancelled() {
        return Ok(());
    }
    debug!(worker = ctx.id, survivors, "worker input exhausted");
    if let Some(partial) = partial {
        ctx.forward(partial_tx, partial).await?;
    }
    Ok(())
}

/// Folds the partial results into `seed` as they arrive, until every worker is done.
async fn merge<T, F>(seed: T, partial_rx: &mut mpsc::Receiver<T>, fold: &F) -> Result<T>
where
    F: Fold<T> + ?Sized,
{
    let mut result = seed;
    let mut merged = 0usize;
    while let Some(partial) = partial_rx.recv().await {
        result = fold.fold(result, partial).map_err(Error::Fold)?;
        merged += 1;
    }
    debug!(merged, "merged partial results");
    Ok(result)
}
