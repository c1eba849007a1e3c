use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::chain::OperationChain;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::worker::{WorkerContext, WorkerPool, spawn_feeder};

/// An element tagged with its position in the input, the position is what restores the input
/// order after the workers completed out of order.
struct IndexedElement<T> {
    index: usize,
    element: T,
}

/// Concurrent `apply`.
///
/// ```text
///  feeder --(index, element)--> [work] --> N workers --(index, survivor)--> [results]
///                                                                                    |
///                                                                                collector
/// ```
///
/// The collector buffers every survivor and, once the last worker is done, sorts the buffer by
/// index. Every index is fed exactly once so the sort has no ties, and the output matches the
/// sequential `apply` element for element.
pub(crate) async fn apply<T>(
    chain: Arc<OperationChain<T>>,
    config: PipelineConfig,
    input: Vec<T>,
) -> Result<Vec<T>>
where
    T: Send + 'static,
{
    if input.is_empty() {
        return Ok(input);
    }

    let input_len = input.len();
    debug!(
        input_len,
        concurrency = config.concurrency,
        "starting ordered concurrent apply"
    );

    let cln_token = CancellationToken::new();
    let (work_tx, work_rx) = mpsc::channel(config.capacity());
    let (result_tx, mut result_rx) = mpsc::channel(config.capacity());

    let feeder = spawn_feeder(
        input
            .into_iter()
            .enumerate()
            .map(|(index, element)| IndexedElement { index, element }),
        work_tx,
        cln_token.clone(),
    );

    let pool = WorkerPool::spawn(
        config.concurrency,
        ReceiverStream::new(work_rx),
        cln_token,
        move |ctx| {
            let chain = Arc::clone(&chain);
            let result_tx = result_tx.clone();
            async move { process_indexed(ctx, &chain, &result_tx).await }
        },
    );

    // the result channel closes once every worker dropped its sender
    let mut buffer = Vec::with_capacity(input_len);
    while let Some(indexed) = result_rx.recv().await {
        buffer.push(indexed);
    }

    if let Err(e) = pool.join().await {
        error!(?e, collected = buffer.len(), "ordered apply failed, discarding results");
        return Err(e);
    }
    feeder.await?;

    buffer.sort_unstable_by_key(|indexed| indexed.index);
    Ok(buffer.into_iter().map(|indexed| indexed.element).collect())
}

async fn process_indexed<T>(
    ctx: WorkerContext<IndexedElement<T>>,
    chain: &OperationChain<T>,
    result_tx: &mpsc::Sender<IndexedElement<T>>,
) -> Result<()> {
    while let Some(IndexedElement { index, element }) = ctx.next().await {
        if let Some(element) = chain.process(element)? {
            ctx.forward(result_tx, IndexedElement { index, element }).await?;
        }
    }
    Ok(())
}
