use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::chain::OperationChain;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::worker::WorkerPool;

/// Concurrent `stream`. Workers pull straight from the caller's input channel and push
/// survivors to the caller's output channel, so the output order is whatever order the workers
/// finish in.
///
/// The pool runs on a child of `cln_token`: cancelling the caller's token stops the workers
/// and `stream` returns `Ok(())`, while a worker error only cancels the pool. Elements already
/// sent to `output` stay there.
pub(crate) async fn stream<T>(
    chain: Arc<OperationChain<T>>,
    config: PipelineConfig,
    input: ReceiverStream<T>,
    output: &mpsc::Sender<T>,
    cln_token: CancellationToken,
) -> Result<()>
where
    T: Send + 'static,
{
    info!(concurrency = config.concurrency, "starting concurrent stream");

    let output = output.clone();
    let pool = WorkerPool::spawn(
        config.concurrency,
        input,
        cln_token.child_token(),
        move |ctx| {
            let chain = Arc::clone(&chain);
            let output = output.clone();
            async move {
                while let Some(value) = ctx.next().await {
                    if let Some(value) = chain.process(value)? {
                        ctx.forward(&output, value).await?;
                    }
                }
                Ok(())
            }
        },
    );

    match pool.join().await {
        Ok(()) if cln_token.is_cancelled() => {
            info!("stream cancelled");
            Ok(())
        }
        Ok(()) => {
            info!("stream input closed");
            Ok(())
        }
        Err(e) => {
            error!(?e, "stream failed");
            Err(e)
        }
    }
}
