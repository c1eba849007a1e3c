use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::chain::OperationChain;
use crate::error::{Error, Result};
use crate::operation::Fold;

/// Collects the survivors in input order. The first error discards everything collected so far.
pub(crate) fn apply<T>(chain: &OperationChain<T>, input: Vec<T>) -> Result<Vec<T>> {
    let mut output = Vec::with_capacity(input.len());
    for value in input {
        if let Some(value) = chain.process(value)? {
            output.push(value);
        }
    }
    Ok(output)
}

/// Advances `input` up to and including the first survivor and returns it. Elements before
/// the seed are consumed without contributing anything.
pub(crate) fn find_seed<T>(
    chain: &OperationChain<T>,
    input: &mut impl Iterator<Item = T>,
) -> Result<Option<T>> {
    for value in input {
        if let Some(seed) = chain.process(value)? {
            return Ok(Some(seed));
        }
    }
    Ok(None)
}

/// Left fold of the survivors starting from the first one, `T::default()` if nothing survives.
pub(crate) fn apply_and_fold<T, F>(chain: &OperationChain<T>, input: Vec<T>, fold: &F) -> Result<T>
where
    T: Default,
    F: Fold<T> + ?Sized,
{
    let mut input = input.into_iter();
    let Some(mut result) = find_seed(chain, &mut input)? else {
        debug!("no element survived the chain, folding to the default value");
        return Ok(T::default());
    };

    for value in input {
        if let Some(value) = chain.process(value)? {
            result = fold.fold(result, value).map_err(Error::Fold)?;
        }
    }
    Ok(result)
}

/// Forwards survivors from `input` to `output` until `input` closes. Stops without error once
/// `cln_token` is cancelled. The output channel is left open.
pub(crate) async fn stream<T>(
    chain: &OperationChain<T>,
    mut input: ReceiverStream<T>,
    output: &mpsc::Sender<T>,
    cln_token: CancellationToken,
) -> Result<()> {
    let mut forwarded = 0usize;
    loop {
        let value = tokio::select! {
            biased;
            _ = cln_token.cancelled() => {
                info!(forwarded, "stream cancelled");
                return Ok(());
            }
            value = input.next() => value,
        };
        let Some(value) = value else {
            break;
        };
        let Some(value) = chain.process(value)? else {
            continue;
        };

        tokio::select! {
            biased;
            _ = cln_token.cancelled() => {
                info!(forwarded, "stream cancelled");
                return Ok(());
            }
            sent = output.send(value) => {
                sent.map_err(|_| Error::Stream("output receiver dropped".to_string()))?;
            }
        }
        forwarded += 1;
    }
    info!(forwarded, "stream input closed");
    Ok(())
}
