use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::chain::OperationChain;
use crate::config::PipelineConfig;
use crate::error::{BoxError, Result};
use crate::executor::{self, sequential};
use crate::operation::{FilterOperation, Fold, TransformOperation};

/// Everything a [Pipeline] is made of, as ordered lists.
pub struct Components<T> {
    pub concurrency: usize,
    pub pre_filters: Vec<FilterOperation<T>>,
    pub transformers: Vec<TransformOperation<T>>,
    pub post_filters: Vec<FilterOperation<T>>,
}

impl<T> Default for Components<T> {
    fn default() -> Self {
        Self {
            concurrency: 1,
            pre_filters: Vec::new(),
            transformers: Vec::new(),
            post_filters: Vec::new(),
        }
    }
}

impl<T> Clone for Components<T> {
    fn clone(&self) -> Self {
        Self {
            concurrency: self.concurrency,
            pre_filters: self.pre_filters.clone(),
            transformers: self.transformers.clone(),
            post_filters: self.post_filters.clone(),
        }
    }
}

/// Pipeline runs an [OperationChain] over a batch ([Pipeline::apply],
/// [Pipeline::apply_and_fold]) or over a channel ([Pipeline::stream]).
///
/// Configuration has value semantics: every builder call consumes the pipeline and returns a
/// new one, the chain is shared between clones and copied on the first change, so configuring
/// a clone never affects pipelines already handed out.
///
/// With a concurrency above 1 the caller's filter, transform and fold functions are called from
/// several tokio tasks at once.
pub struct Pipeline<T> {
    config: PipelineConfig,
    chain: Arc<OperationChain<T>>,
}

impl<T> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            chain: Arc::clone(&self.chain),
        }
    }
}

impl<T> Default for Pipeline<T> {
    fn default() -> Self {
        Self {
            config: PipelineConfig::default(),
            chain: Arc::new(OperationChain::new()),
        }
    }
}

impl<T> std::fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("chain", &self.chain)
            .finish()
    }
}

impl<T> Pipeline<T>
where
    T: Send + 'static,
{
    /// Sequential pipeline with an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_components(components: Components<T>) -> Self {
        Self {
            config: PipelineConfig::default().with_concurrency(components.concurrency),
            chain: Arc::new(OperationChain::from_parts(
                components.pre_filters,
                components.transformers,
                components.post_filters,
            )),
        }
    }

    pub fn from_chain(chain: OperationChain<T>) -> Self {
        Self {
            config: PipelineConfig::default(),
            chain: Arc::new(chain),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Number of workers, 0 or 1 runs everything on the calling task.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.config = self.config.with_concurrency(concurrency);
        self
    }

    pub fn pre_filter<F>(mut self, allow: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.chain_mut().add_pre_filter(FilterOperation::new(allow));
        self
    }

    pub fn post_filter<F>(mut self, allow: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.chain_mut().add_post_filter(FilterOperation::new(allow));
        self
    }

    pub fn transform<F, E>(self, transform: F) -> Self
    where
        F: Fn(T) -> std::result::Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.transformer(TransformOperation::new(transform))
    }

    pub fn must_transform<F>(self, transform: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        self.transformer(TransformOperation::must(transform))
    }

    pub fn transform_with_filter<F, E>(self, transform: F) -> Self
    where
        F: Fn(T) -> std::result::Result<Option<T>, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.transformer(TransformOperation::with_filter(transform))
    }

    pub fn must_transform_with_filter<F>(self, transform: F) -> Self
    where
        F: Fn(T) -> Option<T> + Send + Sync + 'static,
    {
        self.transformer(TransformOperation::must_with_filter(transform))
    }

    /// Appends a transform to the transform stage, after the transforms registered so far.
    pub fn transformer(mut self, transformer: TransformOperation<T>) -> Self {
        self.chain_mut().add_transformer(transformer);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn chain(&self) -> &OperationChain<T> {
        &self.chain
    }

    /// Runs the chain over `input` and returns the survivors in input order, at any
    /// concurrency. Fails with the first error any element raised, no partial result is
    /// returned.
    pub async fn apply(&self, input: Vec<T>) -> Result<Vec<T>> {
        if self.config.is_concurrent() {
            executor::ordered::apply(Arc::clone(&self.chain), self.config, input).await
        } else {
            sequential::apply(&self.chain, input)
        }
    }

    /// Runs the chain over `input` and folds the survivors into one value, `T::default()` if
    /// nothing survives.
    ///
    /// With a concurrency above 1 the order in which survivors are combined is not defined, the
    /// aggregate is only deterministic for associative and commutative folds (see [Fold]).
    pub async fn apply_and_fold<F>(&self, input: Vec<T>, fold: F) -> Result<T>
    where
        T: Default,
        F: Fold<T> + 'static,
    {
        if self.config.is_concurrent() {
            executor::fold::apply_and_fold(
                Arc::clone(&self.chain),
                self.config,
                input,
                Arc::new(fold),
            )
            .await
        } else {
            sequential::apply_and_fold(&self.chain, input, &fold)
        }
    }

    /// Runs the chain over everything received on `input` and sends the survivors to
    /// `output`, until `input` closes or `cln_token` is cancelled (both return `Ok`). Only the
    /// sequential mode keeps the input order.
    ///
    /// `output` is never closed by the pipeline; it closes when the caller drops its senders.
    /// On error, elements sent before the error stay in `output`.
    pub async fn stream(
        &self,
        input: ReceiverStream<T>,
        output: &mpsc::Sender<T>,
        cln_token: CancellationToken,
    ) -> Result<()> {
        if self.config.is_concurrent() {
            executor::stream::stream(
                Arc::clone(&self.chain),
                self.config,
                input,
                output,
                cln_token,
            )
            .await
        } else {
            sequential::stream(&self.chain, input, output, cln_token).await
        }
    }

    /// Copy-on-write access to the chain, clones it if another pipeline still shares it.
    fn chain_mut(&mut self) -> &mut OperationChain<T> {
        Arc::make_mut(&mut self.chain)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::error::Error;
    use crate::operation::FoldOperation;
    use crate::test_utils::{self, TestError, setup_tracing};

    fn scenario_components(concurrency: usize) -> Components<i64> {
        Components {
            concurrency,
            pre_filters: vec![test_utils::even(), test_utils::not_multiple_of(10)],
            transformers: vec![test_utils::square(), test_utils::add(3)],
            post_filters: vec![test_utils::not_multiple_of(3)],
        }
    }

    fn scenario_builder() -> Pipeline<i64> {
        Pipeline::new()
            .pre_filter(|v: &i64| v % 2 == 0)
            .pre_filter(|v: &i64| *v < 10 || v % 10 != 0)
            .must_transform(|v: i64| v * v)
            .must_transform(|v: i64| v + 3)
            .post_filter(|v: &i64| *v < 3 || v % 3 != 0)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_apply_from_components() {
        setup_tracing();
        for concurrency in [0, 1, 10] {
            let pipeline = Pipeline::from_components(scenario_components(concurrency));
            let output = pipeline.apply(test_utils::numbers(0, 100)).await.unwrap();
            assert_eq!(output, test_utils::SCENARIO_OUTPUT);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_apply_and_fold_from_builder() {
        for concurrency in [1, 2, 10] {
            let pipeline = scenario_builder().with_concurrency(concurrency);
            let sum = pipeline
                .apply_and_fold(
                    test_utils::numbers(0, 100),
                    FoldOperation::must(|a: i64, b: i64| a + b),
                )
                .await
                .unwrap();
            assert_eq!(sum, test_utils::SCENARIO_SUM);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stream_matches_apply() {
        for concurrency in [1, 10] {
            let pipeline = scenario_builder().with_concurrency(concurrency);
            let (in_tx, in_rx) = mpsc::channel(101);
            for v in test_utils::numbers(0, 100) {
                in_tx.send(v).await.unwrap();
            }
            drop(in_tx);
            let (out_tx, mut out_rx) = mpsc::channel(101);

            pipeline
                .stream(
                    ReceiverStream::new(in_rx),
                    &out_tx,
                    CancellationToken::new(),
                )
                .await
                .unwrap();
            drop(out_tx);

            let mut output = BTreeSet::new();
            while let Some(v) = out_rx.recv().await {
                output.insert(v);
            }
            let expected = pipeline.apply(test_utils::numbers(0, 100)).await.unwrap();
            assert_eq!(output, expected.into_iter().collect::<BTreeSet<_>>());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_empty_results_at_every_concurrency() {
        for concurrency in [1, 2, 10] {
            let pipeline = scenario_builder()
                .pre_filter(|_: &i64| false)
                .with_concurrency(concurrency);
            assert!(pipeline.apply(test_utils::numbers(0, 100)).await.unwrap().is_empty());
            let sum = pipeline
                .apply_and_fold(
                    test_utils::numbers(0, 100),
                    FoldOperation::must(|a: i64, b: i64| a + b),
                )
                .await
                .unwrap();
            assert_eq!(sum, 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_transform_error_short_circuits() {
        for concurrency in [1, 4] {
            let pipeline = Pipeline::new()
                .with_concurrency(concurrency)
                .transform(|v: i64| {
                    if v == 42 {
                        Err(TestError::TooLarge(v))
                    } else {
                        Ok(v)
                    }
                });

            let err = pipeline.apply(test_utils::numbers(0, 100)).await.unwrap_err();
            let source = err.into_source().expect("caller error is kept");
            assert_eq!(
                *source.downcast::<TestError>().unwrap(),
                TestError::TooLarge(42)
            );

            let err = pipeline
                .apply_and_fold(
                    test_utils::numbers(0, 100),
                    FoldOperation::must(|a: i64, b: i64| a + b),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Transform(_)));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_transform_is_worker_error() {
        let pipeline = Pipeline::new()
            .with_concurrency(4)
            .must_transform(|v: i64| {
                assert!(v != 7, "transform exploded on {v}");
                v
            });

        let err = pipeline.apply(test_utils::numbers(0, 20)).await.unwrap_err();
        assert!(matches!(err, Error::Worker(_)));
        assert!(err.into_source().is_none());
    }

    #[tokio::test]
    async fn test_transform_with_filter_variants() {
        let pipeline = Pipeline::new()
            .must_transform_with_filter(|v: i64| (v != 4).then_some(v * v))
            .transform_with_filter(|v: i64| {
                if v > 50 {
                    Err(TestError::TooLarge(v))
                } else {
                    Ok((v % 2 == 1).then_some(v))
                }
            });

        let output = pipeline.apply(vec![1, 2, 3, 4, 5]).await.unwrap();
        assert_eq!(output, vec![1, 9, 25]);
        assert!(pipeline.apply(vec![8]).await.is_err());
    }

    #[tokio::test]
    async fn test_configuration_is_copy_on_write() {
        let base = Pipeline::new().pre_filter(|v: &i64| *v > 0);
        let stricter = base.clone().post_filter(|v: &i64| *v < 5).with_concurrency(4);

        assert_eq!(base.chain().len(), 1);
        assert_eq!(base.config().concurrency, 1);
        assert_eq!(stricter.chain().len(), 2);
        assert_eq!(stricter.config().concurrency, 4);

        assert_eq!(base.apply(vec![-1, 3, 7]).await.unwrap(), vec![3, 7]);
        assert_eq!(stricter.apply(vec![-1, 3, 7]).await.unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_empty_pipeline_is_identity() {
        let pipeline = Pipeline::<String>::new();
        let input = vec!["a".to_string(), "b".to_string()];
        assert_eq!(pipeline.apply(input.clone()).await.unwrap(), input);
    }

    #[tokio::test]
    async fn test_from_chain_with_config() {
        let pipeline = Pipeline::from_chain(test_utils::scenario_chain()).with_config(
            PipelineConfig::default()
                .with_concurrency(3)
                .with_channel_capacity(1),
        );
        let output = pipeline.apply(test_utils::numbers(0, 100)).await.unwrap();
        assert_eq!(output, test_utils::SCENARIO_OUTPUT);
    }
}
