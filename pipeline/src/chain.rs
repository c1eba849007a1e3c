use std::fmt;

use crate::error::{Error, Result};
use crate::operation::{FilterOperation, TransformOperation};

/// Position of a stage inside the [OperationChain].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    PreFilter,
    Transform,
    PostFilter,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::PreFilter => write!(f, "preFilter"),
            StageKind::Transform => write!(f, "transform"),
            StageKind::PostFilter => write!(f, "postFilter"),
        }
    }
}

/// OperationChain is the per-element work of a pipeline: the pre-filters, then the transforms,
/// then the post-filters, each group in registration order. Registering a stage never changes
/// the relative position of the groups, a pre-filter added after a post-filter still runs
/// before every transform.
///
/// The chain is a plain list of stages interpreted by [OperationChain::process], an empty
/// chain lets every element through unchanged.
pub struct OperationChain<T> {
    pre_filters: Vec<FilterOperation<T>>,
    transformers: Vec<TransformOperation<T>>,
    post_filters: Vec<FilterOperation<T>>,
}

impl<T> OperationChain<T> {
    pub fn new() -> Self {
        Self {
            pre_filters: Vec::new(),
            transformers: Vec::new(),
            post_filters: Vec::new(),
        }
    }

    pub(crate) fn from_parts(
        pre_filters: Vec<FilterOperation<T>>,
        transformers: Vec<TransformOperation<T>>,
        post_filters: Vec<FilterOperation<T>>,
    ) -> Self {
        Self {
            pre_filters,
            transformers,
            post_filters,
        }
    }

    pub fn with_pre_filter(mut self, filter: FilterOperation<T>) -> Self {
        self.add_pre_filter(filter);
        self
    }

    pub fn with_transformer(mut self, transformer: TransformOperation<T>) -> Self {
        self.add_transformer(transformer);
        self
    }

    pub fn with_post_filter(mut self, filter: FilterOperation<T>) -> Self {
        self.add_post_filter(filter);
        self
    }

    pub(crate) fn add_pre_filter(&mut self, filter: FilterOperation<T>) {
        self.pre_filters.push(filter);
    }

    pub(crate) fn add_transformer(&mut self, transformer: TransformOperation<T>) {
        self.transformers.push(transformer);
    }

    pub(crate) fn add_post_filter(&mut self, filter: FilterOperation<T>) {
        self.post_filters.push(filter);
    }

    /// Stage kinds in evaluation order.
    pub fn stages(&self) -> Vec<StageKind> {
        std::iter::repeat_n(StageKind::PreFilter, self.pre_filters.len())
            .chain(std::iter::repeat_n(
                StageKind::Transform,
                self.transformers.len(),
            ))
            .chain(std::iter::repeat_n(
                StageKind::PostFilter,
                self.post_filters.len(),
            ))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pre_filters.len() + self.transformers.len() + self.post_filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs the element through every stage. Returns `Ok(None)` if a filter or a transform
    /// dropped the element; nothing downstream of the dropping (or failing) stage runs.
    pub fn process(&self, value: T) -> Result<Option<T>> {
        if !self.pre_filters.iter().all(|filter| filter.allow(&value)) {
            return Ok(None);
        }

        let mut value = value;
        for transformer in &self.transformers {
            match transformer.transform(value).map_err(Error::Transform)? {
                Some(next) => value = next,
                None => return Ok(None),
            }
        }

        if !self.post_filters.iter().all(|filter| filter.allow(&value)) {
            return Ok(None);
        }
        Ok(Some(value))
    }
}

impl<T> Default for OperationChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for OperationChain<T> {
    fn clone(&self) -> Self {
        Self {
            pre_filters: self.pre_filters.clone(),
            transformers: self.transformers.clone(),
            post_filters: self.post_filters.clone(),
        }
    }
}

impl<T> fmt::Debug for OperationChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationChain")
            .field("pre_filters", &self.pre_filters.len())
            .field("transformers", &self.transformers.len())
            .field("post_filters", &self.post_filters.len())
            .finish()
    }
}
