//! A pipeline runs a chain of per-element operations (pre-filters, transforms, post-filters) over
//! a batch or a channel of elements, either inline or on a bounded pool of tokio workers.
//!
//! - [Pipeline::apply] returns the survivors in input order, at any concurrency.
//! - [Pipeline::apply_and_fold] folds the survivors into one value, each worker folds locally
//!   and the partial results are merged at the end.
//! - [Pipeline::stream] moves survivors from an input channel to an output channel, unordered
//!   when concurrent.
//!
//! ```text
//!   element --> pre-filter* --> transform* --> post-filter* --> survivor
//!                  |               |   \             |
//!                  v               v    v            v
//!                dropped        dropped error     dropped
//! ```
//!
//! ## Error Handling
//! Filters never fail. An error raised by a transform or a fold aborts the whole operation: the
//! first error cancels every worker through a shared `CancellationToken`, it is the only error
//! returned, and no partial result is handed back. The caller's error is kept unchanged, see
//! [Error::into_source].

pub use crate::chain::{OperationChain, StageKind};
pub use crate::config::PipelineConfig;
pub use crate::error::{BoxError, Error, Result};
pub use crate::operation::{FilterOperation, Fold, FoldOperation, TransformOperation};
pub use crate::pipeline::{Components, Pipeline};

mod error;

/// Execution settings, with an environment loader.
mod config;

/// Caller supplied filter, transform and fold operations.
mod operation;

/// Ordered composition of the operations applied to each element.
mod chain;

/// Worker pool shared by the concurrent executors.
mod worker;

mod executor;

mod pipeline;

#[cfg(test)]
mod test_utils;
