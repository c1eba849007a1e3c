//! Execution strategies for the three pipeline operations.
//!
//! | operation        | concurrency <= 1 | concurrency > 1                         |
//! |------------------|------------------|-----------------------------------------|
//! | `apply`          | [sequential]     | [ordered], index tagged fan-out/fan-in  |
//! | `apply_and_fold` | [sequential]     | [fold], per-worker partials then merge  |
//! | `stream`         | [sequential]     | [stream], unordered worker pool         |
//!
//! Every concurrent strategy runs on a [crate::worker::WorkerPool] and shares its error
//! semantics: the first error cancels all workers and is the one returned.

/// Inline execution on the calling task.
pub(crate) mod sequential;

/// Concurrent `apply` that keeps the input order.
pub(crate) mod ordered;

/// Concurrent `apply_and_fold` as a two level reduction.
pub(crate) mod fold;

/// Concurrent channel to channel processing.
pub(crate) mod stream;
