//! Caller supplied per-element operations.
//!
//! Filters decide whether an element survives, transforms rewrite (and optionally drop) an
//! element, and folds combine two elements into one. All of them may be invoked from several
//! workers at once when the pipeline runs with a concurrency above 1.

use std::fmt;
use std::sync::Arc;

use crate::error::BoxError;

type FilterFn<T> = dyn Fn(&T) -> bool + Send + Sync;
type TransformFn<T> = dyn Fn(T) -> Result<Option<T>, BoxError> + Send + Sync;
type FoldFn<T> = dyn Fn(T, T) -> Result<T, BoxError> + Send + Sync;

/// Accepts or rejects an element. Filters never fail.
pub struct FilterOperation<T> {
    allow: Arc<FilterFn<T>>,
}

impl<T> FilterOperation<T> {
    pub fn new<F>(allow: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            allow: Arc::new(allow),
        }
    }

    pub fn allow(&self, value: &T) -> bool {
        (self.allow)(value)
    }
}

impl<T> Clone for FilterOperation<T> {
    fn clone(&self) -> Self {
        Self {
            allow: Arc::clone(&self.allow),
        }
    }
}

impl<T> fmt::Debug for FilterOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FilterOperation")
    }
}

/// Rewrites an element. `Ok(None)` drops the element, an error aborts the whole operation
/// the element belongs to.
pub struct TransformOperation<T> {
    transform: Arc<TransformFn<T>>,
}

impl<T: 'static> TransformOperation<T> {
    /// Transform that can fail.
    pub fn new<F, E>(transform: F) -> Self
    where
        F: Fn(T) -> Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self::from_fn(move |value| transform(value).map(Some).map_err(Into::into))
    }

    /// Transform that always succeeds.
    pub fn must<F>(transform: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        Self::from_fn(move |value| Ok(Some(transform(value))))
    }

    /// Transform that can both drop the element and fail.
    pub fn with_filter<F, E>(transform: F) -> Self
    where
        F: Fn(T) -> Result<Option<T>, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self::from_fn(move |value| transform(value).map_err(Into::into))
    }

    /// Transform that can drop the element but never fails.
    pub fn must_with_filter<F>(transform: F) -> Self
    where
        F: Fn(T) -> Option<T> + Send + Sync + 'static,
    {
        Self::from_fn(move |value| Ok(transform(value)))
    }

    /// Identity transform.
    pub fn noop() -> Self {
        Self::from_fn(|value| Ok(Some(value)))
    }

    /// Runs the given transforms one after the other as a single stage. The first drop or
    /// error stops the sequence.
    pub fn chained(transformers: Vec<TransformOperation<T>>) -> Self {
        Self::from_fn(move |value| {
            let mut value = value;
            for transformer in &transformers {
                match transformer.transform(value)? {
                    Some(next) => value = next,
                    None => return Ok(None),
                }
            }
            Ok(Some(value))
        })
    }

    fn from_fn<F>(transform: F) -> Self
    where
        F: Fn(T) -> Result<Option<T>, BoxError> + Send + Sync + 'static,
    {
        Self {
            transform: Arc::new(transform),
        }
    }
}

impl<T> TransformOperation<T> {
    pub fn transform(&self, value: T) -> Result<Option<T>, BoxError> {
        (self.transform)(value)
    }
}

impl<T> Clone for TransformOperation<T> {
    fn clone(&self) -> Self {
        Self {
            transform: Arc::clone(&self.transform),
        }
    }
}

impl<T> fmt::Debug for TransformOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransformOperation")
    }
}

/// Combines two elements into one.
///
/// Implementations must be associative. With a concurrency above 1 the partial results of the
/// workers are merged in the order the workers finish, not in input order, so the final
/// aggregate is only deterministic if the fold is also order-insensitive (commutative). A fold
/// with positional meaning, like plain string concatenation, yields concurrency dependent
/// results.
pub trait Fold<T>: Send + Sync {
    fn fold(&self, acc: T, value: T) -> Result<T, BoxError>;
}

/// [Fold] backed by a closure.
pub struct FoldOperation<T> {
    fold: Arc<FoldFn<T>>,
}

impl<T> FoldOperation<T> {
    /// Fold that can fail.
    pub fn new<F, E>(fold: F) -> Self
    where
        F: Fn(T, T) -> Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self {
            fold: Arc::new(move |acc, value| fold(acc, value).map_err(Into::into)),
        }
    }

    /// Fold that always succeeds.
    pub fn must<F>(fold: F) -> Self
    where
        F: Fn(T, T) -> T + Send + Sync + 'static,
    {
        Self {
            fold: Arc::new(move |acc, value| Ok(fold(acc, value))),
        }
    }
}

impl<T> Fold<T> for FoldOperation<T> {
    fn fold(&self, acc: T, value: T) -> Result<T, BoxError> {
        (self.fold)(acc, value)
    }
}

impl<T> Clone for FoldOperation<T> {
    fn clone(&self) -> Self {
        Self {
            fold: Arc::clone(&self.fold),
        }
    }
}

impl<T> fmt::Debug for FoldOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FoldOperation")
    }
}
