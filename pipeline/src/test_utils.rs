use std::sync::Once;

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::chain::OperationChain;
use crate::operation::{FilterOperation, TransformOperation};

/// Survivors of [scenario_chain] over `0..=100`.
pub(crate) const SCENARIO_OUTPUT: [i64; 27] = [
    7, 19, 67, 199, 259, 487, 679, 787, 1027, 1159, 1447, 1939, 2119, 2707, 3139, 3367, 3847, 4099,
    4627, 5479, 5779, 6727, 7399, 7747, 8467, 8839, 9607,
];

/// Sum of [SCENARIO_OUTPUT].
pub(crate) const SCENARIO_SUM: i64 = 92025;

#[derive(Error, Debug, Clone, PartialEq)]
pub(crate) enum TestError {
    #[error("negative value {0}")]
    Negative(i64),
    #[error("value {0} is too large")]
    TooLarge(i64),
}

static TRACING: Once = Once::new();

/// Installs a tracing subscriber once per test binary, RUST_LOG controls the level.
pub(crate) fn setup_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .with(tracing_subscriber::fmt::layer().with_ansi(false).with_test_writer())
            .try_init();
    });
}

pub(crate) fn numbers(from: i64, to: i64) -> Vec<i64> {
    (from..=to).collect()
}

pub(crate) fn even() -> FilterOperation<i64> {
    FilterOperation::new(|v: &i64| v % 2 == 0)
}

/// Rejects multiples of `n`, values below `n` always pass.
pub(crate) fn not_multiple_of(n: i64) -> FilterOperation<i64> {
    FilterOperation::new(move |v: &i64| *v < n || v % n != 0)
}

pub(crate) fn square() -> TransformOperation<i64> {
    TransformOperation::must(|v: i64| v * v)
}

pub(crate) fn add(by: i64) -> TransformOperation<i64> {
    TransformOperation::must(move |v: i64| v + by)
}

/// even, not a multiple of 10, square, add 3, not a multiple of 3.
pub(crate) fn scenario_chain() -> OperationChain<i64> {
    OperationChain::new()
        .with_pre_filter(even())
        .with_pre_filter(not_multiple_of(10))
        .with_transformer(square())
        .with_transformer(add(3))
        .with_post_filter(not_multiple_of(3))
}

/// Transform failing on the given value.
pub(crate) fn fail_on(bad: i64) -> TransformOperation<i64> {
    TransformOperation::new(move |v: i64| {
        if v == bad {
            Err(TestError::TooLarge(v))
        } else {
            Ok(v)
        }
    })
}
