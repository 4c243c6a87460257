//! Error types.

use std::num::TryFromIntError;

use opentelemetry::metrics::MetricsError;

/// Errors produced by the instrumentation itself.
///
/// Query failures never show up here: they belong to the database client
/// and are only observed (recorded on the span), not wrapped.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The meter rejected an instrument or the pool-stats callback.
    #[error("failed to register pool metrics: {0}")]
    Metrics(#[from] MetricsError),

    /// An affected-row count that cannot be represented as `i64`.
    #[error("affected row count out of range: {0}")]
    RowCount(#[from] TryFromIntError),
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
