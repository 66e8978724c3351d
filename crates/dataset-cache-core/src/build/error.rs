//! Error types and SNAFU context selectors for cache builds.
//!
//! Configuration errors (`ColumnOutOfRange`, `UnsupportedColumnType`,
//! `ZeroWeight*`, `PlanMismatch`, `NoWorkers`) are raised before any request
//! is dispatched. The wrapping variants propagate failures of the layers the
//! orchestrator drives; none of them is retried.

use snafu::{Backtrace, prelude::*};

use crate::dataspec::ColumnType;
use crate::metadata::MetadataError;
use crate::planner::PlanRecord;
use crate::pool::PoolError;
use crate::shards::ShardListingError;
use crate::storage::StorageError;

/// Errors from [`create_dataset_cache`](crate::build::create_dataset_cache)
/// and [`load_cache_metadata`](crate::build::load_cache_metadata).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BuildError {
    /// The cache directories could not be created.
    #[snafu(display("Cannot prepare cache directory: {source}"))]
    Storage {
        /// Underlying storage error.
        #[snafu(source, backtrace)]
        source: StorageError,
    },

    /// Reading or writing a metadata file failed.
    #[snafu(display("Cache metadata error: {source}"))]
    Metadata {
        /// Underlying metadata error.
        #[snafu(source, backtrace)]
        source: MetadataError,
    },

    /// The source dataset path could not be expanded.
    #[snafu(display("Cannot list dataset shards: {source}"))]
    ListShards {
        /// Underlying listing error.
        #[snafu(source, backtrace)]
        source: ShardListingError,
    },

    /// The worker pool failed.
    #[snafu(display("Worker pool error: {source}"))]
    Pool {
        /// Underlying pool error.
        #[snafu(source, backtrace)]
        source: PoolError,
    },

    /// A selected, label or weight column is not in the dataspec.
    #[snafu(display("Column {column_idx} is out of range ({num_columns} column(s) in the dataspec)"))]
    ColumnOutOfRange {
        /// Requested column.
        column_idx: usize,
        /// Number of dataspec columns.
        num_columns: usize,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A selected column has a type the cache cannot store.
    #[snafu(display("Non supported type {column_type} for column {name:?} ({column_idx})"))]
    UnsupportedColumnType {
        /// Column index.
        column_idx: usize,
        /// Column name.
        name: String,
        /// Its dataspec type.
        column_type: ColumnType,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// Zero-weight removal was requested without a weight column.
    #[snafu(display("\"remove_zero_weighted_examples\" requires a weight column"))]
    ZeroWeightWithoutWeightColumn {
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// Zero-weight removal was requested on a non-numerical weight column.
    #[snafu(display(
        "\"remove_zero_weighted_examples\" only supports numerical weight columns; column {column_idx} is {column_type}"
    ))]
    ZeroWeightNonNumerical {
        /// Weight column.
        column_idx: usize,
        /// Its dataspec type.
        column_type: ColumnType,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// The pool has no worker.
    #[snafu(display("The worker pool has no worker"))]
    NoWorkers {
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A partial cache was planned with different parameters.
    #[snafu(display(
        "Cache directory was started with plan {stored:?}, current plan is {current:?}; \
         resume with the same dataset and worker count, or use a new directory"
    ))]
    PlanMismatch {
        /// Plan persisted by the earlier attempt.
        stored: PlanRecord,
        /// Plan of this attempt.
        current: PlanRecord,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A worker answered for a shard that is not awaited.
    #[snafu(display("Unexpected result for output shard {shard_idx} of {num_shards}"))]
    UnexpectedResult {
        /// Shard index carried by the result.
        shard_idx: usize,
        /// Number of output shards.
        num_shards: usize,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },
}

/// General result type used by build operations.
pub type BuildResult<T> = Result<T, BuildError>;
