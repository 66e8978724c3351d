//! Worker-side execution of cache requests.
//!
//! A [`WorkerHandler`] turns one [`WorkerRequest`] into one
//! [`WorkerResult`]. Pools decide where handlers run; handlers only see
//! decoded requests. [`separate`] holds the column-separation handler used
//! by the default registry.

pub mod separate;

use arrow::error::ArrowError;
use async_trait::async_trait;
use parquet::errors::ParquetError;
use snafu::{Backtrace, prelude::*};

use crate::dataspec::ColumnType;
use crate::protocol::{WorkerRequest, WorkerResult};
use crate::shards::ShardListingError;
use crate::storage::StorageError;

pub use separate::ColumnSeparationWorker;

/// Executes worker requests.
#[async_trait]
pub trait WorkerHandler: Send + Sync {
    /// Process one request.
    async fn run(&self, request: WorkerRequest) -> Result<WorkerResult, WorkerError>;
}

/// Errors raised by a worker while processing a request.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum WorkerError {
    /// The request's dataset path could not be expanded.
    #[snafu(display("Cannot list request shards: {source}"))]
    ListShards {
        /// Underlying listing error.
        #[snafu(source, backtrace)]
        source: ShardListingError,
    },

    /// The worker cannot read this dataset format.
    #[snafu(display("Unsupported dataset format {format:?}"))]
    UnsupportedFormat {
        /// Format tag of the request path.
        format: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A requested column is not in the dataspec.
    #[snafu(display("Column {column_idx} is out of range ({num_columns} column(s))"))]
    ColumnOutOfRange {
        /// Requested column.
        column_idx: usize,
        /// Number of dataspec columns.
        num_columns: usize,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// The zero-filter column is not numerical.
    #[snafu(display("Cannot filter zero values of column {column_idx} with type {column_type}"))]
    NonNumericalFilterColumn {
        /// Filter column.
        column_idx: usize,
        /// Its dataspec type.
        column_type: ColumnType,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// An input shard could not be opened.
    #[snafu(display("Cannot open input shard {path}: {source}"))]
    OpenShard {
        /// Shard path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// An input shard's header does not list the dataspec columns in order.
    #[snafu(display("Header of {path} is {found:?}, dataspec expects {expected:?}"))]
    HeaderMismatch {
        /// Shard path.
        path: String,
        /// Column names of the dataspec.
        expected: Vec<String>,
        /// Column names in the shard.
        found: Vec<String>,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A cell does not match the dataspec type of its column.
    #[snafu(display("Value {value:?} of column {column_idx} in {path} is not {column_type}"))]
    InvalidValue {
        /// Shard path.
        path: String,
        /// Column of the cell.
        column_idx: usize,
        /// Dataspec type of the column.
        column_type: ColumnType,
        /// Normalized cell content.
        value: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// An input shard could not be decoded or filtered.
    #[snafu(display("Cannot read input shard {path}: {source}"))]
    Csv {
        /// Shard path.
        path: String,
        /// Underlying Arrow error.
        source: ArrowError,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A column file could not be encoded.
    #[snafu(display("Cannot encode column {column_idx}: {source}"))]
    Parquet {
        /// Column being encoded.
        column_idx: usize,
        /// Underlying Parquet error.
        source: ParquetError,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A column file could not be written.
    #[snafu(display("Cannot write column file: {source}"))]
    Storage {
        /// Underlying storage error.
        #[snafu(backtrace)]
        source: StorageError,
    },

    /// The blocking part of the request panicked or was cancelled.
    #[snafu(display("Worker task failed: {source}"))]
    Blocking {
        /// Underlying join error.
        source: tokio::task::JoinError,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// The handler refused the request.
    #[snafu(display("Request rejected: {message}"))]
    Rejected {
        /// Reason given by the handler.
        message: String,
    },
}
