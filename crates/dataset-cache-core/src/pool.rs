//! Worker pools.
//!
//! A [`WorkerPool`] is a fixed set of workers, each able to run several
//! requests at once. The build orchestrator only needs four things from it:
//! change the per-worker concurrency, submit a request to a given worker,
//! wait for the next result (in completion order, from any worker), and shut
//! down. [`local::LocalWorkerPool`] runs workers as tokio tasks in this
//! process; handlers are looked up by name in a [`registry::WorkerRegistry`].

pub mod local;
pub mod registry;

use async_trait::async_trait;
use snafu::{Backtrace, prelude::*};

use crate::protocol::{WorkerRequest, WorkerResult};

pub use local::LocalWorkerPool;
pub use registry::{CREATE_DATASET_CACHE_WORKER, WorkerRegistry};

/// General result type used by pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors raised by a worker pool.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PoolError {
    /// A request targeted a worker that does not exist.
    #[snafu(display("Worker {worker_idx} does not exist (pool has {num_workers} worker(s))"))]
    InvalidWorker {
        /// Requested worker.
        worker_idx: usize,
        /// Number of workers in the pool.
        num_workers: usize,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// Per-worker concurrency must be at least one.
    #[snafu(display("Parallel requests per worker must be positive"))]
    InvalidParallelism {
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A request could not be encoded for transport.
    #[snafu(display("Cannot encode request for output shard {shard_idx}: {source}"))]
    Encode {
        /// Output shard of the request.
        shard_idx: usize,
        /// Underlying JSON error.
        source: serde_json::Error,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A worker answer could not be decoded.
    #[snafu(display("Cannot decode answer of worker {worker_idx}: {source}"))]
    Decode {
        /// Answering worker.
        worker_idx: usize,
        /// Underlying JSON error.
        source: serde_json::Error,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// The pool was shut down or its workers are gone.
    #[snafu(display("Worker pool is closed"))]
    Closed {
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A result was requested while no request is in flight.
    #[snafu(display("No request is pending"))]
    NoPendingRequest {
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A worker failed to process a request.
    #[snafu(display("Worker {worker_idx} failed: {message}"))]
    Worker {
        /// Failing worker.
        worker_idx: usize,
        /// Error reported by the worker.
        message: String,
    },

    /// A worker task ended abnormally during shutdown.
    #[snafu(display("Worker task failed: {source}"))]
    Join {
        /// Underlying join error.
        source: tokio::task::JoinError,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// No handler is registered under this name.
    #[snafu(display("Unknown worker {name:?}"))]
    UnknownWorker {
        /// Requested handler name.
        name: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },
}

/// A fixed set of workers answering [`WorkerRequest`]s.
///
/// Results are returned in completion order, not submission order; callers
/// match them to requests through [`WorkerResult::shard_idx`].
#[async_trait]
pub trait WorkerPool: Send {
    /// Number of workers.
    fn num_workers(&self) -> usize;

    /// Current per-worker concurrency.
    fn parallel_requests_per_worker(&self) -> usize;

    /// Set how many requests each worker may run concurrently.
    ///
    /// Applies to requests that start after the call.
    async fn configure(&mut self, parallel_requests_per_worker: usize) -> PoolResult<()>;

    /// Queue a request on worker `worker_idx`.
    async fn submit(&mut self, request: &WorkerRequest, worker_idx: usize) -> PoolResult<()>;

    /// Wait for the next completed request.
    async fn next_result(&mut self) -> PoolResult<WorkerResult>;

    /// Stop all workers after their queued requests are done.
    async fn shutdown(&mut self) -> PoolResult<()>;
}
