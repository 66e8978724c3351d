//! Core engine for building column-separated dataset caches.
//!
//! A dataset cache stores every column of a sharded source dataset in its
//! own set of files, so training code can load only the columns it needs.
//! This crate provides:
//!
//! - The dataspec model and CSV inference (`dataspec` module).
//! - Typed, sharded source paths such as `csv:/data/train@20` (`shards`).
//! - The planner mapping input shards to output shards (`planner`).
//! - Cache descriptors and their atomic on-disk persistence (`metadata`,
//!   `storage`).
//! - The worker request contract, worker handlers and an in-process worker
//!   pool (`protocol`, `worker`, `pool`).
//! - The resumable build orchestrator and the metadata report (`build`,
//!   `report`).
//!
//! Front ends (for example, the `dscache` CLI) are expected to depend on
//! this crate rather than re-implementing the build logic.
#![deny(missing_docs)]
pub mod build;
pub mod dataspec;
pub mod metadata;
pub mod planner;
pub mod pool;
pub mod protocol;
pub mod report;
pub mod shards;
pub mod storage;
pub mod worker;

pub use build::{
    BuildError, BuildResult, CacheBuildConfig, create_dataset_cache, load_cache_metadata,
};
pub use dataspec::DataSpecification;
pub use metadata::{CacheMetadata, ColumnMetadata, ShardMetadata};
pub use planner::ShardPlan;
pub use pool::{LocalWorkerPool, WorkerPool, WorkerRegistry};
pub use protocol::{WorkerRequest, WorkerResult};
pub use report::metadata_report;
pub use storage::CacheLocation;
