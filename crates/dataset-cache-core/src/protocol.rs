//! Messages exchanged between the build orchestrator and workers.
//!
//! One [`WorkerRequest`] asks a worker to produce one output shard of the
//! cache: read the listed input shards, keep the selected columns and write
//! one file per column into the output directory. The worker answers with a
//! [`WorkerResult`] carrying the shard index, so results can be matched to
//! shards regardless of completion order.
//!
//! Both messages are plain serde types; pool implementations encode them
//! as JSON when they cross a transport.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dataspec::DataSpecification;

/// Request to separate the columns of one output shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Column indices to extract, sorted and unique.
    pub columns: Vec<usize>,
    /// Dataspec of the whole dataset.
    pub dataspec: DataSpecification,
    /// Typed path of the input shards of this output shard
    /// (for example, `csv:/data/a-00000-of-00020,/data/a-00001-of-00020`).
    pub dataset_path: String,
    /// Output shard produced by this request.
    pub shard_idx: usize,
    /// Total number of output shards.
    pub num_shards: usize,
    /// Root of the cache.
    pub output_directory: PathBuf,
    /// Drop the rows where this column equals zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_idx_remove_example_with_zero: Option<usize>,
}

impl WorkerRequest {
    /// Copy of this request targeting a specific output shard.
    pub fn for_shard(&self, shard_idx: usize, dataset_path: String) -> Self {
        Self {
            shard_idx,
            dataset_path,
            ..self.clone()
        }
    }
}

/// Answer to a [`WorkerRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResult {
    /// Output shard that was produced.
    pub shard_idx: usize,
    /// Number of examples written.
    pub num_examples: u64,
}
