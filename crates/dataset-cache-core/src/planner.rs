//! Assignment of input shards to output shards.
//!
//! Each output shard of the cache is produced by one worker request that
//! reads a contiguous range of input shards. The planner decides how many
//! input shards go into each request:
//!
//! ```text
//! shards_per_request = max(1, num_input_shards / (num_workers * target_shards_per_worker))
//! num_output_shards  = ceil(num_input_shards / shards_per_request)
//! output shard i     = [i * shards_per_request, min(num_input_shards, (i + 1) * shards_per_request))
//! ```
//!
//! The plan is a pure function of its three inputs, so a resumed build
//! recomputes exactly the same output shard names.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Default number of output shards per worker.
pub const DEFAULT_TARGET_SHARDS_PER_WORKER: usize = 10;

/// Input-to-output shard assignment of one build attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardPlan {
    num_input_shards: usize,
    shards_per_request: usize,
    num_output_shards: usize,
}

impl ShardPlan {
    /// Compute the plan.
    ///
    /// A zero `num_workers` or `target_shards_per_worker` is treated as one.
    pub fn new(num_input_shards: usize, num_workers: usize, target_shards_per_worker: usize) -> Self {
        let denominator = num_workers.max(1).saturating_mul(target_shards_per_worker.max(1));
        let shards_per_request = (num_input_shards / denominator).max(1);
        let num_output_shards = num_input_shards.div_ceil(shards_per_request);
        Self {
            num_input_shards,
            shards_per_request,
            num_output_shards,
        }
    }

    /// Number of input shards.
    pub fn num_input_shards(&self) -> usize {
        self.num_input_shards
    }

    /// Number of input shards read by each request (the last one may read fewer).
    pub fn shards_per_request(&self) -> usize {
        self.shards_per_request
    }

    /// Number of output shards, i.e. of worker requests for a fresh build.
    pub fn num_output_shards(&self) -> usize {
        self.num_output_shards
    }

    /// Input shard range feeding `output_shard_idx`.
    ///
    /// Empty when `output_shard_idx` is past the last output shard.
    pub fn input_range(&self, output_shard_idx: usize) -> Range<usize> {
        let begin = output_shard_idx
            .saturating_mul(self.shards_per_request)
            .min(self.num_input_shards);
        let end = output_shard_idx
            .saturating_add(1)
            .saturating_mul(self.shards_per_request)
            .min(self.num_input_shards);
        begin..end
    }

    /// `(output_shard_idx, input_range)` for every output shard.
    pub fn assignments(&self) -> impl Iterator<Item = (usize, Range<usize>)> + '_ {
        (0..self.num_output_shards).map(|idx| (idx, self.input_range(idx)))
    }

    /// Worker receiving `output_shard_idx` (static round-robin placement).
    pub fn worker_for(output_shard_idx: usize, num_workers: usize) -> usize {
        output_shard_idx % num_workers.max(1)
    }
}

/// Plan parameters persisted next to the cache so a resumed build can
/// detect that the plan changed between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRecord {
    /// Number of input shards listed from the source path.
    pub num_input_shards: usize,
    /// Number of workers in the pool.
    pub num_workers: usize,
    /// Target ratio used by the planner.
    pub target_shards_per_worker: usize,
    /// Derived: input shards per request.
    pub shards_per_request: usize,
    /// Derived: number of output shards.
    pub num_output_shards: usize,
}

impl PlanRecord {
    /// Record the inputs and outputs of `plan`.
    pub fn new(plan: &ShardPlan, num_workers: usize, target_shards_per_worker: usize) -> Self {
        Self {
            num_input_shards: plan.num_input_shards(),
            num_workers,
            target_shards_per_worker,
            shards_per_request: plan.shards_per_request(),
            num_output_shards: plan.num_output_shards(),
        }
    }

    /// Whether both records map input shards to the same output shards.
    ///
    /// The worker count and target ratio may differ as long as the derived
    /// partition is identical.
    pub fn same_partition(&self, other: &PlanRecord) -> bool {
        self.num_input_shards == other.num_input_shards
            && self.shards_per_request == other.shards_per_request
            && self.num_output_shards == other.num_output_shards
    }
}
