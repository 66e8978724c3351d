//! Build configuration.

use serde::{Deserialize, Serialize};

use crate::planner::DEFAULT_TARGET_SHARDS_PER_WORKER;

/// Default number of requests each worker runs concurrently outside the
/// column-separation phase.
pub const DEFAULT_PARALLEL_REQUESTS_PER_WORKER: usize = 5;

fn default_target_shards_per_worker() -> usize {
    DEFAULT_TARGET_SHARDS_PER_WORKER
}

fn default_parallel_requests_per_worker() -> usize {
    DEFAULT_PARALLEL_REQUESTS_PER_WORKER
}

/// Options of a cache build.
///
/// Deserializes from JSON; every field is optional:
///
/// ```json
/// { "weight_column_idx": 2, "remove_zero_weighted_examples": true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheBuildConfig {
    /// Label column; always cached when set.
    #[serde(default)]
    pub label_column_idx: Option<usize>,
    /// Weight column; always cached when set.
    #[serde(default)]
    pub weight_column_idx: Option<usize>,
    /// Drop the examples whose weight is zero. Requires a numerical weight column.
    #[serde(default)]
    pub remove_zero_weighted_examples: bool,
    /// Output shards per worker targeted by the planner.
    #[serde(default = "default_target_shards_per_worker")]
    pub target_shards_per_worker: usize,
    /// Per-worker concurrency of pools started for the build. The build
    /// itself runs one request per worker and then puts back whatever the
    /// pool had.
    #[serde(default = "default_parallel_requests_per_worker")]
    pub parallel_requests_per_worker: usize,
}

impl Default for CacheBuildConfig {
    fn default() -> Self {
        Self {
            label_column_idx: None,
            weight_column_idx: None,
            remove_zero_weighted_examples: false,
            target_shards_per_worker: DEFAULT_TARGET_SHARDS_PER_WORKER,
            parallel_requests_per_worker: DEFAULT_PARALLEL_REQUESTS_PER_WORKER,
        }
    }
}

impl CacheBuildConfig {
    /// Weight column whose zero rows workers must drop, if any.
    pub fn zero_weight_filter_column(&self) -> Option<usize> {
        if self.remove_zero_weighted_examples {
            self.weight_column_idx
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_uses_defaults() {
        let config: CacheBuildConfig = serde_json::from_str("{}").expect("parse");
        assert_eq!(config, CacheBuildConfig::default());
        assert_eq!(config.target_shards_per_worker, 10);
        assert_eq!(config.parallel_requests_per_worker, 5);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<CacheBuildConfig>(r#"{"weight": 1}"#).is_err());
    }

    #[test]
    fn zero_filter_requires_flag_and_weight() {
        let mut config = CacheBuildConfig {
            weight_column_idx: Some(2),
            ..CacheBuildConfig::default()
        };
        assert_eq!(config.zero_weight_filter_column(), None);
        config.remove_zero_weighted_examples = true;
        assert_eq!(config.zero_weight_filter_column(), Some(2));
    }
}
