//! On-disk layout helpers for a cache root.
//!
//! This module centralizes all *relative* path conventions under a cache
//! directory:
//! - the global descriptor (`cache_metadata.json`) and the persisted build
//!   plan (`build_plan.json`)
//! - the `indexed/` and `raw/` column storage directories
//! - per-shard completion markers under `shard_metadata/`
//!
//! The functions here return relative [`std::path::PathBuf`] values. Callers
//! join them with a [`crate::storage::CacheLocation`] before doing IO.
//!
//! Shard file names are a pure function of `(shard_idx, num_shards)`, which
//! is what lets a resumed build find the markers written by an earlier
//! attempt.

use std::path::PathBuf;

/// File holding the global [`crate::metadata::CacheMetadata`].
pub const METADATA_FILE_NAME: &str = "cache_metadata.json";

/// File holding the [`crate::planner::PlanRecord`] of the first build attempt.
pub const BUILD_PLAN_FILE_NAME: &str = "build_plan.json";

/// Directory reserved for indexed (pre-sorted) column data.
pub const INDEXED_DIR_NAME: &str = "indexed";

/// Directory receiving the raw per-column shard files written by workers.
pub const RAW_DIR_NAME: &str = "raw";

/// Directory holding one completion marker per output shard.
pub const SHARD_METADATA_DIR_NAME: &str = "shard_metadata";

/// Number of digits used in zero-padded shard file names.
pub const SHARD_FILENAME_DIGITS: usize = 5;

/// `shard-<idx>-of-<num>.<ext>`, zero-padded.
pub fn shard_file_name(shard_idx: usize, num_shards: usize, ext: &str) -> String {
    format!(
        "shard-{:0width$}-of-{:0width$}.{ext}",
        shard_idx,
        num_shards,
        width = SHARD_FILENAME_DIGITS
    )
}

/// Relative path: `cache_metadata.json`
pub fn metadata_rel_path() -> PathBuf {
    PathBuf::from(METADATA_FILE_NAME)
}

/// Relative path: `build_plan.json`
pub fn build_plan_rel_path() -> PathBuf {
    PathBuf::from(BUILD_PLAN_FILE_NAME)
}

/// Relative path: `indexed/`
pub fn indexed_rel_dir() -> PathBuf {
    PathBuf::from(INDEXED_DIR_NAME)
}

/// Relative path: `raw/`
pub fn raw_rel_dir() -> PathBuf {
    PathBuf::from(RAW_DIR_NAME)
}

/// Relative path: `shard_metadata/shard-<idx>-of-<num>.json`
pub fn shard_metadata_rel_path(shard_idx: usize, num_shards: usize) -> PathBuf {
    PathBuf::from(SHARD_METADATA_DIR_NAME).join(shard_file_name(shard_idx, num_shards, "json"))
}

/// Relative path: `raw/<column_idx>/shard-<idx>-of-<num>.parquet`
pub fn raw_column_shard_rel_path(column_idx: usize, shard_idx: usize, num_shards: usize) -> PathBuf {
    raw_rel_dir()
        .join(column_idx.to_string())
        .join(shard_file_name(shard_idx, num_shards, "parquet"))
}
