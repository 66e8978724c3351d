//! Async persistence of cache descriptors.
//!
//! This module owns all on-disk interactions with the metadata files of a
//! cache directory:
//! - the global `cache_metadata.json`, whose presence means the cache is
//!   complete,
//! - one `shard_metadata/shard-<idx>-of-<num>.json` per finished output
//!   shard, whose presence means the shard must not be dispatched again,
//! - the `build_plan.json` record used to detect plan changes on resume.
//!
//! Every write goes through [`storage::write_atomic`], so a marker is never
//! observable before its contents are complete. Storage failures map to
//! [`MetadataError::Storage`]; undecodable files map to
//! [`MetadataError::CorruptState`].
use std::path::Path;

use serde::{Serialize, de::DeserializeOwned};
use snafu::{Backtrace, prelude::*};

use crate::metadata::{CacheMetadata, ShardMetadata};
use crate::planner::PlanRecord;
use crate::storage::{self, CacheLocation, StorageError, layout};

/// Errors that can occur while reading or writing cache metadata.
#[derive(Debug, Snafu)]
pub enum MetadataError {
    /// Underlying storage error.
    ///
    /// Backtraces are delegated to the inner StorageError.
    #[snafu(display("Storage error while accessing cache metadata: {source}"))]
    Storage {
        /// Underlying storage error returned by the storage backend.
        #[snafu(backtrace)]
        source: StorageError,
    },

    /// A metadata file exists but cannot be decoded.
    #[snafu(display("Corrupt metadata file {path}: {source}"))]
    CorruptState {
        /// Path of the offending file, relative to the cache root.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A metadata value could not be encoded.
    #[snafu(display("Cannot encode metadata for {path}: {source}"))]
    Encode {
        /// Destination path, relative to the cache root.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },
}

/// Reads and writes the metadata files of one cache directory.
///
/// Layout:
///   <root>/cache_metadata.json
///   <root>/build_plan.json
///   <root>/shard_metadata/shard-00000-of-00020.json
#[derive(Debug, Clone)]
pub struct MetadataStore {
    location: CacheLocation,
}

impl MetadataStore {
    /// Create a store rooted at a cache directory.
    pub fn new(location: CacheLocation) -> Self {
        Self { location }
    }

    /// Root of the cache.
    pub fn location(&self) -> &CacheLocation {
        &self.location
    }

    async fn exists_rel(&self, rel: &Path) -> Result<bool, MetadataError> {
        storage::exists(&self.location, rel)
            .await
            .context(StorageSnafu)
    }

    async fn read_json<T: DeserializeOwned>(&self, rel: &Path) -> Result<T, MetadataError> {
        let json = storage::read_to_string(&self.location, rel)
            .await
            .context(StorageSnafu)?;
        serde_json::from_str(&json).context(CorruptStateSnafu {
            path: rel.display().to_string(),
        })
    }

    async fn write_json<T: Serialize>(&self, rel: &Path, value: &T) -> Result<(), MetadataError> {
        let json = serde_json::to_vec_pretty(value).context(EncodeSnafu {
            path: rel.display().to_string(),
        })?;
        storage::write_atomic(&self.location, rel, &json)
            .await
            .context(StorageSnafu)
    }

    /// Whether the global descriptor exists, i.e. the cache is complete.
    pub async fn global_exists(&self) -> Result<bool, MetadataError> {
        self.exists_rel(&layout::metadata_rel_path()).await
    }

    /// Load the global descriptor.
    pub async fn read_global(&self) -> Result<CacheMetadata, MetadataError> {
        self.read_json(&layout::metadata_rel_path()).await
    }

    /// Persist the global descriptor.
    pub async fn write_global(&self, metadata: &CacheMetadata) -> Result<(), MetadataError> {
        self.write_json(&layout::metadata_rel_path(), metadata).await
    }

    /// Whether output shard `shard_idx` of `num_shards` is already done.
    pub async fn shard_exists(&self, shard_idx: usize, num_shards: usize) -> Result<bool, MetadataError> {
        self.exists_rel(&layout::shard_metadata_rel_path(shard_idx, num_shards))
            .await
    }

    /// Load the marker of output shard `shard_idx` of `num_shards`.
    pub async fn read_shard(
        &self,
        shard_idx: usize,
        num_shards: usize,
    ) -> Result<ShardMetadata, MetadataError> {
        self.read_json(&layout::shard_metadata_rel_path(shard_idx, num_shards))
            .await
    }

    /// Persist the marker of output shard `shard_idx` of `num_shards`.
    pub async fn write_shard(
        &self,
        shard_idx: usize,
        num_shards: usize,
        metadata: &ShardMetadata,
    ) -> Result<(), MetadataError> {
        self.write_json(
            &layout::shard_metadata_rel_path(shard_idx, num_shards),
            metadata,
        )
        .await
    }

    /// Load the plan record of an earlier attempt, if any.
    pub async fn read_plan(&self) -> Result<Option<PlanRecord>, MetadataError> {
        let rel = layout::build_plan_rel_path();
        if !self.exists_rel(&rel).await? {
            return Ok(None);
        }
        self.read_json(&rel).await.map(Some)
    }

    /// Persist the plan record of the current attempt.
    pub async fn write_plan(&self, record: &PlanRecord) -> Result<(), MetadataError> {
        self.write_json(&layout::build_plan_rel_path(), record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ColumnKind, ColumnMetadata, NumericalColumn};
    use crate::planner::ShardPlan;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn create_test_store() -> (TempDir, MetadataStore) {
        let tmp = TempDir::new().expect("create temp dir");
        let store = MetadataStore::new(CacheLocation::local(tmp.path()));
        (tmp, store)
    }

    #[tokio::test]
    async fn global_metadata_round_trips() -> TestResult {
        let (_tmp, store) = create_test_store();
        assert!(!store.global_exists().await?);

        let mut meta = CacheMetadata::new(2);
        meta.num_examples = 42;
        meta.num_shards = 3;
        meta.weight_column_idx = Some(1);
        meta.columns[0] = ColumnMetadata::available(ColumnKind::Numerical(NumericalColumn {
            replacement_missing_value: 0.1,
            ..NumericalColumn::default()
        }));

        store.write_global(&meta).await?;

        assert!(store.global_exists().await?);
        assert_eq!(store.read_global().await?, meta);
        Ok(())
    }

    #[tokio::test]
    async fn shard_markers_are_keyed_by_index_and_count() -> TestResult {
        let (tmp, store) = create_test_store();

        store
            .write_shard(2, 5, &ShardMetadata { num_examples: 17 })
            .await?;

        assert!(store.shard_exists(2, 5).await?);
        assert!(!store.shard_exists(2, 6).await?);
        assert!(!store.shard_exists(3, 5).await?);
        assert_eq!(store.read_shard(2, 5).await?.num_examples, 17);
        assert!(
            tmp.path()
                .join("shard_metadata/shard-00002-of-00005.json")
                .exists()
        );
        Ok(())
    }

    #[tokio::test]
    async fn missing_shard_marker_is_a_storage_not_found() -> TestResult {
        let (_tmp, store) = create_test_store();

        let err = store.read_shard(0, 1).await.expect_err("missing marker");
        assert!(matches!(
            err,
            MetadataError::Storage {
                source: StorageError::NotFound { .. }
            }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_marker_is_corrupt_state() -> TestResult {
        let (tmp, store) = create_test_store();
        let dir = tmp.path().join(layout::SHARD_METADATA_DIR_NAME);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join("shard-00000-of-00001.json"), "not json").await?;

        let err = store.read_shard(0, 1).await.expect_err("corrupt marker");
        assert!(matches!(err, MetadataError::CorruptState { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn plan_record_is_optional() -> TestResult {
        let (_tmp, store) = create_test_store();
        assert_eq!(store.read_plan().await?, None);

        let record = PlanRecord::new(&ShardPlan::new(20, 4, 10), 4, 10);
        store.write_plan(&record).await?;
        assert_eq!(store.read_plan().await?, Some(record));
        Ok(())
    }
}
