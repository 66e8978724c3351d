//! Cache build orchestration.
//!
//! [`create_dataset_cache`] turns a sharded source dataset into a dataset
//! cache: one file per (column, output shard) written by the workers of a
//! [`WorkerPool`], one completion marker per output shard, and a global
//! `cache_metadata.json` written last.
//!
//! The build is resumable. Output shards whose marker exists are not
//! dispatched again, and an existing global descriptor short-circuits the
//! whole build. A partial directory only resumes under the plan it was
//! started with; see [`BuildError::PlanMismatch`].

pub mod config;
pub mod error;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{debug, info};
use snafu::prelude::*;

use crate::dataspec::{ColumnType, DataSpecification};
use crate::metadata::{
    BooleanColumn, CacheMetadata, CategoricalColumn, ColumnKind, ColumnMetadata, MetadataStore,
    NumericalColumn, ShardMetadata,
};
use crate::planner::{PlanRecord, ShardPlan};
use crate::pool::WorkerPool;
use crate::protocol::WorkerRequest;
use crate::report::metadata_report;
use crate::shards;
use crate::storage::{self, CacheLocation, layout};

pub use config::{CacheBuildConfig, DEFAULT_PARALLEL_REQUESTS_PER_WORKER};
pub use error::{BuildError, BuildResult};

use error::{
    ColumnOutOfRangeSnafu, ListShardsSnafu, MetadataSnafu, NoWorkersSnafu, PlanMismatchSnafu,
    PoolSnafu, StorageSnafu, UnexpectedResultSnafu, UnsupportedColumnTypeSnafu,
    ZeroWeightNonNumericalSnafu, ZeroWeightWithoutWeightColumnSnafu,
};

const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(10);

fn check_column(column_idx: usize, num_columns: usize) -> BuildResult<()> {
    ensure!(
        column_idx < num_columns,
        ColumnOutOfRangeSnafu {
            column_idx,
            num_columns
        }
    );
    Ok(())
}

/// Columns to cache, sorted and unique.
///
/// With an explicit list, the label and weight columns are added to it.
/// Without one, every dataspec column is cached.
pub fn effective_columns(
    dataspec: &DataSpecification,
    columns: Option<&[usize]>,
    config: &CacheBuildConfig,
) -> BuildResult<Vec<usize>> {
    let num_columns = dataspec.num_columns();
    let effective = match columns {
        Some(explicit) => {
            let mut effective = explicit.to_vec();
            effective.extend(config.label_column_idx);
            effective.extend(config.weight_column_idx);
            effective.sort_unstable();
            effective.dedup();
            effective
        }
        None => (0..num_columns).collect(),
    };
    for &column_idx in &effective {
        check_column(column_idx, num_columns)?;
    }
    Ok(effective)
}

/// Global descriptor of a fresh build, before any example is counted.
///
/// Fails on the first selected column whose type cannot be cached, and when
/// zero-weight removal is requested without a numerical weight column.
pub fn initialize_metadata(
    dataspec: &DataSpecification,
    columns: &[usize],
    config: &CacheBuildConfig,
) -> BuildResult<CacheMetadata> {
    let num_columns = dataspec.num_columns();
    let mut metadata = CacheMetadata::new(num_columns);
    metadata.label_column_idx = config.label_column_idx;
    metadata.weight_column_idx = config.weight_column_idx;

    for column_idx in config.label_column_idx.iter().chain(&config.weight_column_idx) {
        check_column(*column_idx, num_columns)?;
    }

    for &column_idx in columns {
        let spec = dataspec.column(column_idx).context(ColumnOutOfRangeSnafu {
            column_idx,
            num_columns,
        })?;

        let kind = match spec.column_type {
            ColumnType::Numerical => {
                let stats = spec.numerical.clone().unwrap_or_default();
                ColumnKind::Numerical(NumericalColumn {
                    replacement_missing_value: stats.mean,
                    discretized: stats.discretized_bins.is_some(),
                    num_discretized_values: stats.discretized_bins.unwrap_or(0),
                    num_unique_values: stats.num_unique_values.unwrap_or(0),
                })
            }
            ColumnType::Categorical => {
                let stats = spec.categorical.clone().unwrap_or_default();
                ColumnKind::Categorical(CategoricalColumn {
                    num_values: stats.number_of_unique_values,
                    replacement_missing_value: stats.most_frequent_value,
                })
            }
            ColumnType::Boolean => {
                let stats = spec.boolean.unwrap_or_default();
                ColumnKind::Boolean(BooleanColumn {
                    replacement_missing_value: stats.count_true >= stats.count_false,
                })
            }
            column_type => {
                return UnsupportedColumnTypeSnafu {
                    column_idx,
                    name: spec.name.clone(),
                    column_type,
                }
                .fail();
            }
        };
        metadata.columns[column_idx] = ColumnMetadata::available(kind);
    }

    if config.remove_zero_weighted_examples {
        let column_idx = config
            .weight_column_idx
            .context(ZeroWeightWithoutWeightColumnSnafu)?;
        let spec = dataspec.column(column_idx).context(ColumnOutOfRangeSnafu {
            column_idx,
            num_columns,
        })?;
        ensure!(
            spec.column_type == ColumnType::Numerical,
            ZeroWeightNonNumericalSnafu {
                column_idx,
                column_type: spec.column_type,
            }
        );
    }

    Ok(metadata)
}

/// Load the global descriptor of a completed cache.
pub async fn load_cache_metadata(location: &CacheLocation) -> BuildResult<CacheMetadata> {
    MetadataStore::new(location.clone())
        .read_global()
        .await
        .context(MetadataSnafu)
}

/// Build (or resume, or reuse) the dataset cache of `typed_path` in `location`.
///
/// `columns` restricts the cached columns; `None` caches all of them. The
/// pool is shut down once the global descriptor is written. When the cache
/// is already complete, its descriptor is returned without touching the pool.
pub async fn create_dataset_cache<P>(
    typed_path: &str,
    dataspec: &DataSpecification,
    columns: Option<&[usize]>,
    location: &CacheLocation,
    config: &CacheBuildConfig,
    pool: &mut P,
) -> BuildResult<CacheMetadata>
where
    P: WorkerPool + ?Sized,
{
    let begin = Instant::now();
    info!(
        "Create dataset cache in {} for dataset {typed_path}",
        location.display()
    );

    let store = MetadataStore::new(location.clone());
    if store.global_exists().await.context(MetadataSnafu)? {
        info!("The dataset cache already exists");
        return store.read_global().await.context(MetadataSnafu);
    }

    for rel_dir in [
        PathBuf::new(),
        layout::indexed_rel_dir(),
        layout::raw_rel_dir(),
    ] {
        storage::create_dir_all(location, &rel_dir)
            .await
            .context(StorageSnafu)?;
    }

    let columns = effective_columns(dataspec, columns, config)?;
    info!("Found {} column(s)", columns.len());

    let mut metadata = initialize_metadata(dataspec, &columns, config)?;

    let (input_shards, format) = shards::list_shards(typed_path).context(ListShardsSnafu)?;
    info!("Found {} shard(s)", input_shards.len());

    separate_dataset_columns(
        &input_shards,
        &format,
        dataspec,
        &store,
        &columns,
        config,
        pool,
        &mut metadata,
    )
    .await?;

    store.write_global(&metadata).await.context(MetadataSnafu)?;
    pool.shutdown().await.context(PoolSnafu)?;

    info!(
        "Dataset cache meta-data:\n{}",
        metadata_report(&metadata, None)
    );
    info!("Dataset cache created in {:?}", begin.elapsed());
    Ok(metadata)
}

/// Check the plan against the one persisted by an earlier attempt, or
/// persist it on the first attempt.
async fn validate_plan(store: &MetadataStore, current: PlanRecord) -> BuildResult<()> {
    match store.read_plan().await.context(MetadataSnafu)? {
        Some(stored) => {
            ensure!(
                stored.same_partition(&current),
                PlanMismatchSnafu { stored, current }
            );
            if stored.num_workers != current.num_workers {
                debug!(
                    "Resuming with {} worker(s) instead of {}",
                    current.num_workers, stored.num_workers
                );
            }
            Ok(())
        }
        None => store.write_plan(&current).await.context(MetadataSnafu),
    }
}

#[allow(clippy::too_many_arguments)]
async fn separate_dataset_columns<P>(
    input_shards: &[String],
    format: &str,
    dataspec: &DataSpecification,
    store: &MetadataStore,
    columns: &[usize],
    config: &CacheBuildConfig,
    pool: &mut P,
    metadata: &mut CacheMetadata,
) -> BuildResult<()>
where
    P: WorkerPool + ?Sized,
{
    info!("Start separating dataset by columns");

    let num_workers = pool.num_workers();
    ensure!(num_workers > 0, NoWorkersSnafu);

    let plan = ShardPlan::new(
        input_shards.len(),
        num_workers,
        config.target_shards_per_worker,
    );
    validate_plan(
        store,
        PlanRecord::new(&plan, num_workers, config.target_shards_per_worker),
    )
    .await?;

    let num_shards = plan.num_output_shards();
    let pool_parallelism = pool.parallel_requests_per_worker();
    pool.configure(1).await.context(PoolSnafu)?;

    info!(
        "Create {num_shards} shard(s) in the dataset cache from the {} shard(s) of the original dataset, \
         {} input shard(s) per request over {num_workers} worker(s)",
        input_shards.len(),
        plan.shards_per_request()
    );

    metadata.num_shards = num_shards;
    metadata.num_examples = 0;

    let output_directory = match store.location() {
        CacheLocation::Local(root) => root.clone(),
    };
    let template = WorkerRequest {
        columns: columns.to_vec(),
        dataspec: dataspec.clone(),
        dataset_path: String::new(),
        shard_idx: 0,
        num_shards,
        output_directory,
        column_idx_remove_example_with_zero: config.zero_weight_filter_column(),
    };

    let mut awaiting = vec![false; num_shards];
    let mut pending = 0;
    for (shard_idx, range) in plan.assignments() {
        if store
            .shard_exists(shard_idx, num_shards)
            .await
            .context(MetadataSnafu)?
        {
            info!("The result of output shard #{shard_idx} is already there");
            let done = store
                .read_shard(shard_idx, num_shards)
                .await
                .context(MetadataSnafu)?;
            metadata.num_examples += done.num_examples;
            continue;
        }

        let request = template.for_shard(
            shard_idx,
            shards::join_typed_path(format, &input_shards[range]),
        );
        pool.submit(&request, ShardPlan::worker_for(shard_idx, num_workers))
            .await
            .context(PoolSnafu)?;
        awaiting[shard_idx] = true;
        pending += 1;
    }

    let mut last_progress = Instant::now();
    for received in 1..=pending {
        let result = pool.next_result().await.context(PoolSnafu)?;
        let slot = awaiting
            .get_mut(result.shard_idx)
            .filter(|waiting| **waiting)
            .context(UnexpectedResultSnafu {
                shard_idx: result.shard_idx,
                num_shards,
            })?;
        *slot = false;

        store
            .write_shard(
                result.shard_idx,
                num_shards,
                &ShardMetadata {
                    num_examples: result.num_examples,
                },
            )
            .await
            .context(MetadataSnafu)?;
        metadata.num_examples += result.num_examples;

        if received == pending || last_progress.elapsed() >= PROGRESS_LOG_INTERVAL {
            info!("Separate the dataset by columns {received}/{pending}");
            last_progress = Instant::now();
        }
    }

    pool.configure(pool_parallelism).await.context(PoolSnafu)?;

    info!(
        "Column separation done. {} example(s) found",
        metadata.num_examples
    );
    Ok(())
}
