//! Column separation of CSV shards.
//!
//! [`ColumnSeparationWorker`] reads every input shard of a request, drops
//! the zero-weighted rows when asked to, and writes one Parquet file per
//! selected column:
//!
//! ```text
//! <output_directory>/raw/<column_idx>/shard-<shard_idx>-of-<num_shards>.parquet
//! ```
//!
//! Shards are read as text and each cell goes through the same normalization
//! as dataspec inference (trimmed, empty or non-finite means missing). The
//! header of every shard must match the dataspec column names. Numerical
//! columns are stored as `Float64`, boolean columns as `Boolean` and every
//! other type as `Utf8`; missing values stay null. Files are
//! written with write-then-rename, so a retried request overwrites a partial
//! attempt cleanly.

use std::{fs::File, path::PathBuf, sync::Arc};

use arrow::array::{ArrayRef, AsArray, BooleanArray, Float64Array, RecordBatch, StringArray};
use arrow::compute::filter_record_batch;
use arrow::datatypes::{DataType, Field, Float64Type, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow_csv::ReaderBuilder;
use async_trait::async_trait;
use log::debug;
use parquet::arrow::ArrowWriter;
use snafu::prelude::*;

use crate::dataspec::inference::{normalize_cell, parse_boolean, read_csv_header};
use crate::dataspec::{ColumnSpec, ColumnType, DataSpecification};
use crate::protocol::{WorkerRequest, WorkerResult};
use crate::shards;
use crate::storage::{self, CacheLocation, layout};
use crate::worker::{
    BlockingSnafu, ColumnOutOfRangeSnafu, CsvSnafu, HeaderMismatchSnafu, InvalidValueSnafu,
    ListShardsSnafu, NonNumericalFilterColumnSnafu, OpenShardSnafu, ParquetSnafu, StorageSnafu,
    UnsupportedFormatSnafu, WorkerError, WorkerHandler,
};

/// Splits CSV shards into per-column Parquet files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnSeparationWorker;

struct SeparatedShard {
    num_examples: u64,
    files: Vec<(PathBuf, Vec<u8>)>,
}

fn arrow_type(column: &ColumnSpec) -> DataType {
    match column.column_type {
        ColumnType::Numerical | ColumnType::DiscretizedNumerical => DataType::Float64,
        ColumnType::Boolean => DataType::Boolean,
        _ => DataType::Utf8,
    }
}

fn schema_with(
    dataspec: &DataSpecification,
    data_type: impl Fn(&ColumnSpec) -> DataType,
) -> SchemaRef {
    Arc::new(Schema::new(
        dataspec
            .columns
            .iter()
            .map(|c| Field::new(&c.name, data_type(c), true))
            .collect::<Vec<_>>(),
    ))
}

fn parse_cells<T>(
    raw: &StringArray,
    parse: impl Fn(&str) -> Option<T>,
    column_idx: usize,
    column_type: ColumnType,
    path: &str,
) -> Result<Vec<Option<T>>, WorkerError> {
    raw.iter()
        .map(|cell| match cell.and_then(normalize_cell) {
            None => Ok(None),
            Some(value) => parse(value).map(Some).context(InvalidValueSnafu {
                path,
                column_idx,
                column_type,
                value,
            }),
        })
        .collect()
}

/// Converts a text batch to the arrow types of `typed_schema`.
fn type_batch(
    raw: &RecordBatch,
    typed_schema: &SchemaRef,
    dataspec: &DataSpecification,
    path: &str,
) -> Result<RecordBatch, WorkerError> {
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(raw.num_columns());
    for (column_idx, (array, spec)) in raw.columns().iter().zip(&dataspec.columns).enumerate() {
        let text = array.as_string::<i32>();
        let column_type = spec.column_type;
        let typed: ArrayRef = match arrow_type(spec) {
            DataType::Float64 => Arc::new(Float64Array::from(parse_cells(
                text,
                |v| v.parse::<f64>().ok(),
                column_idx,
                column_type,
                path,
            )?)),
            DataType::Boolean => Arc::new(BooleanArray::from(parse_cells(
                text,
                parse_boolean,
                column_idx,
                column_type,
                path,
            )?)),
            _ => Arc::new(StringArray::from(parse_cells(
                text,
                |v| Some(v.to_string()),
                column_idx,
                column_type,
                path,
            )?)),
        };
        columns.push(typed);
    }
    RecordBatch::try_new(typed_schema.clone(), columns).context(CsvSnafu { path })
}

/// Rows whose value in `column_idx` is exactly zero are removed; nulls are kept.
fn drop_zero_rows(batch: &RecordBatch, column_idx: usize) -> Result<RecordBatch, ArrowError> {
    let values = batch
        .column(column_idx)
        .as_primitive_opt::<Float64Type>()
        .ok_or_else(|| {
            ArrowError::InvalidArgumentError(format!(
                "column {column_idx} is not a Float64 column"
            ))
        })?;
    let keep: BooleanArray = values.iter().map(|v| Some(v != Some(0.0))).collect();
    filter_record_batch(batch, &keep)
}

fn validate(request: &WorkerRequest) -> Result<(), WorkerError> {
    let num_columns = request.dataspec.num_columns();
    for &column_idx in request
        .columns
        .iter()
        .chain(request.column_idx_remove_example_with_zero.iter())
    {
        ensure!(
            column_idx < num_columns,
            ColumnOutOfRangeSnafu {
                column_idx,
                num_columns
            }
        );
    }
    if let Some(column_idx) = request.column_idx_remove_example_with_zero {
        let column_type = request.dataspec.columns[column_idx].column_type;
        ensure!(
            column_type == ColumnType::Numerical,
            NonNumericalFilterColumnSnafu {
                column_idx,
                column_type
            }
        );
    }
    Ok(())
}

fn separate_columns(request: &WorkerRequest) -> Result<SeparatedShard, WorkerError> {
    validate(request)?;

    let (paths, format) = shards::list_shards(&request.dataset_path).context(ListShardsSnafu)?;
    ensure!(format == "csv", UnsupportedFormatSnafu { format });

    let text_schema = schema_with(&request.dataspec, |_| DataType::Utf8);
    let schema = schema_with(&request.dataspec, arrow_type);
    let expected: Vec<String> = request
        .dataspec
        .columns
        .iter()
        .map(|c| c.name.clone())
        .collect();

    let mut batches = Vec::new();
    for path in &paths {
        let mut file = File::open(path).context(OpenShardSnafu { path })?;
        let found = read_csv_header(&mut file).context(CsvSnafu { path })?;
        ensure!(
            found == expected,
            HeaderMismatchSnafu {
                path,
                expected: expected.clone(),
                found
            }
        );
        let reader = ReaderBuilder::new(text_schema.clone())
            .with_header(true)
            .build(file)
            .context(CsvSnafu { path })?;
        for batch in reader {
            let raw = batch.context(CsvSnafu { path })?;
            let mut batch = type_batch(&raw, &schema, &request.dataspec, path)?;
            if let Some(column_idx) = request.column_idx_remove_example_with_zero {
                batch = drop_zero_rows(&batch, column_idx).context(CsvSnafu { path })?;
            }
            batches.push(batch);
        }
    }

    let num_examples = batches.iter().map(|b| b.num_rows() as u64).sum();

    let mut files = Vec::with_capacity(request.columns.len());
    for &column_idx in &request.columns {
        let column_schema = Arc::new(Schema::new(vec![schema.field(column_idx).clone()]));
        let mut buffer = Vec::new();
        {
            let mut writer = ArrowWriter::try_new(&mut buffer, column_schema.clone(), None)
                .context(ParquetSnafu { column_idx })?;
            for batch in &batches {
                let column = RecordBatch::try_new(
                    column_schema.clone(),
                    vec![batch.column(column_idx).clone()],
                )
                .map_err(parquet::errors::ParquetError::from)
                .context(ParquetSnafu { column_idx })?;
                writer.write(&column).context(ParquetSnafu { column_idx })?;
            }
            writer.close().context(ParquetSnafu { column_idx })?;
        }
        files.push((
            layout::raw_column_shard_rel_path(column_idx, request.shard_idx, request.num_shards),
            buffer,
        ));
    }

    Ok(SeparatedShard {
        num_examples,
        files,
    })
}

#[async_trait]
impl WorkerHandler for ColumnSeparationWorker {
    async fn run(&self, request: WorkerRequest) -> Result<WorkerResult, WorkerError> {
        let shard_idx = request.shard_idx;
        let location = CacheLocation::local(&request.output_directory);

        // CSV decoding and Parquet encoding are CPU-bound.
        let separated = tokio::task::spawn_blocking(move || separate_columns(&request))
            .await
            .context(BlockingSnafu)??;

        for (rel_path, bytes) in &separated.files {
            storage::write_atomic(&location, rel_path, bytes)
                .await
                .context(StorageSnafu)?;
        }

        debug!(
            "Output shard #{shard_idx}: {} example(s) in {} column file(s)",
            separated.num_examples,
            separated.files.len()
        );

        Ok(WorkerResult {
            shard_idx,
            num_examples: separated.num_examples,
        })
    }
}
