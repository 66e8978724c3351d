//! Dataspec inference over CSV datasets.
//!
//! Every shard is scanned once with all columns read as text. Cells are
//! normalized with [`normalize_cell`]: surrounding whitespace is dropped, and
//! empty cells or non-finite numbers (`NaN`, `inf`) count as missing. A
//! column is then typed as:
//! - `BOOLEAN` when every non-missing value is `true`/`false` (any case),
//! - `NUMERICAL` when every non-missing value parses as a float,
//! - `CATEGORICAL` otherwise.
//!
//! Categorical vocabularies are sorted by decreasing frequency. Index 0 is
//! reserved for the out-of-dictionary item, so the most frequent value is
//! always index 1.

use std::{
    collections::HashMap,
    fs::File,
    io::{Seek, SeekFrom},
    sync::Arc,
};

use arrow::array::AsArray;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow_csv::{ReaderBuilder, reader::Format};
use log::info;
use snafu::{Backtrace, prelude::*};

use crate::dataspec::{
    BooleanSpec, CategoricalSpec, ColumnSpec, ColumnType, DataSpecification, NumericalSpec,
    VocabularyItem,
};
use crate::shards::{self, ShardListingError};

/// Vocabulary entry standing for values unseen at inference time.
pub const OUT_OF_DICTIONARY_ITEM: &str = "<OOD>";

/// Errors raised while inferring a dataspec.
#[derive(Debug, Snafu)]
pub enum InferenceError {
    /// The typed path could not be expanded.
    #[snafu(display("Cannot list dataset shards: {source}"))]
    ListShards {
        /// Underlying listing error.
        #[snafu(source, backtrace)]
        source: ShardListingError,
    },

    /// Only CSV datasets can be scanned.
    #[snafu(display("Dataspec inference does not support the {format:?} format"))]
    UnsupportedFormat {
        /// Format tag of the dataset path.
        format: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A shard could not be opened.
    #[snafu(display("Cannot open dataset shard {path}: {source}"))]
    OpenShard {
        /// Shard path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A shard's header differs from the first shard's.
    #[snafu(display("Header of {path} is {found:?}, expected {expected:?}"))]
    HeaderMismatch {
        /// Shard path.
        path: String,
        /// Header of the first shard.
        expected: Vec<String>,
        /// Header of this shard.
        found: Vec<String>,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A shard is not valid CSV.
    #[snafu(display("Cannot parse CSV shard {path}: {source}"))]
    Csv {
        /// Shard path.
        path: String,
        /// Underlying Arrow error.
        source: ArrowError,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },
}

#[derive(Debug, Clone)]
struct ColumnAccumulator {
    counts: HashMap<String, u64>,
    count_nas: u64,
    num_values: u64,
    not_numerical: bool,
    not_boolean: bool,
    sum: f64,
    sum_squares: f64,
    min: f64,
    max: f64,
}

impl ColumnAccumulator {
    fn new() -> Self {
        Self {
            counts: HashMap::new(),
            count_nas: 0,
            num_values: 0,
            not_numerical: false,
            not_boolean: false,
            sum: 0.0,
            sum_squares: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn add(&mut self, value: Option<&str>) {
        let Some(value) = value.and_then(normalize_cell) else {
            self.count_nas += 1;
            return;
        };

        self.num_values += 1;
        *self.counts.entry(value.to_string()).or_default() += 1;

        if parse_boolean(value).is_none() {
            self.not_boolean = true;
        }

        if !self.not_numerical {
            match value.parse::<f64>() {
                Ok(x) => {
                    self.sum += x;
                    self.sum_squares += x * x;
                    self.min = self.min.min(x);
                    self.max = self.max.max(x);
                }
                Err(_) => self.not_numerical = true,
            }
        }
    }

    fn finish(self, name: String) -> ColumnSpec {
        let mut column = if self.num_values == 0 {
            ColumnSpec::numerical(name, 0.0)
        } else if !self.not_boolean {
            let count_true = self
                .counts
                .iter()
                .filter(|(value, _)| value.eq_ignore_ascii_case("true"))
                .map(|(_, count)| count)
                .sum::<u64>();
            let mut column = ColumnSpec::untyped(name, ColumnType::Boolean);
            column.boolean = Some(BooleanSpec {
                count_true,
                count_false: self.num_values - count_true,
            });
            column
        } else if !self.not_numerical {
            let n = self.num_values as f64;
            let mean = self.sum / n;
            let variance = (self.sum_squares / n - mean * mean).max(0.0);
            let mut column = ColumnSpec::untyped(name, ColumnType::Numerical);
            column.numerical = Some(NumericalSpec {
                mean,
                min_value: self.min,
                max_value: self.max,
                standard_deviation: variance.sqrt(),
                num_unique_values: Some(self.counts.len() as u64),
                discretized_bins: None,
            });
            column
        } else {
            let mut by_frequency: Vec<(String, u64)> = self.counts.into_iter().collect();
            by_frequency.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

            let mut items = by_frequency
                .into_iter()
                .enumerate()
                .map(|(rank, (value, count))| {
                    let index = u32::try_from(rank + 1).unwrap_or(u32::MAX);
                    (value, VocabularyItem { index, count })
                })
                .collect::<std::collections::BTreeMap<_, _>>();
            items.insert(
                OUT_OF_DICTIONARY_ITEM.to_string(),
                VocabularyItem { index: 0, count: 0 },
            );

            let mut column = ColumnSpec::untyped(name, ColumnType::Categorical);
            column.categorical = Some(CategoricalSpec {
                number_of_unique_values: items.len() as u64,
                most_frequent_value: 1,
                items,
            });
            column
        };
        column.count_nas = self.count_nas;
        column
    }
}

/// Value of a raw CSV cell, or `None` when it counts as missing.
///
/// Shared with the column separation worker so that cached values follow the
/// types inferred here.
pub(crate) fn normalize_cell(raw: &str) -> Option<&str> {
    let value = raw.trim();
    let non_finite = value.parse::<f64>().is_ok_and(|x| !x.is_finite());
    (!value.is_empty() && !non_finite).then_some(value)
}

/// `true`/`false` in any case.
pub(crate) fn parse_boolean(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Column names of an open CSV shard. The file is rewound afterwards.
pub(crate) fn read_csv_header(file: &mut File) -> Result<Vec<String>, ArrowError> {
    let (schema, _) = Format::default()
        .with_header(true)
        .infer_schema(&mut *file, Some(0))?;
    file.seek(SeekFrom::Start(0))?;
    Ok(schema.fields().iter().map(|f| f.name().clone()).collect())
}

fn open_shard(path: &str) -> Result<(File, Vec<String>), InferenceError> {
    let mut file = File::open(path).context(OpenShardSnafu { path })?;
    let header = read_csv_header(&mut file).context(CsvSnafu { path })?;
    Ok((file, header))
}

/// Scan every shard of a `csv:` dataset and compute its dataspec.
///
/// Column names come from the header of the first shard; every shard must
/// share that header.
pub fn infer_from_csv(typed_path: &str) -> Result<DataSpecification, InferenceError> {
    let (shard_paths, format) = shards::list_shards(typed_path).context(ListShardsSnafu)?;
    ensure!(format == "csv", UnsupportedFormatSnafu { format });

    let (_, names) = open_shard(&shard_paths[0])?;
    let schema = Arc::new(Schema::new(
        names
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));

    let mut accumulators = vec![ColumnAccumulator::new(); names.len()];
    let mut num_rows = 0u64;

    for path in &shard_paths {
        let (file, header) = open_shard(path)?;
        ensure!(
            header == names,
            HeaderMismatchSnafu {
                path,
                expected: names.clone(),
                found: header
            }
        );
        let reader = ReaderBuilder::new(schema.clone())
            .with_header(true)
            .build(file)
            .context(CsvSnafu { path })?;

        for batch in reader {
            let batch = batch.context(CsvSnafu { path })?;
            num_rows += batch.num_rows() as u64;
            for (acc, column) in accumulators.iter_mut().zip(batch.columns()) {
                for value in column.as_string::<i32>().iter() {
                    acc.add(value);
                }
            }
        }
    }

    info!(
        "Inferred dataspec of {} column(s) over {} row(s) in {} shard(s)",
        names.len(),
        num_rows,
        shard_paths.len()
    );

    Ok(DataSpecification {
        columns: accumulators
            .into_iter()
            .zip(names)
            .map(|(acc, name)| acc.finish(name))
            .collect(),
        created_num_rows: num_rows,
    })
}
