//! Dataset schema and precomputed column statistics.
//!
//! A [`DataSpecification`] describes every column of the source dataset: its
//! semantic type and the statistics gathered over the full dataset (mean of
//! numerical columns, vocabulary of categorical columns, class counts of
//! boolean columns). The cache builder reads the statistics to choose the
//! missing-value replacement of each cached column; it never recomputes
//! them.
//!
//! Dataspecs are stored as JSON. [`inference`] can compute one from a CSV
//! dataset.

pub mod inference;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// Semantic type of a dataset column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnType {
    /// Type could not be determined.
    Unknown,
    /// Real-valued column.
    Numerical,
    /// Numerical column pre-bucketed into a fixed number of bins.
    DiscretizedNumerical,
    /// Column taking values in a finite vocabulary.
    Categorical,
    /// Column whose cells are sets of categorical values.
    CategoricalSet,
    /// Two-valued column.
    Boolean,
    /// Free text.
    String,
    /// Hashed identifier.
    Hash,
}

impl ColumnType {
    /// Upper-case name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Unknown => "UNKNOWN",
            ColumnType::Numerical => "NUMERICAL",
            ColumnType::DiscretizedNumerical => "DISCRETIZED_NUMERICAL",
            ColumnType::Categorical => "CATEGORICAL",
            ColumnType::CategoricalSet => "CATEGORICAL_SET",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::String => "STRING",
            ColumnType::Hash => "HASH",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics of a numerical column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NumericalSpec {
    /// Mean of the non-missing values.
    pub mean: f64,
    /// Smallest observed value.
    #[serde(default)]
    pub min_value: f64,
    /// Largest observed value.
    #[serde(default)]
    pub max_value: f64,
    /// Standard deviation of the non-missing values.
    #[serde(default)]
    pub standard_deviation: f64,
    /// Number of distinct observed values, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_unique_values: Option<u64>,
    /// Number of bins when the column is cached in discretized form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discretized_bins: Option<u64>,
}

/// One entry of a categorical vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyItem {
    /// Integer value the item is encoded as.
    pub index: u32,
    /// Number of occurrences in the dataset.
    pub count: u64,
}

/// Statistics of a categorical column.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CategoricalSpec {
    /// Size of the vocabulary, including the out-of-dictionary item.
    pub number_of_unique_values: u64,
    /// Index of the most frequent item.
    pub most_frequent_value: u32,
    /// Vocabulary: item value to its index and count.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub items: BTreeMap<String, VocabularyItem>,
}

/// Statistics of a boolean column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BooleanSpec {
    /// Number of `true` values.
    pub count_true: u64,
    /// Number of `false` values.
    pub count_false: u64,
}

/// A single column of a [`DataSpecification`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name, as found in the header of the source files.
    pub name: String,
    /// Semantic type.
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Present for numerical columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numerical: Option<NumericalSpec>,
    /// Present for categorical columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categorical: Option<CategoricalSpec>,
    /// Present for boolean columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boolean: Option<BooleanSpec>,
    /// Number of missing values.
    #[serde(default)]
    pub count_nas: u64,
}

impl ColumnSpec {
    /// Numerical column with the given mean.
    pub fn numerical(name: impl Into<String>, mean: f64) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Numerical,
            numerical: Some(NumericalSpec {
                mean,
                ..NumericalSpec::default()
            }),
            categorical: None,
            boolean: None,
            count_nas: 0,
        }
    }

    /// Categorical column with the given vocabulary size and most frequent item.
    pub fn categorical(
        name: impl Into<String>,
        number_of_unique_values: u64,
        most_frequent_value: u32,
    ) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Categorical,
            numerical: None,
            categorical: Some(CategoricalSpec {
                number_of_unique_values,
                most_frequent_value,
                items: BTreeMap::new(),
            }),
            boolean: None,
            count_nas: 0,
        }
    }

    /// Boolean column with the given class counts.
    pub fn boolean(name: impl Into<String>, count_true: u64, count_false: u64) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Boolean,
            numerical: None,
            categorical: None,
            boolean: Some(BooleanSpec {
                count_true,
                count_false,
            }),
            count_nas: 0,
        }
    }

    /// Column of any type without statistics.
    pub fn untyped(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            numerical: None,
            categorical: None,
            boolean: None,
            count_nas: 0,
        }
    }
}

/// Errors raised while decoding a dataspec.
#[derive(Debug, Snafu)]
pub enum DataSpecError {
    /// The document is not a valid JSON dataspec.
    #[snafu(display("Invalid dataspec JSON: {source}"))]
    InvalidJson {
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

/// Schema and statistics of a dataset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataSpecification {
    /// Columns, in the order they appear in the source files.
    pub columns: Vec<ColumnSpec>,
    /// Number of rows scanned when the statistics were computed.
    #[serde(default)]
    pub created_num_rows: u64,
}

impl DataSpecification {
    /// Build a dataspec from its columns.
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self {
            columns,
            created_num_rows: 0,
        }
    }

    /// Decode a dataspec from JSON.
    pub fn from_json(json: &str) -> Result<Self, DataSpecError> {
        serde_json::from_str(json).context(InvalidJsonSnafu)
    }

    /// Encode as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, DataSpecError> {
        serde_json::to_string_pretty(self).context(InvalidJsonSnafu)
    }

    /// Number of columns.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Column at `idx`, if any.
    pub fn column(&self, idx: usize) -> Option<&ColumnSpec> {
        self.columns.get(idx)
    }
}
