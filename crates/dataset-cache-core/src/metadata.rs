//! Cache descriptors.
//!
//! This module holds the pure metadata model, with no IO:
//! - [`CacheMetadata`]: the global descriptor, one per cache directory,
//!   written once at the end of a successful build.
//! - [`ColumnMetadata`]: per original column, indexed by column position in
//!   the dataspec.
//! - [`ShardMetadata`]: per output shard; its presence on disk marks the
//!   shard as done.
//!
//! Persistence lives in [`store`].

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use store::{MetadataError, MetadataStore};

/// Cached form of a numerical column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NumericalColumn {
    /// Value substituted for missing entries (dataspec mean).
    pub replacement_missing_value: f64,
    /// Whether the column is stored discretized.
    #[serde(default)]
    pub discretized: bool,
    /// Number of discretized values when `discretized` is set.
    #[serde(default)]
    pub num_discretized_values: u64,
    /// Number of distinct values.
    #[serde(default)]
    pub num_unique_values: u64,
}

/// Cached form of a categorical column.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CategoricalColumn {
    /// Number of distinct values.
    pub num_values: u64,
    /// Value substituted for missing entries (most frequent value).
    pub replacement_missing_value: u32,
}

/// Cached form of a boolean column.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BooleanColumn {
    /// Value substituted for missing entries (majority class).
    pub replacement_missing_value: bool,
}

/// Type-specific payload of a cached column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnKind {
    /// See [`NumericalColumn`].
    Numerical(NumericalColumn),
    /// See [`CategoricalColumn`].
    Categorical(CategoricalColumn),
    /// See [`BooleanColumn`].
    Boolean(BooleanColumn),
}

impl ColumnKind {
    /// Upper-case type name used in reports.
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnKind::Numerical(_) => "NUMERICAL",
            ColumnKind::Categorical(_) => "CATEGORICAL",
            ColumnKind::Boolean(_) => "BOOLEAN",
        }
    }
}

/// Metadata of one original column.
///
/// Columns that were not selected for caching have `available == false` and
/// no `kind`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColumnMetadata {
    /// Whether the column is materialized in the cache.
    pub available: bool,
    /// Type-specific payload; `None` for unavailable columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ColumnKind>,
}

impl ColumnMetadata {
    /// A column that is not part of the cache.
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// A cached column with the given payload.
    pub fn available(kind: ColumnKind) -> Self {
        Self {
            available: true,
            kind: Some(kind),
        }
    }

    /// Numerical payload, if any.
    pub fn numerical(&self) -> Option<&NumericalColumn> {
        match &self.kind {
            Some(ColumnKind::Numerical(n)) => Some(n),
            _ => None,
        }
    }

    /// Categorical payload, if any.
    pub fn categorical(&self) -> Option<&CategoricalColumn> {
        match &self.kind {
            Some(ColumnKind::Categorical(c)) => Some(c),
            _ => None,
        }
    }

    /// Boolean payload, if any.
    pub fn boolean(&self) -> Option<&BooleanColumn> {
        match &self.kind {
            Some(ColumnKind::Boolean(b)) => Some(b),
            _ => None,
        }
    }
}

/// Global descriptor of a dataset cache.
///
/// Invariants of a completed cache: `columns.len()` equals the number of
/// dataspec columns, and `num_examples` is the sum of the example counts of
/// all `num_shards` output shards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Total number of examples across all output shards.
    pub num_examples: u64,
    /// Number of output shards in the column files.
    pub num_shards: usize,
    /// Label column, if configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_column_idx: Option<usize>,
    /// Weight column, if configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_column_idx: Option<usize>,
    /// One entry per dataspec column, by column index.
    pub columns: Vec<ColumnMetadata>,
    /// When the descriptor was initialized.
    pub created_at: DateTime<Utc>,
}

impl CacheMetadata {
    /// Empty descriptor with `num_columns` unavailable columns.
    pub fn new(num_columns: usize) -> Self {
        Self {
            num_examples: 0,
            num_shards: 0,
            label_column_idx: None,
            weight_column_idx: None,
            columns: vec![ColumnMetadata::unavailable(); num_columns],
            created_at: Utc::now(),
        }
    }

    /// Indices of the columns materialized in the cache.
    pub fn available_columns(&self) -> impl Iterator<Item = usize> + '_ {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.available)
            .map(|(idx, _)| idx)
    }
}

/// Completion marker of one output shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShardMetadata {
    /// Number of examples written for the shard.
    pub num_examples: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_columns_serialize_without_payload() {
        let json = serde_json::to_string(&ColumnMetadata::unavailable()).expect("serialize");
        assert_eq!(json, r#"{"available":false}"#);
    }

    #[test]
    fn column_kind_is_externally_tagged() {
        let column = ColumnMetadata::available(ColumnKind::Boolean(BooleanColumn {
            replacement_missing_value: true,
        }));
        let json = serde_json::to_string(&column).expect("serialize");
        assert_eq!(
            json,
            r#"{"available":true,"kind":{"Boolean":{"replacement_missing_value":true}}}"#
        );
        let decoded: ColumnMetadata = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(decoded.boolean().map(|b| b.replacement_missing_value), Some(true));
        assert!(decoded.numerical().is_none());
    }

    #[test]
    fn available_columns_lists_selected_indices() {
        let mut meta = CacheMetadata::new(4);
        meta.columns[1] = ColumnMetadata::available(ColumnKind::Categorical(CategoricalColumn {
            num_values: 3,
            replacement_missing_value: 1,
        }));
        meta.columns[3] = ColumnMetadata::available(ColumnKind::Numerical(NumericalColumn {
            replacement_missing_value: 0.5,
            ..NumericalColumn::default()
        }));
        assert_eq!(meta.available_columns().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(meta.columns[1].categorical().map(|c| c.num_values), Some(3));
    }
}
