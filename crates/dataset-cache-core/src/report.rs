//! Human-readable summary of a cache descriptor.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::metadata::CacheMetadata;

/// Summarize `metadata` over `features`, or over every column when `None`.
///
/// Feature indices past the last column are ignored.
pub fn metadata_report(metadata: &CacheMetadata, features: Option<&[usize]>) -> String {
    let all: Vec<usize>;
    let features = match features {
        Some(features) => features,
        None => {
            all = (0..metadata.columns.len()).collect();
            &all
        }
    };

    let mut count_by_type: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut num_numerical = 0usize;
    let mut num_discretized = 0usize;
    let mut num_le_100_values = 0usize;
    let mut num_le_16k_values = 0usize;
    let mut sum_unique_values = 0u64;
    let mut sum_discretized_values = 0u64;

    for column in features.iter().filter_map(|&idx| metadata.columns.get(idx)) {
        let type_name = column.kind.as_ref().map_or("UNAVAILABLE", |k| k.type_name());
        *count_by_type.entry(type_name).or_default() += 1;

        if let Some(numerical) = column.numerical() {
            num_numerical += 1;
            sum_unique_values += numerical.num_unique_values;
            if numerical.discretized {
                num_discretized += 1;
                sum_discretized_values += numerical.num_discretized_values;
            }
            if numerical.num_unique_values <= 100 {
                num_le_100_values += 1;
            }
            if numerical.num_unique_values <= 16_000 {
                num_le_16k_values += 1;
            }
        }
    }

    let mut report = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(report, "Number of columns: {}", metadata.columns.len());
    let _ = writeln!(report, "Number of examples: {}", metadata.num_examples);
    let _ = writeln!(
        report,
        "Statistics on {} / {} features",
        features.len(),
        metadata.columns.len()
    );
    let _ = writeln!(report, "Columns by type");
    for (type_name, count) in &count_by_type {
        let _ = writeln!(report, "\tcolumn-type: {type_name} count: {count}");
    }

    if num_numerical > 0 {
        let ratio = |count: usize| count as f64 / num_numerical as f64;
        let mean_discretized_values = if num_discretized > 0 {
            sum_discretized_values as f64 / num_discretized as f64
        } else {
            0.0
        };
        let _ = writeln!(report, "Numerical columns:");
        let _ = writeln!(
            report,
            "\tMean number of unique values: {}",
            sum_unique_values / num_numerical as u64
        );
        let _ = writeln!(
            report,
            "\tRatio of discretized numerical columns: {} ({num_discretized})",
            ratio(num_discretized)
        );
        let _ = writeln!(
            report,
            "\tRatio of numerical columns with <=100 values: {} ({num_le_100_values})",
            ratio(num_le_100_values)
        );
        let _ = writeln!(
            report,
            "\tRatio of numerical columns with <=16k values: {} ({num_le_16k_values})",
            ratio(num_le_16k_values)
        );
        let _ = writeln!(
            report,
            "\tMean number of unique values for discretized columns: {mean_discretized_values}"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{BooleanColumn, ColumnKind, ColumnMetadata, NumericalColumn};

    fn numerical(unique: u64, discretized_values: Option<u64>) -> ColumnMetadata {
        ColumnMetadata::available(ColumnKind::Numerical(NumericalColumn {
            replacement_missing_value: 0.0,
            discretized: discretized_values.is_some(),
            num_discretized_values: discretized_values.unwrap_or(0),
            num_unique_values: unique,
        }))
    }

    fn metadata() -> CacheMetadata {
        let mut metadata = CacheMetadata::new(5);
        metadata.num_examples = 1234;
        metadata.columns[0] = numerical(50, None);
        metadata.columns[1] = numerical(150, Some(64));
        metadata.columns[2] = numerical(20_000, None);
        metadata.columns[3] = ColumnMetadata::available(ColumnKind::Boolean(BooleanColumn {
            replacement_missing_value: false,
        }));
        metadata
    }

    #[test]
    fn report_over_all_columns() {
        let report = metadata_report(&metadata(), None);

        assert!(report.contains("Number of columns: 5\n"));
        assert!(report.contains("Number of examples: 1234\n"));
        assert!(report.contains("Statistics on 5 / 5 features\n"));
        assert!(report.contains("\tcolumn-type: NUMERICAL count: 3\n"));
        assert!(report.contains("\tcolumn-type: BOOLEAN count: 1\n"));
        assert!(report.contains("\tcolumn-type: UNAVAILABLE count: 1\n"));
        assert!(report.contains("\tMean number of unique values: 6733\n"));
        assert!(report.contains("Ratio of discretized numerical columns: 0.3333333333333333 (1)"));
        assert!(report.contains("with <=100 values: 0.3333333333333333 (1)"));
        assert!(report.contains("with <=16k values: 0.6666666666666666 (2)"));
        assert!(report.contains("for discretized columns: 64\n"));
    }

    #[test]
    fn report_without_discretized_columns_has_zero_mean() {
        let report = metadata_report(&metadata(), Some(&[0, 2]));
        assert!(report.contains("Statistics on 2 / 5 features\n"));
        assert!(report.contains("for discretized columns: 0\n"));
    }

    #[test]
    fn report_without_numerical_columns_skips_section() {
        let report = metadata_report(&metadata(), Some(&[3]));
        assert!(report.contains("\tcolumn-type: BOOLEAN count: 1\n"));
        assert!(!report.contains("Numerical columns:"));
    }
}
