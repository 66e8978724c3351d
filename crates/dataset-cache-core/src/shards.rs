//! Typed, sharded dataset paths.
//!
//! Source datasets are addressed as `<format>:<path>`, where `<path>` is one
//! of:
//!
//! - `/a/b@N`: `N` shards named `/a/b-00000-of-0000N` .. `/a/b-0000{N-1}-of-0000N`
//! - `/a/b,/c/d`: an explicit, comma-separated list of shards
//! - `/a/b`: a single file
//!
//! ```text
//! list_shards("csv:/a/b@2")
//!   => (["/a/b-00000-of-00002", "/a/b-00001-of-00002"], "csv")
//! ```
//!
//! Listing is purely syntactic: shard files are not opened here.

use snafu::{Backtrace, prelude::*};

/// Number of digits used in zero-padded input shard names.
pub const INPUT_SHARD_DIGITS: usize = 5;

/// Errors raised while expanding a typed dataset path.
#[derive(Debug, Snafu)]
pub enum ShardListingError {
    /// The path lacks the `<format>:` prefix.
    #[snafu(display("Dataset path {typed_path:?} has no format prefix (expected \"<format>:<path>\")"))]
    MissingFormat {
        /// The offending path.
        typed_path: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// The `@<count>` suffix is not a positive integer.
    #[snafu(display("Invalid shard count {count:?} in dataset path {path:?}"))]
    InvalidShardCount {
        /// Untyped path being expanded.
        path: String,
        /// Text following `@`.
        count: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// Expansion produced no shard.
    #[snafu(display("Dataset path {typed_path:?} does not contain any shard"))]
    NoShards {
        /// The offending path.
        typed_path: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },
}

/// Split `"csv:/a/b"` into `("csv", "/a/b")`.
pub fn split_type_and_path(typed_path: &str) -> Result<(String, String), ShardListingError> {
    match typed_path.split_once(':') {
        Some((format, path)) if !format.is_empty() => Ok((format.to_string(), path.to_string())),
        _ => MissingFormatSnafu {
            typed_path: typed_path.to_string(),
        }
        .fail(),
    }
}

/// Name of shard `shard_idx` out of `num_shards` for a sharded base path.
pub fn sharded_file_name(base: &str, shard_idx: usize, num_shards: usize) -> String {
    format!(
        "{base}-{:0width$}-of-{:0width$}",
        shard_idx,
        num_shards,
        width = INPUT_SHARD_DIGITS
    )
}

/// Expand an untyped path into the list of shard paths it designates.
pub fn expand_input_shards(path: &str) -> Result<Vec<String>, ShardListingError> {
    let mut shards = Vec::new();
    for part in path.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.rsplit_once('@') {
            Some((base, count)) => {
                let num_shards = count
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .context(InvalidShardCountSnafu {
                        path: part.to_string(),
                        count: count.to_string(),
                    })?;
                shards.extend((0..num_shards).map(|idx| sharded_file_name(base, idx, num_shards)));
            }
            None => shards.push(part.to_string()),
        }
    }
    Ok(shards)
}

/// List the shards and the format tag of a typed dataset path.
pub fn list_shards(typed_path: &str) -> Result<(Vec<String>, String), ShardListingError> {
    let (format, path) = split_type_and_path(typed_path)?;
    let shards = expand_input_shards(&path)?;
    ensure!(
        !shards.is_empty(),
        NoShardsSnafu {
            typed_path: typed_path.to_string(),
        }
    );
    Ok((shards, format))
}

/// Inverse of [`list_shards`] for an explicit list: `"csv:/a,/b"`.
pub fn join_typed_path(format: &str, shards: &[String]) -> String {
    format!("{format}:{}", shards.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_sharded_path() {
        let (shards, format) = list_shards("csv:/a/b@2").expect("list");
        assert_eq!(format, "csv");
        assert_eq!(shards, vec!["/a/b-00000-of-00002", "/a/b-00001-of-00002"]);
    }

    #[test]
    fn list_comma_separated_paths() {
        let (shards, format) = list_shards("csv:/x.csv, /y.csv,/z@1").expect("list");
        assert_eq!(format, "csv");
        assert_eq!(shards, vec!["/x.csv", "/y.csv", "/z-00000-of-00001"]);
    }

    #[test]
    fn list_single_file() {
        let (shards, _) = list_shards("tfrecord:/data/train").expect("list");
        assert_eq!(shards, vec!["/data/train"]);
    }

    #[test]
    fn missing_format_is_rejected() {
        let err = list_shards("/a/b@2").expect_err("no format");
        assert!(matches!(err, ShardListingError::MissingFormat { .. }));
        let err = list_shards(":/a/b").expect_err("empty format");
        assert!(matches!(err, ShardListingError::MissingFormat { .. }));
    }

    #[test]
    fn invalid_shard_counts_are_rejected() {
        for path in ["csv:/a@0", "csv:/a@many", "csv:/a@"] {
            let err = list_shards(path).expect_err("invalid count");
            assert!(
                matches!(err, ShardListingError::InvalidShardCount { .. }),
                "{path}: {err:?}"
            );
        }
    }

    #[test]
    fn empty_path_has_no_shards() {
        let err = list_shards("csv:").expect_err("empty");
        assert!(matches!(err, ShardListingError::NoShards { .. }));
    }

    #[test]
    fn join_typed_path_round_trips_explicit_lists() {
        let shards = vec!["/a-00000-of-00002".to_string(), "/a-00001-of-00002".to_string()];
        let joined = join_typed_path("csv", &shards);
        assert_eq!(joined, "csv:/a-00000-of-00002,/a-00001-of-00002");
        let (listed, format) = list_shards(&joined).expect("list");
        assert_eq!(listed, shards);
        assert_eq!(format, "csv");
    }
}
