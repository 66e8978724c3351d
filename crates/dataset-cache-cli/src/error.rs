use std::path::PathBuf;

use dataset_cache_core::BuildError;
use dataset_cache_core::dataspec::DataSpecError;
use dataset_cache_core::dataspec::inference::InferenceError;
use dataset_cache_core::pool::PoolError;
use dataset_cache_core::storage::StorageError;
use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Cannot read {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Cannot write {}: {source}", path.display()))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Invalid build config {}: {source}", path.display()))]
    ParseConfig {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("Invalid dataspec {}: {source}", path.display()))]
    ParseDataspec {
        path: PathBuf,
        source: DataSpecError,
    },

    #[snafu(display("Cannot encode dataspec: {source}"))]
    EncodeDataspec { source: DataSpecError },

    #[snafu(display("Invalid --cache-dir '{}': {source}", path.display()))]
    CacheDir {
        path: PathBuf,
        source: StorageError,
    },

    #[snafu(display("--workers must be at least 1"))]
    NoWorkers,

    #[snafu(display("Cannot start workers: {source}"))]
    StartPool { source: PoolError },

    #[snafu(display(
        "Failed to build dataset cache in {cache_dir}: {source}. \
         Re-run the same command to resume."
    ))]
    Build {
        cache_dir: String,
        #[snafu(source(from(BuildError, Box::new)))]
        source: Box<BuildError>,
    },

    #[snafu(display(
        "Failed to open dataset cache at {cache_dir}: {source}. \
         Ensure the build completed."
    ))]
    LoadCache {
        cache_dir: String,
        #[snafu(source(from(BuildError, Box::new)))]
        source: Box<BuildError>,
    },

    #[snafu(display("Background task failed: {source}"))]
    Task { source: tokio::task::JoinError },

    #[snafu(display("Failed to infer dataspec of {dataset}: {source}"))]
    Infer {
        dataset: String,
        #[snafu(source(from(InferenceError, Box::new)))]
        source: Box<InferenceError>,
    },
}
