//! CLI tool for building and inspecting dataset caches.

mod error;

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use dataset_cache_core::dataspec::inference::infer_from_csv;
use dataset_cache_core::pool::{CREATE_DATASET_CACHE_WORKER, LocalWorkerPool, WorkerRegistry};
use dataset_cache_core::{
    CacheBuildConfig, CacheLocation, DataSpecification, create_dataset_cache, load_cache_metadata,
    metadata_report,
};
use log::info;
use snafu::{ResultExt, ensure};

use crate::error::{
    BuildSnafu, CacheDirSnafu, CliResult, EncodeDataspecSnafu, InferSnafu, LoadCacheSnafu,
    NoWorkersSnafu, ParseConfigSnafu, ParseDataspecSnafu, ReadFileSnafu, StartPoolSnafu, TaskSnafu,
    WriteFileSnafu,
};

#[derive(Debug, Subcommand)]
enum Command {
    /// Build (or resume) a dataset cache with local workers
    Create {
        /// Typed dataset path, e.g. csv:/data/train@20
        #[arg(long)]
        dataset: String,

        /// Dataspec JSON file
        #[arg(long)]
        dataspec: PathBuf,

        #[arg(long = "cache-dir")]
        cache_dir: PathBuf,

        /// Number of workers (default: available parallelism)
        #[arg(long)]
        workers: Option<usize>,

        /// Comma-separated column indices to cache (default: all)
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<usize>>,

        #[arg(long)]
        label: Option<usize>,

        #[arg(long)]
        weight: Option<usize>,

        /// Drop the examples whose weight is zero
        #[arg(long = "remove-zero-weighted", default_value_t = false)]
        remove_zero_weighted: bool,

        #[arg(long = "target-shards-per-worker")]
        target_shards_per_worker: Option<usize>,

        /// Build config JSON file; flags override its values
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the metadata report of a completed cache
    Report {
        #[arg(long = "cache-dir")]
        cache_dir: PathBuf,

        /// Comma-separated column indices to summarize (default: all)
        #[arg(long, value_delimiter = ',')]
        features: Option<Vec<usize>>,
    },

    /// Infer a dataspec from CSV shards
    InferDataspec {
        /// Typed dataset path, e.g. csv:/data/train@20
        #[arg(long)]
        dataset: String,

        /// Output file (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

struct CreateArgs {
    dataset: String,
    dataspec: PathBuf,
    cache_dir: PathBuf,
    workers: Option<usize>,
    columns: Option<Vec<usize>>,
    label: Option<usize>,
    weight: Option<usize>,
    remove_zero_weighted: bool,
    target_shards_per_worker: Option<usize>,
    config: Option<PathBuf>,
}

async fn read_file(path: &Path) -> CliResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .context(ReadFileSnafu { path })
}

async fn load_config(args: &CreateArgs) -> CliResult<CacheBuildConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = read_file(path).await?;
            serde_json::from_str(&json).context(ParseConfigSnafu { path })?
        }
        None => CacheBuildConfig::default(),
    };

    if args.label.is_some() {
        config.label_column_idx = args.label;
    }
    if args.weight.is_some() {
        config.weight_column_idx = args.weight;
    }
    if args.remove_zero_weighted {
        config.remove_zero_weighted_examples = true;
    }
    if let Some(target) = args.target_shards_per_worker {
        config.target_shards_per_worker = target;
    }
    Ok(config)
}

fn cache_location(cache_dir: &Path) -> CliResult<CacheLocation> {
    CacheLocation::parse(cache_dir.to_string_lossy().as_ref())
        .context(CacheDirSnafu { path: cache_dir })
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

async fn cmd_create(args: CreateArgs) -> CliResult<()> {
    let start = Instant::now();
    let config = load_config(&args).await?;
    let dataspec = DataSpecification::from_json(&read_file(&args.dataspec).await?)
        .context(ParseDataspecSnafu {
            path: &args.dataspec,
        })?;
    let location = cache_location(&args.cache_dir)?;

    let workers = args.workers.unwrap_or_else(default_workers);
    ensure!(workers > 0, NoWorkersSnafu);
    let mut pool = LocalWorkerPool::from_registry(
        &WorkerRegistry::with_defaults(),
        CREATE_DATASET_CACHE_WORKER,
        workers,
        config.parallel_requests_per_worker,
    )
    .context(StartPoolSnafu)?;

    let metadata = create_dataset_cache(
        &args.dataset,
        &dataspec,
        args.columns.as_deref(),
        &location,
        &config,
        &mut pool,
    )
    .await
    .context(BuildSnafu {
        cache_dir: location.display(),
    })?;

    println!(
        "Dataset cache ready at {}: {} example(s) in {} shard(s) ({:.3}s)",
        location.display(),
        metadata.num_examples,
        metadata.num_shards,
        start.elapsed().as_secs_f64()
    );
    print!("{}", metadata_report(&metadata, None));
    Ok(())
}

async fn cmd_report(cache_dir: &Path, features: Option<Vec<usize>>) -> CliResult<()> {
    let location = cache_location(cache_dir)?;
    let metadata = load_cache_metadata(&location)
        .await
        .context(LoadCacheSnafu {
            cache_dir: location.display(),
        })?;
    print!("{}", metadata_report(&metadata, features.as_deref()));
    Ok(())
}

async fn cmd_infer_dataspec(dataset: String, output: Option<PathBuf>) -> CliResult<()> {
    let typed_path = dataset.clone();
    // Inference reads every shard synchronously.
    let dataspec = tokio::task::spawn_blocking(move || infer_from_csv(&typed_path))
        .await
        .context(TaskSnafu)?
        .context(InferSnafu { dataset: &dataset })?;
    let json = dataspec.to_json_pretty().context(EncodeDataspecSnafu)?;

    match output {
        Some(path) => {
            tokio::fs::write(&path, format!("{json}\n"))
                .await
                .context(WriteFileSnafu { path: &path })?;
            info!(
                "Wrote dataspec with {} column(s) to {}",
                dataspec.num_columns(),
                path.display()
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Create {
            dataset,
            dataspec,
            cache_dir,
            workers,
            columns,
            label,
            weight,
            remove_zero_weighted,
            target_shards_per_worker,
            config,
        } => {
            cmd_create(CreateArgs {
                dataset,
                dataspec,
                cache_dir,
                workers,
                columns,
                label,
                weight,
                remove_zero_weighted,
                target_shards_per_worker,
                config,
            })
            .await
        }

        Command::Report {
            cache_dir,
            features,
        } => cmd_report(&cache_dir, features).await,

        Command::InferDataspec { dataset, output } => cmd_infer_dataspec(dataset, output).await,
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
