//! Integration tests for the `dscache` binary.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("dscache"))
}

/// Writes 3 CSV shards of 2 rows each (one zero-weighted) and returns the typed path.
fn write_dataset(dir: &Path) -> std::io::Result<String> {
    for idx in 0..3 {
        std::fs::write(
            dir.join(format!("train-{idx:05}-of-00003")),
            format!("age,color,flag,w\n{idx}1,red,true,1\n{idx}2,blue,false,0\n"),
        )?;
    }
    Ok(format!("csv:{}@3", dir.join("train").display()))
}

fn infer(dataset: &str, output: &Path) {
    cli()
        .args([
            "infer-dataspec",
            "--dataset",
            dataset,
            "--output",
            output.to_string_lossy().as_ref(),
        ])
        .assert()
        .success();
}

#[test]
fn infer_dataspec_prints_json() -> TestResult {
    let tmp = TempDir::new()?;
    let dataset = write_dataset(tmp.path())?;

    cli()
        .args(["infer-dataspec", "--dataset", &dataset])
        .assert()
        .success()
        .stdout(contains("\"name\": \"color\""))
        .stdout(contains("\"type\": \"CATEGORICAL\""))
        .stdout(contains("\"type\": \"BOOLEAN\""));
    Ok(())
}

#[test]
fn create_then_report() -> TestResult {
    let tmp = TempDir::new()?;
    let dataset = write_dataset(tmp.path())?;
    let dataspec = tmp.path().join("spec.json");
    let cache = tmp.path().join("cache");
    infer(&dataset, &dataspec);

    cli()
        .args([
            "create",
            "--dataset",
            &dataset,
            "--dataspec",
            dataspec.to_string_lossy().as_ref(),
            "--cache-dir",
            cache.to_string_lossy().as_ref(),
            "--workers",
            "2",
            "--weight",
            "3",
            "--remove-zero-weighted",
        ])
        .assert()
        .success()
        .stdout(contains("3 example(s) in 3 shard(s)"))
        .stdout(contains("Number of columns: 4"));

    assert!(cache.join("cache_metadata.json").exists());
    assert!(cache.join("raw/2/shard-00002-of-00003.parquet").exists());

    cli()
        .args([
            "report",
            "--cache-dir",
            cache.to_string_lossy().as_ref(),
            "--features",
            "0,3",
        ])
        .assert()
        .success()
        .stdout(contains("Number of examples: 3"))
        .stdout(contains("Statistics on 2 / 4 features"))
        .stdout(contains("column-type: NUMERICAL count: 2"));
    Ok(())
}

#[test]
fn create_applies_config_file_and_flag_overrides() -> TestResult {
    let tmp = TempDir::new()?;
    let dataset = write_dataset(tmp.path())?;
    let dataspec = tmp.path().join("spec.json");
    let cache = tmp.path().join("cache");
    let config = tmp.path().join("config.json");
    infer(&dataset, &dataspec);
    std::fs::write(
        &config,
        r#"{ "weight_column_idx": 1, "remove_zero_weighted_examples": true }"#,
    )?;

    // The config names a categorical weight; --weight overrides it.
    cli()
        .args([
            "create",
            "--dataset",
            &dataset,
            "--dataspec",
            dataspec.to_string_lossy().as_ref(),
            "--cache-dir",
            cache.to_string_lossy().as_ref(),
            "--workers",
            "1",
            "--columns",
            "0",
            "--config",
            config.to_string_lossy().as_ref(),
            "--weight",
            "3",
        ])
        .assert()
        .success()
        .stdout(contains("3 example(s)"));

    let metadata = std::fs::read_to_string(cache.join("cache_metadata.json"))?;
    let metadata: serde_json::Value = serde_json::from_str(&metadata)?;
    assert_eq!(metadata["weight_column_idx"], 3);
    assert_eq!(metadata["columns"][1]["available"], false);
    assert_eq!(metadata["columns"][3]["available"], true);
    Ok(())
}

#[test]
fn create_rejects_categorical_weight() -> TestResult {
    let tmp = TempDir::new()?;
    let dataset = write_dataset(tmp.path())?;
    let dataspec = tmp.path().join("spec.json");
    let cache = tmp.path().join("cache");
    infer(&dataset, &dataspec);

    cli()
        .args([
            "create",
            "--dataset",
            &dataset,
            "--dataspec",
            dataspec.to_string_lossy().as_ref(),
            "--cache-dir",
            cache.to_string_lossy().as_ref(),
            "--workers",
            "1",
            "--weight",
            "1",
            "--remove-zero-weighted",
        ])
        .assert()
        .failure()
        .stderr(contains("only supports numerical weight columns"));

    assert!(!cache.join("cache_metadata.json").exists());
    Ok(())
}

#[test]
fn report_on_missing_cache_fails() -> TestResult {
    let tmp = TempDir::new()?;

    cli()
        .args([
            "report",
            "--cache-dir",
            tmp.path().join("nope").to_string_lossy().as_ref(),
        ])
        .assert()
        .failure()
        .stderr(contains("Failed to open dataset cache").and(contains("Missing cache file")));
    Ok(())
}
