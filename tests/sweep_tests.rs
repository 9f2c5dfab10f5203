// SPDX-License-Identifier: PMPL-1.0-or-later

//! Batch scanning over crash log directories

use crash_autoscan::report::ReportOutputFormat;
use crash_autoscan::signatures::{self, SignatureDatabase};
use crash_autoscan::sweep::{self, SweepConfig};
use crash_autoscan::types::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const FULL_LOG: &str = include_str!("fixtures/crash-2024-03-01-21-14-07.log");
const OVERFLOW_LOG: &str = include_str!("fixtures/crash-2024-03-02-08-00-00.log");
const NO_HEADER_LOG: &str = include_str!("fixtures/crash-2024-03-03-12-30-45.log");

fn builtin() -> SignatureDatabase {
    signatures::builtin().expect("built-in database should load")
}

fn populate(dir: &Path) {
    fs::write(dir.join("crash-2024-03-01-21-14-07.log"), FULL_LOG).expect("write should succeed");
    fs::write(dir.join("crash-2024-03-02-08-00-00.log"), OVERFLOW_LOG).expect("write should succeed");
    fs::write(dir.join("crash-2024-03-03-12-30-45.log"), NO_HEADER_LOG).expect("write should succeed");
}

#[test]
fn test_discovery_ignores_other_files() {
    let dir = TempDir::new().expect("tempdir should be created");
    populate(dir.path());
    fs::write(dir.path().join("Buffout4.log"), "not a crash log").expect("write should succeed");
    fs::write(dir.path().join("crash-old-AUTOSCAN.md"), "old report").expect("write should succeed");
    fs::write(dir.path().join("notes.txt"), "notes").expect("write should succeed");

    let logs = sweep::discover_logs(dir.path()).expect("discovery should succeed");
    let names: Vec<String> = logs
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "crash-2024-03-01-21-14-07.log",
            "crash-2024-03-02-08-00-00.log",
            "crash-2024-03-03-12-30-45.log",
        ]
    );
}

#[test]
fn test_discovery_rejects_missing_directory() {
    let dir = TempDir::new().expect("tempdir should be created");
    assert!(sweep::discover_logs(&dir.path().join("missing")).is_err());
}

#[test]
fn test_empty_directory_yields_empty_stats() {
    let dir = TempDir::new().expect("tempdir should be created");
    let report = sweep::run(&SweepConfig::new(dir.path()), &builtin()).expect("sweep should succeed");

    assert!(report.results.is_empty());
    assert_eq!(report.stats.scanned, 0);
    assert_eq!(report.stats.total_matches(), 0);
}

#[test]
fn test_reports_written_beside_logs() {
    let dir = TempDir::new().expect("tempdir should be created");
    populate(dir.path());

    let report = sweep::run(&SweepConfig::new(dir.path()), &builtin()).expect("sweep should succeed");

    assert_eq!(report.stats.scanned, 3);
    assert_eq!(report.stats.incomplete, 1);
    assert_eq!(report.stats.unsolved, 1);
    assert_eq!(report.stats.failed, 0);

    let written = dir.path().join("crash-2024-03-01-21-14-07-AUTOSCAN.md");
    let content = fs::read_to_string(&written).expect("report should be written");
    assert!(content.starts_with("crash-2024-03-01-21-14-07.log -> AUTOSCAN REPORT"));
    assert!(content.contains("[!] FOUND : [05] Subway Runner"));
    assert_eq!(report.results[0].report_path.as_deref(), Some(written.as_path()));
}

#[test]
fn test_json_reports() {
    let dir = TempDir::new().expect("tempdir should be created");
    populate(dir.path());
    let config = SweepConfig {
        format: ReportOutputFormat::Json,
        ..SweepConfig::new(dir.path())
    };

    sweep::run(&config, &builtin()).expect("sweep should succeed");

    let content = fs::read_to_string(dir.path().join("crash-2024-03-02-08-00-00-AUTOSCAN.json"))
        .expect("json report should be written");
    let value: serde_json::Value = serde_json::from_str(&content).expect("report should be json");
    assert_eq!(value["status"], "incomplete");
}

#[test]
fn test_parallel_and_sequential_agree() {
    let dir = TempDir::new().expect("tempdir should be created");
    populate(dir.path());
    let db = builtin();

    let parallel = SweepConfig {
        write_reports: false,
        ..SweepConfig::new(dir.path())
    };
    let sequential = SweepConfig {
        parallel: false,
        ..parallel.clone()
    };

    let a = sweep::run(&parallel, &db).expect("parallel sweep should succeed");
    let b = sweep::run(&sequential, &db).expect("sequential sweep should succeed");

    assert_eq!(a.stats, b.stats);
    let renders = |r: &sweep::SweepReport| -> Vec<String> {
        r.results
            .iter()
            .filter_map(|res| res.report.as_ref().map(Report::render))
            .collect()
    };
    assert_eq!(renders(&a), renders(&b));
    assert!(
        !dir.path().join("crash-2024-03-01-21-14-07-AUTOSCAN.md").exists(),
        "write_reports=false leaves the directory untouched"
    );
}

#[test]
fn test_binary_file_counted_as_failure() {
    let dir = TempDir::new().expect("tempdir should be created");
    populate(dir.path());
    fs::write(dir.path().join("crash-binary.log"), [0x4D, 0x5A, 0x00, 0x90, 0x00])
        .expect("write should succeed");

    let report = sweep::run(&SweepConfig::new(dir.path()), &builtin()).expect("sweep should succeed");

    assert_eq!(report.stats.scanned, 3);
    assert_eq!(report.stats.failed, 1);
    let failures: Vec<&str> = report.failures().map(|r| r.log_name.as_str()).collect();
    assert_eq!(failures, vec!["crash-binary.log"]);
    assert!(!dir.path().join("crash-binary-AUTOSCAN.md").exists());
}

#[test]
fn test_unsolved_logs_backed_up() {
    let dir = TempDir::new().expect("tempdir should be created");
    let logs = dir.path().join("logs");
    fs::create_dir_all(&logs).expect("mkdir should succeed");
    populate(&logs);
    let backup = dir.path().join("Unsolved Logs");

    let config = SweepConfig {
        backup_unsolved: Some(backup.clone()),
        ..SweepConfig::new(&logs)
    };
    sweep::run(&config, &builtin()).expect("sweep should succeed");

    assert!(backup.join("crash-2024-03-03-12-30-45.log").exists());
    assert!(backup.join("crash-2024-03-03-12-30-45-AUTOSCAN.md").exists());
    assert!(!backup.join("crash-2024-03-01-21-14-07.log").exists());
}

#[test]
fn test_summary_json_written() {
    let dir = TempDir::new().expect("tempdir should be created");
    populate(dir.path());
    let report = sweep::run(&SweepConfig::new(dir.path()), &builtin()).expect("sweep should succeed");

    let out = dir.path().join("out").join("summary.json");
    sweep::write_report(&report, &out).expect("summary should be written");
    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).expect("summary should exist"))
            .expect("summary should be json");
    assert_eq!(value["stats"]["scanned"], 3);
    assert!(value["results"][0].get("report").is_none());
}
