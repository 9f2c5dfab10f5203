// SPDX-License-Identifier: PMPL-1.0-or-later

//! Sweep: batch scanning of a crash log directory
//!
//! Walks a directory for `crash-*.log` files, runs the pipeline on each one
//! (sequentially or on the rayon pool), writes the sibling reports and
//! reduces the per-log tallies into one `ScanStats`.

use crate::error::ScanError;
use crate::pipeline;
use crate::report::{ReportFormatter, ReportOutputFormat};
use crate::signatures::SignatureDatabase;
use crate::storage;
use crate::types::*;
use anyhow::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Configuration for a sweep run
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Directory to search for crash logs
    pub directory: PathBuf,
    pub format: ReportOutputFormat,
    /// Run on the rayon pool instead of one log at a time
    pub parallel: bool,
    /// Write each report next to its log
    pub write_reports: bool,
    /// Copy unsolved logs and their reports here
    pub backup_unsolved: Option<PathBuf>,
    /// Overrides the database's latest crash generator version
    pub latest_version: Option<String>,
}

impl SweepConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            format: ReportOutputFormat::Markdown,
            parallel: true,
            write_reports: true,
            backup_unsolved: None,
            latest_version: None,
        }
    }
}

/// Batch tally. Additive, so any split of a batch merges to the same value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Logs that produced a report
    pub scanned: usize,
    /// Reports without a plugin list
    pub incomplete: usize,
    /// Reports without a main error header
    pub unsolved: usize,
    /// Logs that could not be read
    pub failed: usize,
    pub matches: BTreeMap<Category, usize>,
}

impl ScanStats {
    pub fn from_report(report: &Report) -> Self {
        Self {
            scanned: 1,
            incomplete: usize::from(report.status == ReportStatus::Incomplete),
            unsolved: usize::from(report.status == ReportStatus::Unsolved),
            failed: 0,
            matches: report.stats.matches.clone(),
        }
    }

    pub fn failure() -> Self {
        Self {
            failed: 1,
            ..Self::default()
        }
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.scanned += other.scanned;
        self.incomplete += other.incomplete;
        self.unsolved += other.unsolved;
        self.failed += other.failed;
        for (category, count) in other.matches {
            *self.matches.entry(category).or_insert(0) += count;
        }
        self
    }

    pub fn total_matches(&self) -> usize {
        self.matches.values().sum()
    }
}

/// What happened to one crash log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogResult {
    pub log_path: PathBuf,
    pub log_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ReportStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub report: Option<Report>,
}

/// Complete sweep report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub created_at: String,
    pub directory: PathBuf,
    pub stats: ScanStats,
    pub results: Vec<LogResult>,
}

impl SweepReport {
    pub fn failures(&self) -> impl Iterator<Item = &LogResult> {
        self.results.iter().filter(|r| r.error.is_some())
    }
}

/// Find all `crash-*.log` files under the directory, sorted by path
pub fn discover_logs(directory: &Path) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        anyhow::bail!("Not a directory: {}", directory.display());
    }

    let mut logs: Vec<PathBuf> = WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_crash_log(path))
        .collect();

    logs.sort();
    Ok(logs)
}

fn is_crash_log(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let lower = name.to_ascii_lowercase();
    lower.starts_with("crash-") && lower.ends_with(".log")
}

/// Run sweep across every crash log in a directory
pub fn run(config: &SweepConfig, db: &SignatureDatabase) -> Result<SweepReport> {
    let logs = discover_logs(&config.directory)?;
    tracing::info!(
        directory = %config.directory.display(),
        logs = logs.len(),
        parallel = config.parallel,
        "starting crash log sweep"
    );

    let results: Vec<LogResult> = if config.parallel {
        logs.par_iter().map(|path| scan_one(path, config, db)).collect()
    } else {
        logs.iter().map(|path| scan_one(path, config, db)).collect()
    };

    let stats = results
        .iter()
        .map(|r| match &r.report {
            Some(report) => ScanStats::from_report(report),
            None => ScanStats::failure(),
        })
        .fold(ScanStats::default(), ScanStats::merge);

    tracing::info!(
        scanned = stats.scanned,
        incomplete = stats.incomplete,
        unsolved = stats.unsolved,
        failed = stats.failed,
        "crash log sweep complete"
    );

    Ok(SweepReport {
        created_at: chrono::Utc::now().to_rfc3339(),
        directory: config.directory.clone(),
        stats,
        results,
    })
}

fn scan_one(path: &Path, config: &SweepConfig, db: &SignatureDatabase) -> LogResult {
    let log_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let log = match CrashLog::read(path) {
        Ok(log) => log,
        Err(err) => {
            tracing::warn!(error = %err, "skipping crash log");
            return LogResult::failed(path, log_name, &err);
        }
    };

    let latest = config
        .latest_version
        .clone()
        .unwrap_or_else(|| db.layout().latest_version.clone());
    let meta = ReportMeta::new(&log.file_name, latest);
    let report = pipeline::analyze(&log, db, &meta);

    let mut result = LogResult {
        log_path: path.to_path_buf(),
        log_name,
        status: Some(report.status),
        report_path: None,
        error: None,
        report: None,
    };

    if config.write_reports {
        match storage::write_report(path, &report, config.format) {
            Ok(written) => {
                if report.status == ReportStatus::Unsolved {
                    if let Some(backup) = &config.backup_unsolved {
                        if let Err(err) = storage::backup_unsolved(path, &written, backup) {
                            tracing::warn!(error = %err, log = %path.display(), "backup of unsolved log failed");
                        }
                    }
                }
                result.report_path = Some(written);
            }
            Err(err) => {
                tracing::warn!(error = %err, log = %path.display(), "failed to write report");
                result.error = Some(format!("{:#}", err));
            }
        }
    }

    result.report = Some(report);
    result
}

impl LogResult {
    fn failed(path: &Path, log_name: String, err: &ScanError) -> Self {
        Self {
            log_path: path.to_path_buf(),
            log_name,
            status: None,
            report_path: None,
            error: Some(err.to_string()),
            report: None,
        }
    }
}

/// Print the batch summary to the terminal
pub fn print_summary(report: &SweepReport, quiet: bool) {
    if quiet {
        return;
    }
    ReportFormatter::new().print_sweep(report);
}

/// Write sweep report as JSON
pub fn write_report(report: &SweepReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json)?;
    Ok(())
}
