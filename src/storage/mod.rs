// SPDX-License-Identifier: PMPL-1.0-or-later

//! Persistent storage helpers for crash log reports

use crate::report::ReportOutputFormat;
use crate::types::Report;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Placeholder written over the user's home directory in reports.
pub const REDACTED_HOME: &str = "******";

/// Report path next to a crash log: `crash-x.log` becomes `crash-x-AUTOSCAN.md`.
pub fn report_path(log_path: &Path, format: ReportOutputFormat) -> PathBuf {
    let stem = log_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    log_path.with_file_name(format!("{}-AUTOSCAN.{}", stem, format.extension()))
}

/// Serialize the report and write it beside its crash log.
pub fn write_report(log_path: &Path, report: &Report, format: ReportOutputFormat) -> Result<PathBuf> {
    let path = report_path(log_path, format);
    let content = match home_dir() {
        Some(home) => format.serialize(&sanitize_report(report, &home))?,
        None => format.serialize(report)?,
    };
    fs::write(&path, content).with_context(|| format!("writing report {}", path.display()))?;
    tracing::debug!(report = %path.display(), "report written");
    Ok(path)
}

/// Copy of the report with the home path scrubbed from every text field.
/// Runs before serialization, since JSON escapes the backslashes of a
/// Windows path.
pub fn sanitize_report(report: &Report, home: &Path) -> Report {
    let mut clean = report.clone();
    clean.main_error = sanitize_home(&clean.main_error, home);
    clean.meta.source_file = sanitize_home(&clean.meta.source_file, home);
    for section in &mut clean.sections {
        for line in &mut section.lines {
            *line = sanitize_home(line, home);
        }
    }
    clean
}

/// Replace both slash styles of the home path with a placeholder.
pub fn sanitize_home(content: &str, home: &Path) -> String {
    let Some(name) = home.file_name().map(|n| n.to_string_lossy().to_string()) else {
        return content.to_string();
    };
    if name.is_empty() || !content.contains(&name) {
        return content.to_string();
    }
    let parent = home
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();

    content
        .replace(&format!("{}\\{}", parent, name), REDACTED_HOME)
        .replace(&format!("{}/{}", parent.replace('\\', "/"), name), REDACTED_HOME)
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
        .filter(|p| p.parent().is_some())
}

/// Copy an unsolved crash log and its report into the backup folder.
pub fn backup_unsolved(log_path: &Path, report_path: &Path, backup_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(backup_dir)
        .with_context(|| format!("creating backup folder {}", backup_dir.display()))?;

    let mut copied = Vec::new();
    for source in [log_path, report_path] {
        if !source.exists() {
            continue;
        }
        let Some(name) = source.file_name() else {
            continue;
        };
        let target = backup_dir.join(name);
        fs::copy(source, &target)
            .with_context(|| format!("copying {} to {}", source.display(), target.display()))?;
        copied.push(target);
    }
    Ok(copied)
}
