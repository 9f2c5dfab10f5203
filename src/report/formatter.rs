// SPDX-License-Identifier: PMPL-1.0-or-later

//! Console formatting for reports, sweeps and the signature table

use crate::signatures::SignatureDatabase;
use crate::sweep::SweepReport;
use crate::types::*;
use colored::*;

pub struct ReportFormatter;

impl ReportFormatter {
    pub fn new() -> Self {
        Self
    }

    /// Print one report with highlighted section banners.
    pub fn print(&self, report: &Report) {
        for section in &report.sections {
            if section.kind == SectionKind::Header {
                for line in &section.lines {
                    println!("{}", line.bold());
                }
                println!();
                continue;
            }

            println!("{}", section.title.bold().cyan());
            for line in &section.lines {
                println!("{}", Self::highlight(line));
            }
            println!();
        }
    }

    fn highlight(line: &str) -> ColoredString {
        if line.contains("[!]") || line.contains("SUSPECT FOUND") {
            line.red()
        } else if line.starts_with("* NOTICE") {
            line.yellow()
        } else if line.starts_with("# FOUND NO") || line.starts_with("* You have the latest") {
            line.green()
        } else {
            line.normal()
        }
    }

    pub fn print_sweep(&self, report: &SweepReport) {
        let stats = &report.stats;
        println!("\n{}", "=== CRASH LOG SCAN SUMMARY ===".bold().cyan());
        println!("Directory: {}", report.directory.display());
        println!();
        println!(
            "  Scanned logs:                 {}",
            stats.scanned.to_string().green().bold()
        );
        println!(
            "  Incomplete logs (no plugins): {}",
            Self::count(stats.incomplete, "yellow")
        );
        println!(
            "  Unsolved logs (no error):     {}",
            Self::count(stats.unsolved, "yellow")
        );
        println!("  Failed logs (unreadable):     {}", Self::count(stats.failed, "red"));
        println!();

        println!("{}", "MATCHES BY CATEGORY".bold().yellow());
        for category in Category::all() {
            let count = stats.matches.get(&category).copied().unwrap_or(0);
            println!("  {:<24} {:>5}", category.as_str(), count);
        }
        println!("  {:<24} {:>5}", "total".bold(), stats.total_matches());
        println!();

        let failures: Vec<_> = report.failures().collect();
        if !failures.is_empty() {
            println!("{}", "UNABLE TO SCAN THE FOLLOWING LOG(S):".bold().red());
            for failure in failures {
                println!(
                    "  {} ({})",
                    failure.log_name,
                    failure.error.as_deref().unwrap_or("unknown error").dimmed()
                );
            }
            println!();
        }

        if stats.scanned == 0 && stats.failed == 0 {
            println!("{}", "No crash logs were found to scan.".yellow());
        } else {
            println!("Reports are written next to each log as crash-*-AUTOSCAN files.");
        }
    }

    fn count(value: usize, color: &str) -> ColoredString {
        if value == 0 {
            value.to_string().normal()
        } else {
            value.to_string().color(color).bold()
        }
    }

    /// Print the loaded signatures in lookup order.
    pub fn print_signatures(&self, db: &SignatureDatabase, only: Option<Category>) {
        let layout = db.layout();
        println!(
            "{} ({} signatures, {} {})",
            "SIGNATURE DATABASE".bold().cyan(),
            db.len(),
            layout.crashgen_name,
            if layout.latest_version.is_empty() {
                "latest unknown".to_string()
            } else {
                format!("latest v{}", layout.latest_version)
            }
        );

        for category in Category::all() {
            if only.is_some_and(|c| c != category) {
                continue;
            }
            println!("\n{}", category.as_str().bold().yellow());
            let signatures = db.lookup(category);
            if signatures.is_empty() {
                println!("  {}", "(none)".dimmed());
            }
            for signature in signatures {
                println!(
                    "  {:>4}  {:<28} {:<11} {}",
                    signature.priority,
                    signature.id,
                    signature.segment.as_str(),
                    signature.predicate.describe().dimmed()
                );
            }
        }

        if !db.skipped().is_empty() {
            println!("\n{}", "SKIPPED RECORDS".bold().red());
            for err in db.skipped() {
                println!("  {}", err);
            }
        }
    }
}

impl Default for ReportFormatter {
    fn default() -> Self {
        Self::new()
    }
}
