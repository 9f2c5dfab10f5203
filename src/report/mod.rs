// SPDX-License-Identifier: PMPL-1.0-or-later

//! Report generation module

pub mod formatter;
pub mod generator;
pub mod output;

use crate::types::*;

pub use formatter::ReportFormatter;
pub use generator::{Findings, ReportGenerator};
pub use output::ReportOutputFormat;

/// Print report to console
pub fn print_report(report: &Report) {
    let formatter = ReportFormatter::new();
    formatter.print(report);
}
