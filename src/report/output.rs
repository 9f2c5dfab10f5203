// SPDX-License-Identifier: PMPL-1.0-or-later

//! Serialization helpers for written/exported reports

use crate::types::Report;
use anyhow::Result;
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportOutputFormat {
    /// Plain-text sections, the `-AUTOSCAN.md` layout
    #[default]
    #[value(alias = "md")]
    Markdown,
    Json,
    #[value(alias = "yml")]
    Yaml,
}

impl ReportOutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportOutputFormat::Markdown => "md",
            ReportOutputFormat::Json => "json",
            ReportOutputFormat::Yaml => "yaml",
        }
    }

    pub fn serialize(&self, report: &Report) -> Result<String> {
        match self {
            ReportOutputFormat::Markdown => Ok(report.render()),
            ReportOutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
            ReportOutputFormat::Yaml => Ok(serde_yaml::to_string(report)?),
        }
    }
}
