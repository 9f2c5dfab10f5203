// SPDX-License-Identifier: PMPL-1.0-or-later

//! Signature database loading from YAML.

use crate::error::ScanError;
use crate::signatures::rules::{LogLayout, RecordRules, SettingsRules, SignatureDatabase};
use crate::types::*;
use anyhow::{Context, Result};
use regex::RegexBuilder;
use serde::Deserialize;
use std::fs;
use std::path::Path;

const BUILTIN_DATABASE: &str = include_str!("../../data/fallout4.yaml");

#[derive(Debug, Deserialize)]
struct DatabaseFile {
    #[serde(default)]
    crashgen: LogLayout,
    #[serde(default)]
    official_components: Vec<String>,
    #[serde(default)]
    settings: SettingsRules,
    #[serde(default)]
    records: RecordRules,
    #[serde(default)]
    signatures: Vec<serde_yaml::Value>,
}

/// One signature as written in the database file; every field is optional
/// so that a bad record can be reported instead of failing the whole file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignatureRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub segment: Option<String>,
    pub contains: Option<String>,
    pub regex: Option<String>,
    pub priority: Option<i32>,
    pub guidance: Option<String>,
    pub min_count: Option<usize>,
    #[serde(default)]
    pub unless: Vec<String>,
    pub requires_main_error: Option<String>,
    /// Stack-suspect signals: `text`, `N|text`, `ME-REQ|text`, `ME-OPT|text`, `NOT|text`.
    #[serde(default)]
    pub signals: Vec<String>,
}

/// The Fallout 4 database compiled into the binary
pub fn builtin() -> Result<SignatureDatabase> {
    from_yaml_str(BUILTIN_DATABASE).context("parsing built-in signature database")
}

pub fn load_database(path: &Path) -> Result<SignatureDatabase> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading signature database {}", path.display()))?;
    from_yaml_str(&content)
        .with_context(|| format!("parsing signature database {}", path.display()))
}

pub fn from_yaml_str(content: &str) -> Result<SignatureDatabase> {
    let file: DatabaseFile = serde_yaml::from_str(content)?;
    Ok(build_database(file))
}

fn build_database(file: DatabaseFile) -> SignatureDatabase {
    let mut db = SignatureDatabase::new(file.crashgen)
        .with_official(file.official_components)
        .with_settings(file.settings)
        .with_records(file.records);

    for (index, value) in file.signatures.into_iter().enumerate() {
        let outcome = serde_yaml::from_value::<SignatureRecord>(value)
            .map_err(|e| ScanError::MalformedDatabase {
                index,
                id: "?".to_string(),
                reason: e.to_string(),
            })
            .and_then(|record| build_signature(index, record))
            .and_then(|signature| {
                db.insert(signature).map_err(|err| match err {
                    ScanError::MalformedDatabase { id, reason, .. } => {
                        ScanError::MalformedDatabase { index, id, reason }
                    }
                    other => other,
                })
            });

        if let Err(err) = outcome {
            tracing::warn!(error = %err, "skipping signature record");
            db.record_skipped(err);
        }
    }

    tracing::debug!(
        signatures = db.len(),
        skipped = db.skipped().len(),
        "signature database loaded"
    );
    db
}

/// Validate one record into a signature.
pub fn build_signature(index: usize, record: SignatureRecord) -> Result<Signature, ScanError> {
    let label = record
        .id
        .clone()
        .or_else(|| record.name.clone())
        .or_else(|| record.contains.clone())
        .or_else(|| record.regex.clone())
        .or_else(|| record.signals.first().cloned())
        .unwrap_or_else(|| "?".to_string());
    let malformed = |reason: &str| ScanError::MalformedDatabase {
        index,
        id: label.clone(),
        reason: reason.to_string(),
    };

    let raw_category = record
        .category
        .as_deref()
        .ok_or_else(|| malformed("missing category"))?;
    let category = Category::parse(raw_category)
        .ok_or_else(|| malformed(&format!("unknown category '{}'", raw_category)))?;

    let priority = record.priority.ok_or_else(|| malformed("missing priority"))?;

    let uses_signals = !record.signals.is_empty();
    let segment = match record.segment.as_deref() {
        Some(raw) => {
            Segment::parse(raw).ok_or_else(|| malformed(&format!("unknown segment '{}'", raw)))?
        }
        None if uses_signals => Segment::Stack,
        None => default_segment(category),
    };

    let predicate = match (record.contains, record.regex) {
        (Some(_), _) | (_, Some(_)) if uses_signals => {
            return Err(malformed("signals combined with contains or regex"))
        }
        (None, None) if uses_signals => {
            if segment != Segment::Stack {
                return Err(malformed("signals only read the stack and main error"));
            }
            if record.min_count.is_some()
                || !record.unless.is_empty()
                || record.requires_main_error.is_some()
            {
                return Err(malformed("signals carry their own modifiers"));
            }
            let signals = record
                .signals
                .iter()
                .map(|raw| {
                    Signal::parse(raw).ok_or_else(|| malformed(&format!("invalid signal '{}'", raw)))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Predicate::Signals(signals)
        }
        (Some(_), Some(_)) => return Err(malformed("both contains and regex given")),
        (Some(needle), None) if needle.is_empty() => return Err(malformed("empty predicate")),
        (Some(needle), None) => Predicate::Pattern(Pattern::Contains(needle)),
        (None, Some(expr)) => {
            let re = RegexBuilder::new(&expr)
                .case_insensitive(segment == Segment::Components)
                .build()
                .map_err(|e| malformed(&format!("invalid regex: {}", e)))?;
            Predicate::Pattern(Pattern::Regex(re))
        }
        (None, None) => return Err(malformed("missing predicate")),
    };

    let guidance = record
        .guidance
        .filter(|g| !g.trim().is_empty())
        .ok_or_else(|| malformed("missing guidance"))?;

    let name = record
        .name
        .unwrap_or_else(|| predicate.describe());
    let id = record.id.unwrap_or_else(|| name.clone());

    Ok(Signature {
        id,
        name,
        category,
        segment,
        predicate,
        priority,
        guidance: guidance.trim_end().to_string(),
        min_count: record.min_count.unwrap_or(1).max(1),
        unless: record.unless,
        requires_main_error: record.requires_main_error,
    })
}

/// Crash suspects read the main error, mod lists read the component list.
fn default_segment(category: Category) -> Segment {
    match category {
        Category::SolvedCulprit => Segment::MainError,
        _ => Segment::Components,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_database_loads_cleanly() {
        let db = builtin().expect("built-in database should parse");
        assert!(db.skipped().is_empty(), "skipped: {:?}", db.skipped());
        for category in Category::all() {
            assert!(
                !db.lookup(category).is_empty(),
                "built-in database has no {} signatures",
                category
            );
        }
        assert_eq!(db.layout().crashgen_name, "Buffout 4");
    }

    #[test]
    fn test_missing_priority_is_malformed() {
        let record = SignatureRecord {
            name: Some("No Priority".to_string()),
            category: Some("patched-mod".to_string()),
            contains: Some("Something".to_string()),
            guidance: Some("text".to_string()),
            ..SignatureRecord::default()
        };
        let err = build_signature(3, record).unwrap_err();
        assert_eq!(
            err,
            ScanError::MalformedDatabase {
                index: 3,
                id: "No Priority".to_string(),
                reason: "missing priority".to_string(),
            }
        );
    }

    #[test]
    fn test_default_segment_follows_category() {
        let record = SignatureRecord {
            category: Some("solved-culprit".to_string()),
            contains: Some("EXCEPTION_STACK_OVERFLOW".to_string()),
            priority: Some(5),
            guidance: Some("Stack overflow".to_string()),
            ..SignatureRecord::default()
        };
        let signature = build_signature(0, record).unwrap();
        assert_eq!(signature.segment, Segment::MainError);
        assert_eq!(signature.id, "EXCEPTION_STACK_OVERFLOW");
    }
}
