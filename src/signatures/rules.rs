// SPDX-License-Identifier: PMPL-1.0-or-later

//! Signature database
//!
//! An immutable table of signatures grouped by category, plus the static
//! knowledge the matcher needs about the log layout, official content,
//! settings checks and named-record markers.

use crate::error::ScanError;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// How the crash generator lays out its logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogLayout {
    /// Prefix of the crash generator's version line, e.g. `Buffout 4`.
    pub crashgen_name: String,
    /// Newest crash generator release known to the database.
    pub latest_version: String,
    /// Script extender acronym used for the `<XSE> PLUGINS:` header.
    pub script_extender: String,
    /// Prefix of the game version line, e.g. `Fallout 4`.
    pub game_name: String,
}

impl Default for LogLayout {
    fn default() -> Self {
        Self {
            crashgen_name: "Buffout 4".to_string(),
            latest_version: String::new(),
            script_extender: "F4SE".to_string(),
            game_name: "Fallout 4".to_string(),
        }
    }
}

/// Expected value for one crash generator setting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingCheck {
    pub setting: String,
    pub expect: String,
    /// Only checked when this component is loaded.
    #[serde(default)]
    pub when_component: Option<String>,
    pub guidance: String,
}

/// Settings whose `false` value is expected while a component is loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalIgnore {
    pub when_component: String,
    pub settings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsRules {
    /// Settings that may be `false` without a notice.
    #[serde(default)]
    pub ignore_disabled: Vec<String>,
    #[serde(default)]
    pub conditional_ignores: Vec<ConditionalIgnore>,
    #[serde(default)]
    pub checks: Vec<SettingCheck>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRules {
    /// Substrings marking a stack line as a named record.
    #[serde(default)]
    pub markers: Vec<String>,
    #[serde(default)]
    pub ignore: Vec<String>,
}

/// Read-only signature table, loaded once per run
#[derive(Debug, Clone, Default)]
pub struct SignatureDatabase {
    layout: LogLayout,
    official: Vec<String>,
    settings: SettingsRules,
    records: RecordRules,
    by_category: BTreeMap<Category, Vec<Signature>>,
    skipped: Vec<ScanError>,
}

impl SignatureDatabase {
    pub fn new(layout: LogLayout) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    pub fn with_official(mut self, names: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        self.official = names
            .into_iter()
            .map(|n| normalize_name(n.as_ref()))
            .collect();
        self
    }

    pub fn with_settings(mut self, settings: SettingsRules) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_records(mut self, records: RecordRules) -> Self {
        self.records = records;
        self
    }

    pub(crate) fn record_skipped(&mut self, error: ScanError) {
        self.skipped.push(error);
    }

    /// Add a signature. Lookup order stays descending priority, ties in
    /// insertion order.
    pub fn insert(&mut self, signature: Signature) -> Result<(), ScanError> {
        if self.contains_id(&signature.id) {
            return Err(ScanError::MalformedDatabase {
                index: self.len(),
                id: signature.id.clone(),
                reason: "duplicate signature id".to_string(),
            });
        }
        let bucket = self.by_category.entry(signature.category).or_default();
        bucket.push(signature);
        bucket.sort_by_key(|s| Reverse(s.priority));
        Ok(())
    }

    /// Signatures of one category, strongest first
    pub fn lookup(&self, category: Category) -> &[Signature] {
        self.by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every signature, category by category, in lookup order
    pub fn signatures(&self) -> impl Iterator<Item = &Signature> {
        Category::all()
            .into_iter()
            .flat_map(move |category| self.lookup(category).iter())
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.by_category
            .values()
            .flatten()
            .any(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.by_category.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn layout(&self) -> &LogLayout {
        &self.layout
    }

    pub fn settings(&self) -> &SettingsRules {
        &self.settings
    }

    pub fn records(&self) -> &RecordRules {
        &self.records
    }

    /// Records rejected while loading
    pub fn skipped(&self) -> &[ScanError] {
        &self.skipped
    }

    /// Whether a component belongs to the base game or official content
    pub fn is_official(&self, entry: &ComponentEntry) -> bool {
        let name = entry.normalized_name();
        self.official.iter().any(|official| *official == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature(id: &str, priority: i32) -> Signature {
        Signature {
            id: id.to_string(),
            name: id.to_string(),
            category: Category::FrequentCrashMod,
            segment: Segment::Components,
            predicate: Predicate::Pattern(Pattern::Contains(id.to_string())),
            priority,
            guidance: format!("{} guidance", id),
            min_count: 1,
            unless: Vec::new(),
            requires_main_error: None,
        }
    }

    #[test]
    fn test_lookup_orders_by_priority_then_insertion() {
        let mut db = SignatureDatabase::new(LogLayout::default());
        db.insert(signature("low", 1)).unwrap();
        db.insert(signature("first-high", 5)).unwrap();
        db.insert(signature("mid", 3)).unwrap();
        db.insert(signature("second-high", 5)).unwrap();

        let ids: Vec<_> = db
            .lookup(Category::FrequentCrashMod)
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["first-high", "second-high", "mid", "low"]);
        assert!(db.lookup(Category::PatchedMod).is_empty());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut db = SignatureDatabase::new(LogLayout::default());
        db.insert(signature("dup", 1)).unwrap();
        let err = db.insert(signature("dup", 9)).unwrap_err();
        assert!(matches!(err, ScanError::MalformedDatabase { .. }));
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn test_official_match_is_case_insensitive() {
        let db = SignatureDatabase::new(LogLayout::default()).with_official(["Fallout4.esm"]);
        let entry = ComponentEntry {
            index: "00".to_string(),
            name: "fallout4.ESM".to_string(),
            kind: ComponentKind::Plugin,
            form_ids: Vec::new(),
        };
        assert!(db.is_official(&entry));
    }
}
