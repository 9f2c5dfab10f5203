// SPDX-License-Identifier: PMPL-1.0-or-later

//! Core type definitions for crash-autoscan
//!
//! Raw crash logs, their parsed segments, signatures and matches, and the
//! rendered report handed back to callers.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Placeholder used whenever a field could not be extracted from a log.
pub const UNKNOWN: &str = "UNKNOWN";

/// Load-order prefix reserved for runtime-allocated identifiers.
pub const DYNAMIC_PREFIX: &str = "FF";

/// Finding categories, in report order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    SolvedCulprit,
    FrequentCrashMod,
    PatchedMod,
    CollectionPatchedMod,
}

impl Category {
    pub fn all() -> [Self; 4] {
        [
            Category::SolvedCulprit,
            Category::FrequentCrashMod,
            Category::PatchedMod,
            Category::CollectionPatchedMod,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::SolvedCulprit => "solved-culprit",
            Category::FrequentCrashMod => "frequent-crash-mod",
            Category::PatchedMod => "patched-mod",
            Category::CollectionPatchedMod => "collection-patched-mod",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "solved-culprit" | "solved" | "suspect" => Some(Category::SolvedCulprit),
            "frequent-crash-mod" | "frequent" => Some(Category::FrequentCrashMod),
            "patched-mod" | "patched" => Some(Category::PatchedMod),
            "collection-patched-mod" | "collection-patched" => {
                Some(Category::CollectionPatchedMod)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed log segment a signature is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Segment {
    MainError,
    Settings,
    Stack,
    Components,
}

impl Segment {
    pub fn as_str(self) -> &'static str {
        match self {
            Segment::MainError => "main-error",
            Segment::Settings => "settings",
            Segment::Stack => "stack",
            Segment::Components => "components",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "main-error" | "mainerror" | "error" => Some(Segment::MainError),
            "settings" => Some(Segment::Settings),
            "stack" | "callstack" | "call-stack" => Some(Segment::Stack),
            "components" | "plugins" | "mods" => Some(Segment::Components),
            _ => None,
        }
    }
}

/// One crash log as handed over by the file-reading collaborator
#[derive(Debug, Clone)]
pub struct CrashLog {
    pub file_name: String,
    pub content: String,
    /// Set when the bytes were not valid UTF-8 and a fallback decoder was used.
    pub decode_failed: bool,
}

impl CrashLog {
    pub fn new(file_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
            decode_failed: false,
        }
    }
}

/// The exception line at the top of a crash log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainError {
    pub kind: String,
    pub address: Option<String>,
    /// Faulting `module+offset` token, e.g. `Fallout4.exe+0C6D8E3`.
    pub location: Option<String>,
    pub line: String,
}

impl MainError {
    pub fn unknown() -> Self {
        Self {
            kind: UNKNOWN.to_string(),
            address: None,
            location: None,
            line: UNKNOWN.to_string(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.line == UNKNOWN
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Plugin,
    Module,
}

/// One entry of the loaded-component list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentEntry {
    /// Load-order identifier as printed between brackets (`05`, `FE:000`),
    /// or `DLL` for script-extender modules.
    pub index: String,
    pub name: String,
    pub kind: ComponentKind,
    /// Form identifiers from the stack whose prefix points at this entry.
    #[serde(default)]
    pub form_ids: Vec<String>,
}

impl ComponentEntry {
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    pub fn is_dynamic(&self) -> bool {
        self.index.to_ascii_uppercase().starts_with(DYNAMIC_PREFIX)
    }

    pub fn label(&self) -> String {
        format!("[{}] {}", self.index, self.name)
    }
}

/// Lowercase, trim and collapse inner whitespace.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A `Key: Value` pair echoed from the crash generator's configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub section: Option<String>,
    pub key: String,
    pub value: String,
}

impl Setting {
    pub fn as_line(&self) -> String {
        format!("{}: {}", self.key, self.value)
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self.value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "yes" => Some(true),
            "false" | "0" | "off" | "no" => Some(false),
            _ => None,
        }
    }
}

/// Structured view over one crash log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedLog {
    pub file_name: String,
    pub main_error: MainError,
    pub crashgen_version: String,
    pub game_version: String,
    pub settings: Vec<Setting>,
    pub components: Vec<ComponentEntry>,
    pub stack: Vec<String>,
    /// Stack lines carrying a form identifier, `0x` stripped.
    pub form_id_lines: Vec<String>,
}

impl ParsedLog {
    pub fn setting(&self, key: &str) -> Option<&Setting> {
        self.settings.iter().find(|s| s.key.eq_ignore_ascii_case(key))
    }

    pub fn has_component(&self, name: &str) -> bool {
        let needle = normalize_name(name);
        self.components
            .iter()
            .any(|c| c.normalized_name() == needle)
    }

    pub fn plugins(&self) -> impl Iterator<Item = &ComponentEntry> {
        self.components
            .iter()
            .filter(|c| c.kind == ComponentKind::Plugin)
    }
}

/// Text predicate of a signature
#[derive(Debug, Clone)]
pub enum Pattern {
    Contains(String),
    Regex(Regex),
}

impl Pattern {
    /// Byte span of the first occurrence in `haystack`.
    pub fn find(&self, haystack: &str) -> Option<(usize, usize)> {
        match self {
            Pattern::Contains(needle) => haystack
                .find(needle.as_str())
                .map(|start| (start, start + needle.len())),
            Pattern::Regex(re) => re.find(haystack).map(|m| (m.start(), m.end())),
        }
    }

    pub fn count(&self, haystack: &str) -> usize {
        match self {
            Pattern::Contains(needle) if needle.is_empty() => 0,
            Pattern::Contains(needle) => haystack.matches(needle.as_str()).count(),
            Pattern::Regex(re) => re.find_iter(haystack).count(),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Pattern::Contains(needle) => needle,
            Pattern::Regex(re) => re.as_str(),
        }
    }
}

/// One entry of a stack-suspect signal list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Stack holds the text at least `min` times.
    Stack { text: String, min: usize },
    /// Main error holds the text. When any of these is listed, they alone
    /// decide the match.
    MainErrorRequired(String),
    /// Main error holding the text is enough on its own.
    MainErrorOptional(String),
    /// Stack holding the text vetoes the suspect.
    Not(String),
}

impl Signal {
    /// Parse `text`, `N|text`, `ME-REQ|text`, `ME-OPT|text` or `NOT|text`.
    pub fn parse(raw: &str) -> Option<Self> {
        let Some((modifier, text)) = raw.split_once('|') else {
            return (!raw.is_empty()).then(|| Signal::Stack {
                text: raw.to_string(),
                min: 1,
            });
        };
        if text.is_empty() {
            return None;
        }
        let text = text.to_string();
        match modifier.trim() {
            "ME-REQ" => Some(Signal::MainErrorRequired(text)),
            "ME-OPT" => Some(Signal::MainErrorOptional(text)),
            "NOT" => Some(Signal::Not(text)),
            count => count
                .parse::<usize>()
                .ok()
                .map(|min| Signal::Stack { text, min: min.max(1) }),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Stack { text, min: 1 } => f.write_str(text),
            Signal::Stack { text, min } => write!(f, "{}|{}", min, text),
            Signal::MainErrorRequired(text) => write!(f, "ME-REQ|{}", text),
            Signal::MainErrorOptional(text) => write!(f, "ME-OPT|{}", text),
            Signal::Not(text) => write!(f, "NOT|{}", text),
        }
    }
}

/// What a signature tests
#[derive(Debug, Clone)]
pub enum Predicate {
    /// One pattern over the signature's segment
    Pattern(Pattern),
    /// Stack-suspect signal list over the main error and the stack
    Signals(Vec<Signal>),
}

impl Predicate {
    pub fn describe(&self) -> String {
        match self {
            Predicate::Pattern(pattern) => pattern.as_str().to_string(),
            Predicate::Signals(signals) => signals
                .iter()
                .map(Signal::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Immutable rule record from the signature database
#[derive(Debug, Clone)]
pub struct Signature {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub segment: Segment,
    pub predicate: Predicate,
    pub priority: i32,
    pub guidance: String,
    /// Minimum pattern occurrences across the whole segment.
    pub min_count: usize,
    /// Substrings of the stack or the signature's own segment that veto the match.
    pub unless: Vec<String>,
    pub requires_main_error: Option<String>,
}

/// Where a match was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evidence {
    pub segment: Segment,
    /// Line index inside the segment (component index for `Components`).
    pub line: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub component: Option<ComponentEntry>,
}

impl Evidence {
    pub fn overlaps(&self, other: &Evidence) -> bool {
        self.segment == other.segment
            && self.line == other.line
            && self.start < other.end
            && other.start < self.end
    }
}

#[derive(Debug, Clone)]
pub struct Match {
    pub signature: Signature,
    pub evidence: Evidence,
}

/// Matches per category, each list in priority order
#[derive(Debug, Clone, Default)]
pub struct MatchSet {
    pub by_category: BTreeMap<Category, Vec<Match>>,
}

impl MatchSet {
    pub fn get(&self, category: Category) -> &[Match] {
        self.by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn total(&self) -> usize {
        self.by_category.values().map(Vec::len).sum()
    }
}

/// Outcome of a settings check against the echoed configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingFinding {
    pub setting: String,
    pub value: String,
    pub guidance: String,
}

/// A distinct stack text and how often it showed up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub text: String,
    pub count: usize,
}

/// A form identifier from the stack attributed to the plugin that owns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormIdSuspect {
    /// Stack line with `0x` stripped, e.g. `FormID: 05001234`.
    pub line: String,
    pub plugin: String,
    pub count: usize,
}

/// Raw evidence listing that does not depend on the signature tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PossibleCulprits {
    /// In first-seen stack order.
    pub plugin_suspects: Vec<Tally>,
    /// Sorted by line.
    pub form_id_suspects: Vec<FormIdSuspect>,
    /// Sorted by record text.
    pub named_records: Vec<Tally>,
}

/// Metadata stamped into every report header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMeta {
    pub tool_version: String,
    pub source_file: String,
    pub latest_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Complete,
    /// Parsed, but the log carried no component list.
    Incomplete,
    /// No main error header; nothing could be attributed.
    Unsolved,
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportStatus::Complete => write!(f, "COMPLETE"),
            ReportStatus::Incomplete => write!(f, "INCOMPLETE"),
            ReportStatus::Unsolved => write!(f, "UNSOLVED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionKind {
    Header,
    MainError,
    Settings,
    SolvedCulprits,
    FrequentCrashMods,
    PatchedMods,
    CollectionPatchedMods,
    PossibleCulprits,
    Statistics,
}

impl SectionKind {
    pub fn order() -> [Self; 9] {
        [
            SectionKind::Header,
            SectionKind::MainError,
            SectionKind::Settings,
            SectionKind::SolvedCulprits,
            SectionKind::FrequentCrashMods,
            SectionKind::PatchedMods,
            SectionKind::CollectionPatchedMods,
            SectionKind::PossibleCulprits,
            SectionKind::Statistics,
        ]
    }
}

impl From<Category> for SectionKind {
    fn from(category: Category) -> Self {
        match category {
            Category::SolvedCulprit => SectionKind::SolvedCulprits,
            Category::FrequentCrashMod => SectionKind::FrequentCrashMods,
            Category::PatchedMod => SectionKind::PatchedMods,
            Category::CollectionPatchedMod => SectionKind::CollectionPatchedMods,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSection {
    pub kind: SectionKind,
    pub title: String,
    pub lines: Vec<String>,
}

/// Per-report tally
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStats {
    pub matches: BTreeMap<Category, usize>,
    pub settings_findings: usize,
    pub plugin_suspects: usize,
    pub form_id_suspects: usize,
    pub named_records: usize,
}

impl ReportStats {
    pub fn total_matches(&self) -> usize {
        self.matches.values().sum()
    }
}

/// Complete diagnostic report for one crash log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub meta: ReportMeta,
    pub status: ReportStatus,
    pub main_error: String,
    pub sections: Vec<ReportSection>,
    pub stats: ReportStats,
}

impl Report {
    pub fn section(&self, kind: SectionKind) -> Option<&ReportSection> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    /// Plain-text rendering, sections in fixed order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            if section.kind != SectionKind::Header {
                out.push_str("====================================================\n");
                out.push_str(&section.title);
                out.push_str("\n====================================================\n");
            }
            for line in &section.lines {
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }
}

impl ReportMeta {
    pub fn new(source_file: impl Into<String>, latest_version: impl Into<String>) -> Self {
        Self {
            tool_version: format!("crash-autoscan v{}", env!("CARGO_PKG_VERSION")),
            source_file: source_file.into(),
            latest_version: latest_version.into(),
        }
    }
}
