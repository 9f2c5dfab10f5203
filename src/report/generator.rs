// SPDX-License-Identifier: PMPL-1.0-or-later

//! Report generation logic
//!
//! Builds the fixed sequence of report sections from a parsed log and the
//! matcher's findings. Output depends only on its inputs: no clock, no
//! hash-ordered collections.

use crate::signatures::rules::SignatureDatabase;
use crate::types::*;
use semver::Version;

const SOLVED_FOOTER: &str =
    "* FOR DETAILED DESCRIPTIONS AND POSSIBLE SOLUTIONS TO ANY ABOVE DETECTED CRASH SUSPECTS, CHECK THE GUIDANCE UNDER EACH ENTRY *";

/// Everything the matcher found for one log
#[derive(Debug, Clone, Default)]
pub struct Findings {
    pub matches: MatchSet,
    pub settings: Vec<SettingFinding>,
    pub culprits: PossibleCulprits,
    /// The log needed the Windows-1252 fallback decoder.
    pub decode_failed: bool,
}

pub struct ReportGenerator<'db> {
    db: &'db SignatureDatabase,
}

impl<'db> ReportGenerator<'db> {
    pub fn new(db: &'db SignatureDatabase) -> Self {
        Self { db }
    }

    pub fn generate(&self, parsed: &ParsedLog, findings: &Findings, meta: &ReportMeta) -> Report {
        let status = Self::status(parsed);

        let mut sections = vec![
            self.header(meta, status, findings.decode_failed),
            self.main_error(parsed, meta),
            self.settings(&findings.settings),
        ];
        for category in Category::all() {
            sections.push(self.category(category, findings.matches.get(category)));
        }
        sections.push(self.possible_culprits(parsed, &findings.culprits));

        let stats = Self::stats(findings);
        sections.push(Self::statistics(&stats));

        Report {
            meta: meta.clone(),
            status,
            main_error: parsed.main_error.line.clone(),
            sections,
            stats,
        }
    }

    fn status(parsed: &ParsedLog) -> ReportStatus {
        if parsed.main_error.is_unknown() {
            ReportStatus::Unsolved
        } else if parsed.plugins().next().is_none() {
            ReportStatus::Incomplete
        } else {
            ReportStatus::Complete
        }
    }

    fn stats(findings: &Findings) -> ReportStats {
        ReportStats {
            matches: Category::all()
                .into_iter()
                .map(|c| (c, findings.matches.get(c).len()))
                .collect(),
            settings_findings: findings.settings.len(),
            plugin_suspects: findings.culprits.plugin_suspects.len(),
            form_id_suspects: findings.culprits.form_id_suspects.len(),
            named_records: findings.culprits.named_records.len(),
        }
    }

    fn header(&self, meta: &ReportMeta, status: ReportStatus, decode_failed: bool) -> ReportSection {
        let mut lines = vec![
            format!(
                "{} -> AUTOSCAN REPORT GENERATED BY {}",
                meta.source_file, meta.tool_version
            ),
            "# FOR BEST VIEWING EXPERIENCE OPEN THIS FILE IN NOTEPAD++ OR SIMILAR #".to_string(),
            "# PLEASE READ EVERYTHING CAREFULLY AND BEWARE OF FALSE POSITIVES #".to_string(),
            format!("Scan Status: {}", status),
        ];
        if decode_failed {
            lines.push(
                "* NOTICE : THIS LOG WAS NOT VALID UTF-8 AND WAS DECODED AS WINDOWS-1252 *"
                    .to_string(),
            );
        }
        match status {
            ReportStatus::Unsolved => lines.push(
                "* NOTICE : NO MAIN ERROR HEADER WAS FOUND, THIS LOG COULD NOT BE ANALYZED *"
                    .to_string(),
            ),
            ReportStatus::Incomplete => lines.push(format!(
                "* NOTICE : THIS LOG HAS NO PLUGIN LIST, {} MAY HAVE FAILED TO FINISH WRITING IT *",
                self.db.layout().crashgen_name.to_uppercase()
            )),
            ReportStatus::Complete => {}
        }

        ReportSection {
            kind: SectionKind::Header,
            title: String::new(),
            lines,
        }
    }

    fn main_error(&self, parsed: &ParsedLog, meta: &ReportMeta) -> ReportSection {
        let crashgen = &self.db.layout().crashgen_name;
        let error = &parsed.main_error;

        let mut lines = vec![
            format!("Main Error: {}", error.line),
            format!("Exception: {}", error.kind),
            format!(
                "Faulting Module: {}",
                error.location.as_deref().unwrap_or(UNKNOWN)
            ),
            format!("Detected {} Version: {}", crashgen, parsed.crashgen_version),
            version_verdict(crashgen, &parsed.crashgen_version, &meta.latest_version),
            format!("Detected Game Version: {}", parsed.game_version),
        ];

        let lower = error.line.to_lowercase();
        if lower.contains(".dll") && !lower.contains("tbbmalloc") {
            lines.push(
                "* NOTICE : MAIN ERROR REPORTS THAT A DLL FILE WAS INVOLVED IN THIS CRASH! *"
                    .to_string(),
            );
            lines.push(
                "If that dll file belongs to a mod, that mod is a prime suspect for the crash."
                    .to_string(),
            );
        }

        ReportSection {
            kind: SectionKind::MainError,
            title: "MAIN ERROR SUMMARY".to_string(),
            lines,
        }
    }

    fn settings(&self, findings: &[SettingFinding]) -> ReportSection {
        let mut lines = Vec::new();
        for finding in findings {
            lines.push(format!("# [!] {} : {} #", finding.setting, finding.value));
            lines.push(finding.guidance.clone());
            lines.push("-----".to_string());
        }
        if lines.is_empty() {
            lines.push(format!(
                "# FOUND NO PROBLEMS IN YOUR {} SETTINGS #",
                self.db.layout().crashgen_name.to_uppercase()
            ));
        }

        ReportSection {
            kind: SectionKind::Settings,
            title: "CHECKING CRASH GENERATOR SETTINGS...".to_string(),
            lines,
        }
    }

    fn category(&self, category: Category, matches: &[Match]) -> ReportSection {
        let mut lines = Vec::new();
        for m in matches {
            lines.push(match (category, &m.evidence.component) {
                (Category::SolvedCulprit, _) => format!(
                    "# Checking for {:.<30} SUSPECT FOUND! > Severity : {} #",
                    m.signature.name, m.signature.priority
                ),
                (_, Some(entry)) => format!("[!] FOUND : [{}] {}", entry.index, entry.name),
                (_, None) => format!("[!] FOUND : {}", m.signature.name),
            });
            lines.extend(m.signature.guidance.lines().map(str::to_string));
            lines.push("-----".to_string());
        }

        let (title, footer, nothing) = match category {
            Category::SolvedCulprit => (
                "CHECKING IF LOG MATCHES ANY KNOWN CRASH SUSPECTS...",
                SOLVED_FOOTER,
                "# FOUND NO CRASH ERRORS / SUSPECTS THAT MATCH THE CURRENT DATABASE #",
            ),
            Category::FrequentCrashMod => (
                "CHECKING FOR MODS THAT CAN CAUSE FREQUENT CRASHES...",
                "# [!] CAUTION : ANY ABOVE DETECTED MODS HAVE A MUCH HIGHER CHANCE TO CRASH YOUR GAME! #",
                "# FOUND NO PROBLEMATIC MODS THAT MATCH THE CURRENT DATABASE FOR THIS CRASH LOG #",
            ),
            Category::PatchedMod => (
                "CHECKING FOR MODS WITH SOLUTIONS & COMMUNITY PATCHES",
                "# [!] CAUTION : FOUND PROBLEMATIC MODS WITH SOLUTIONS AND COMMUNITY PATCHES #",
                "# FOUND NO PROBLEMATIC MODS WITH AVAILABLE SOLUTIONS AND COMMUNITY PATCHES #",
            ),
            Category::CollectionPatchedMod => (
                "CHECKING FOR MODS PATCHED THROUGH OPC INSTALLER...",
                "* THE OPTIMIZATION PATCHES COLLECTION FIXES PROBLEMS IN THE ABOVE MODS *",
                "# FOUND NO PROBLEMATIC MODS THAT ARE ALREADY PATCHED THROUGH THE OPC INSTALLER #",
            ),
        };

        if lines.is_empty() {
            lines.push(nothing.to_string());
        } else {
            lines.push(footer.to_string());
        }

        ReportSection {
            kind: SectionKind::from(category),
            title: title.to_string(),
            lines,
        }
    }

    fn possible_culprits(&self, parsed: &ParsedLog, culprits: &PossibleCulprits) -> ReportSection {
        let crashgen = &self.db.layout().crashgen_name;
        let mut lines = vec!["# LIST OF (POSSIBLE) PLUGIN SUSPECTS #".to_string()];
        if culprits.plugin_suspects.is_empty() {
            lines.push("* COULDN'T FIND ANY PLUGIN SUSPECTS *".to_string());
        } else {
            lines.extend(
                culprits
                    .plugin_suspects
                    .iter()
                    .map(|t| format!("- {} | {}", t.text, t.count)),
            );
            lines.push(
                "[Last number counts how many times each Plugin Suspect shows up in the crash log.]"
                    .to_string(),
            );
            lines.push(format!(
                "These Plugins were caught by {} and some of them might be responsible for this crash.",
                crashgen
            ));
        }
        lines.push(String::new());

        lines.push("# LIST OF (POSSIBLE) FORM ID SUSPECTS #".to_string());
        if culprits.form_id_suspects.is_empty() {
            lines.push("* COULDN'T FIND ANY FORM ID SUSPECTS *".to_string());
        } else {
            lines.extend(
                culprits
                    .form_id_suspects
                    .iter()
                    .map(|s| format!("- {} | [{}] | {}", s.line, s.plugin, s.count)),
            );
            lines.push(
                "[Last number counts how many times each Form ID shows up in the crash log.]"
                    .to_string(),
            );
        }
        lines.push(String::new());

        lines.push("# LIST OF DETECTED (NAMED) RECORDS #".to_string());
        if culprits.named_records.is_empty() {
            lines.push("* COULDN'T FIND ANY NAMED RECORDS *".to_string());
        } else {
            lines.extend(
                culprits
                    .named_records
                    .iter()
                    .map(|t| format!("- {} | {}", t.text, t.count)),
            );
            lines.push(
                "[Last number counts how many times each Named Record shows up in the crash log.]"
                    .to_string(),
            );
        }
        lines.push(String::new());

        // Verbatim, dynamic and official entries included.
        lines.push("# LIST OF LOADED COMPONENTS #".to_string());
        if parsed.components.is_empty() {
            lines.push("* NO LOADED COMPONENTS WERE LISTED IN THIS LOG *".to_string());
        } else {
            lines.extend(parsed.components.iter().map(ComponentEntry::label));
        }

        ReportSection {
            kind: SectionKind::PossibleCulprits,
            title: "SCANNING THE LOG FOR SPECIFIC (POSSIBLE) SUSPECTS...".to_string(),
            lines,
        }
    }

    fn statistics(stats: &ReportStats) -> ReportSection {
        let count = |c: Category| stats.matches.get(&c).copied().unwrap_or(0);
        ReportSection {
            kind: SectionKind::Statistics,
            title: "STATISTICS".to_string(),
            lines: vec![
                format!("Solved Culprits: {}", count(Category::SolvedCulprit)),
                format!("Frequent Crash Mods: {}", count(Category::FrequentCrashMod)),
                format!("Patched Mods: {}", count(Category::PatchedMod)),
                format!(
                    "Collection Patched Mods: {}",
                    count(Category::CollectionPatchedMod)
                ),
                format!("Settings Findings: {}", stats.settings_findings),
                format!("Plugin Suspects: {}", stats.plugin_suspects),
                format!("Form ID Suspects: {}", stats.form_id_suspects),
                format!("Named Records: {}", stats.named_records),
            ],
        }
    }
}

/// Compare the detected crash generator version against the latest known one.
fn version_verdict(crashgen: &str, detected: &str, latest: &str) -> String {
    let latest = lenient_version(latest.trim());
    let current = detected
        .split_whitespace()
        .filter(|token| token.starts_with('v'))
        .filter_map(lenient_version)
        .last();

    match (current, latest) {
        (_, None) => format!(
            "* No latest {} version on record, version check skipped *",
            crashgen
        ),
        (None, Some(_)) => format!(
            "# [!] CAUTION : COULD NOT DETECT YOUR {} VERSION #",
            crashgen.to_uppercase()
        ),
        (Some(current), Some(latest)) if current >= latest => {
            format!("* You have the latest version of {}! *", crashgen)
        }
        (Some(_), Some(latest)) => format!(
            "# [!] CAUTION : YOUR {} IS OUTDATED! PLEASE UPDATE TO v{} #",
            crashgen.to_uppercase(),
            latest
        ),
    }
}

/// `v1.28`, `1.28.6` or `v1.28.6.0` into a semver triple, missing parts
/// padded with zeros and extra parts dropped.
pub fn lenient_version(token: &str) -> Option<Version> {
    let digits: String = token
        .trim_start_matches(['v', 'V'])
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut parts = digits
        .split('.')
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<u64>());

    let major = parts.next()?.ok()?;
    let minor = parts.next().and_then(Result::ok).unwrap_or(0);
    let patch = parts.next().and_then(Result::ok).unwrap_or(0);
    Some(Version::new(major, minor, patch))
}
