// SPDX-License-Identifier: PMPL-1.0-or-later

//! Signature matching over a parsed crash log

use crate::signatures::rules::SignatureDatabase;
use crate::types::*;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Marker of stack lines that only describe a record's editing history.
const MODIFIED_BY: &str = "modified by:";

/// Evaluates one database against parsed logs. Holds no per-log state, so a
/// single engine can be shared across a batch.
pub struct SignatureEngine<'db> {
    db: &'db SignatureDatabase,
}

impl<'db> SignatureEngine<'db> {
    pub fn new(db: &'db SignatureDatabase) -> Self {
        Self { db }
    }

    /// Run every category's signatures against the log.
    ///
    /// Within a category signatures are tried strongest first. Each one
    /// keeps its first evidence that does not overlap evidence already
    /// accepted in that category; when every candidate overlaps, the
    /// signature is suppressed. Each signature contributes at most one match.
    pub fn match_log(&self, log: &ParsedLog) -> MatchSet {
        let mut set = MatchSet::default();

        for category in Category::all() {
            let mut accepted: Vec<Match> = Vec::new();

            for signature in self.db.lookup(category) {
                let candidates = self.candidates(signature, log);
                if candidates.is_empty() {
                    continue;
                }
                let considered = candidates.len();

                let free = candidates
                    .into_iter()
                    .find(|c| !accepted.iter().any(|m| m.evidence.overlaps(c)));
                let Some(evidence) = free else {
                    tracing::debug!(
                        file = %log.file_name,
                        signature = %signature.id,
                        candidates = considered,
                        "overlapping evidence suppressed"
                    );
                    continue;
                };

                accepted.push(Match {
                    signature: signature.clone(),
                    evidence,
                });
            }

            set.by_category.insert(category, accepted);
        }

        tracing::debug!(
            file = %log.file_name,
            matches = set.total(),
            "signature matching complete"
        );
        set
    }

    /// Every piece of evidence the signature would accept, in preference order.
    fn candidates(&self, signature: &Signature, log: &ParsedLog) -> Vec<Evidence> {
        if let Some(required) = &signature.requires_main_error {
            if !log.main_error.line.contains(required.as_str()) {
                return Vec::new();
            }
        }

        let pattern = match &signature.predicate {
            Predicate::Signals(signals) => return signal_candidates(signals, log),
            Predicate::Pattern(pattern) => pattern,
        };

        let own = segment_lines(log, signature.segment);
        let vetoed = signature.unless.iter().any(|veto| {
            let veto = veto.as_str();
            log.stack.iter().any(|line| line.contains(veto))
                || own.iter().any(|line| line.contains(veto))
        });
        if vetoed {
            return Vec::new();
        }

        match signature.segment {
            Segment::Components => self.component_candidates(signature, pattern, log),
            segment => line_candidates(signature, pattern, segment, &own),
        }
    }

    fn component_candidates(&self, signature: &Signature, pattern: &Pattern, log: &ParsedLog) -> Vec<Evidence> {
        let hits: Vec<Evidence> = log
            .components
            .iter()
            .enumerate()
            .filter(|(_, entry)| self.is_eligible(entry))
            .filter(|(_, entry)| component_hit(pattern, &entry.normalized_name()))
            .map(|(line, entry)| Evidence {
                segment: Segment::Components,
                line,
                start: 0,
                end: entry.name.len().max(1),
                text: entry.label(),
                component: Some(entry.clone()),
            })
            .collect();

        if hits.len() < signature.min_count {
            return Vec::new();
        }
        hits
    }

    /// Dynamic and official entries never become culprits.
    fn is_eligible(&self, entry: &ComponentEntry) -> bool {
        !entry.is_dynamic() && !self.db.is_official(entry)
    }

    /// Evaluate the crash generator settings echoed in the log.
    ///
    /// Disabled-setting notices come first, in log order, followed by the
    /// database checks in declaration order.
    pub fn check_settings(&self, log: &ParsedLog) -> Vec<SettingFinding> {
        let rules = self.db.settings();
        let crashgen = &self.db.layout().crashgen_name;

        let ignored: Vec<&str> = rules
            .ignore_disabled
            .iter()
            .map(String::as_str)
            .chain(
                rules
                    .conditional_ignores
                    .iter()
                    .filter(|rule| log.has_component(&rule.when_component))
                    .flat_map(|rule| rule.settings.iter().map(String::as_str)),
            )
            .collect();

        let mut findings: Vec<SettingFinding> = log
            .settings
            .iter()
            .filter(|s| s.as_flag() == Some(false))
            .filter(|s| !ignored.iter().any(|key| key.eq_ignore_ascii_case(&s.key)))
            .map(|s| SettingFinding {
                setting: s.key.clone(),
                value: s.value.clone(),
                guidance: format!(
                    "{} is disabled in your {} settings, is this intentional?",
                    s.key, crashgen
                ),
            })
            .collect();

        for check in &rules.checks {
            if let Some(component) = &check.when_component {
                if !log.has_component(component) {
                    continue;
                }
            }
            let Some(setting) = log.setting(&check.setting) else {
                continue;
            };
            if !setting_matches(setting, &check.expect) {
                findings.push(SettingFinding {
                    setting: setting.key.clone(),
                    value: setting.value.clone(),
                    guidance: check.guidance.clone(),
                });
            }
        }

        findings
    }

    /// Collect the raw possible-culprit listing from the stack.
    pub fn possible_culprits(&self, log: &ParsedLog) -> PossibleCulprits {
        PossibleCulprits {
            plugin_suspects: self.plugin_suspects(log),
            form_id_suspects: self.form_id_suspects(log),
            named_records: self.named_records(log),
        }
    }

    fn plugin_suspects(&self, log: &ParsedLog) -> Vec<Tally> {
        let candidates: Vec<(&ComponentEntry, String)> = log
            .components
            .iter()
            .filter(|entry| self.is_eligible(entry))
            .map(|entry| (entry, entry.name.to_lowercase()))
            .collect();

        let mut tallies: Vec<Tally> = Vec::new();
        for line in &log.stack {
            let line = line.to_lowercase();
            if line.contains(MODIFIED_BY) {
                continue;
            }
            for (entry, needle) in &candidates {
                if !line.contains(needle.as_str()) {
                    continue;
                }
                match tallies.iter_mut().find(|t| t.text == entry.name) {
                    Some(tally) => tally.count += 1,
                    None => tallies.push(Tally {
                        text: entry.name.clone(),
                        count: 1,
                    }),
                }
            }
        }
        tallies
    }

    fn form_id_suspects(&self, log: &ParsedLog) -> Vec<FormIdSuspect> {
        count_sorted(log.form_id_lines.iter().map(String::as_str))
            .into_iter()
            .filter_map(|(line, count)| {
                let (_, value) = line.split_once(": ")?;
                let owner = log
                    .plugins()
                    .filter(|entry| self.is_eligible(entry))
                    .find(|entry| entry.form_ids.iter().any(|id| id == value.trim()))?;
                Some(FormIdSuspect {
                    line: line.to_string(),
                    plugin: owner.name.clone(),
                    count,
                })
            })
            .collect()
    }

    fn named_records(&self, log: &ParsedLog) -> Vec<Tally> {
        let rules = self.db.records();
        let markers: Vec<String> = rules.markers.iter().map(|m| m.to_lowercase()).collect();
        let ignore: Vec<String> = rules.ignore.iter().map(|m| m.to_lowercase()).collect();

        let records: Vec<String> = log
            .stack
            .iter()
            .filter(|line| {
                let lower = line.to_lowercase();
                markers.iter().any(|m| lower.contains(m.as_str()))
                    && !ignore.iter().any(|i| lower.contains(i.as_str()))
            })
            .map(|line| strip_stack_slot(line))
            .filter(|record| !record.is_empty())
            .collect();

        count_sorted(records.iter().map(String::as_str))
            .into_iter()
            .map(|(text, count)| Tally {
                text: text.to_string(),
                count,
            })
            .collect()
    }
}

fn segment_lines(log: &ParsedLog, segment: Segment) -> Vec<Cow<'_, str>> {
    match segment {
        Segment::MainError => vec![Cow::Borrowed(log.main_error.line.as_str())],
        Segment::Settings => log
            .settings
            .iter()
            .map(|s| Cow::Owned(s.as_line()))
            .collect(),
        Segment::Stack => log.stack.iter().map(|l| Cow::Borrowed(l.as_str())).collect(),
        Segment::Components => log
            .components
            .iter()
            .map(|c| Cow::Borrowed(c.name.as_str()))
            .collect(),
    }
}

/// Lines carrying the pattern, provided the segment as a whole holds at
/// least `min_count` occurrences.
fn line_candidates(
    signature: &Signature,
    pattern: &Pattern,
    segment: Segment,
    lines: &[Cow<'_, str>],
) -> Vec<Evidence> {
    let total: usize = lines.iter().map(|l| pattern.count(l)).sum();
    if total == 0 || total < signature.min_count {
        return Vec::new();
    }

    lines
        .iter()
        .enumerate()
        .filter_map(|(index, line)| {
            pattern
                .find(line)
                .map(|(start, end)| line_evidence(segment, index, line, start, end))
        })
        .collect()
}

/// Stack-suspect evaluation. `NOT` signals veto outright; any `ME-REQ`
/// signal makes the main error the only deciding segment; otherwise an
/// `ME-OPT` hit in the main error or a stack signal meeting its count is
/// enough.
fn signal_candidates(signals: &[Signal], log: &ParsedLog) -> Vec<Evidence> {
    let stack_holds = |text: &str| log.stack.iter().any(|line| line.contains(text));
    let vetoed = signals
        .iter()
        .any(|signal| matches!(signal, Signal::Not(text) if stack_holds(text.as_str())));
    if vetoed {
        return Vec::new();
    }

    let main_error = log.main_error.line.as_str();
    let in_main_error = |text: &str| {
        main_error
            .find(text)
            .map(|start| line_evidence(Segment::MainError, 0, main_error, start, start + text.len()))
    };

    let required: Vec<&str> = signals
        .iter()
        .filter_map(|signal| match signal {
            Signal::MainErrorRequired(text) => Some(text.as_str()),
            _ => None,
        })
        .collect();
    if !required.is_empty() {
        return required.into_iter().filter_map(in_main_error).collect();
    }

    let mut candidates = Vec::new();
    for signal in signals {
        match signal {
            Signal::MainErrorOptional(text) => candidates.extend(in_main_error(text.as_str())),
            Signal::Stack { text, min } => {
                let count: usize = log.stack.iter().map(|line| line.matches(text.as_str()).count()).sum();
                if count == 0 || count < *min {
                    continue;
                }
                candidates.extend(log.stack.iter().enumerate().filter_map(|(index, line)| {
                    line.find(text.as_str()).map(|start| {
                        line_evidence(Segment::Stack, index, line, start, start + text.len())
                    })
                }));
            }
            Signal::MainErrorRequired(_) | Signal::Not(_) => {}
        }
    }
    candidates
}

fn line_evidence(segment: Segment, line: usize, text: &str, start: usize, end: usize) -> Evidence {
    Evidence {
        segment,
        line,
        start,
        end: end.max(start + 1),
        text: text.to_string(),
        component: None,
    }
}

/// Case-insensitive test against an already normalized component name.
fn component_hit(pattern: &Pattern, normalized: &str) -> bool {
    match pattern {
        Pattern::Contains(needle) => {
            let needle = normalize_name(needle);
            !needle.is_empty() && normalized.contains(needle.as_str())
        }
        Pattern::Regex(re) => re.is_match(normalized),
    }
}

fn setting_matches(setting: &Setting, expect: &str) -> bool {
    let expected = Setting {
        section: None,
        key: String::new(),
        value: expect.to_string(),
    };
    match (setting.as_flag(), expected.as_flag()) {
        (Some(actual), Some(wanted)) => actual == wanted,
        _ => setting.value.trim().eq_ignore_ascii_case(expect.trim()),
    }
}

/// Drop the `[RSP+..] 0x...` slot prefix from a stack dump line.
fn strip_stack_slot(line: &str) -> String {
    let line = line.trim();
    if !line.contains("[RSP+") {
        return line.to_string();
    }
    let rest = line.split_once(']').map_or(line, |(_, rest)| rest).trim_start();
    let rest = match rest.split_once(char::is_whitespace) {
        Some((address, tail)) if address.starts_with("0x") => tail,
        _ => rest,
    };
    rest.trim().to_string()
}

fn count_sorted<'a>(items: impl Iterator<Item = &'a str>) -> BTreeMap<&'a str, usize> {
    let mut counts = BTreeMap::new();
    for item in items {
        *counts.entry(item).or_insert(0) += 1;
    }
    counts
}
