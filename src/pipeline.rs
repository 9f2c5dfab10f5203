// SPDX-License-Identifier: PMPL-1.0-or-later

//! One crash log in, one report out
//!
//! Parser, matcher and renderer run in sequence. Nothing here touches the
//! filesystem or shares state between logs.

use crate::parser::LogParser;
use crate::report::generator::{Findings, ReportGenerator};
use crate::signatures::{SignatureDatabase, SignatureEngine};
use crate::types::*;

/// Analyze one crash log. A log without a main error header still yields a
/// full report with status unsolved; only main-error evidence is lost.
pub fn analyze(log: &CrashLog, db: &SignatureDatabase, meta: &ReportMeta) -> Report {
    let (parsed, missing_header) = LogParser::new(db.layout()).parse_partial(log);
    if let Some(err) = missing_header {
        tracing::warn!(error = %err, "writing unsolved report");
    }

    let engine = SignatureEngine::new(db);
    let findings = Findings {
        matches: engine.match_log(&parsed),
        settings: engine.check_settings(&parsed),
        culprits: engine.possible_culprits(&parsed),
        decode_failed: log.decode_failed,
    };

    let report = ReportGenerator::new(db).generate(&parsed, &findings, meta);
    tracing::debug!(
        file = %log.file_name,
        status = %report.status,
        matches = report.stats.total_matches(),
        "report generated"
    );
    report
}
