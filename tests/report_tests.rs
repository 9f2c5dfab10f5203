// SPDX-License-Identifier: PMPL-1.0-or-later

//! Tests for report synthesis through the full pipeline

use crash_autoscan::analyze;
use crash_autoscan::report::ReportOutputFormat;
use crash_autoscan::signatures::{self, SignatureDatabase};
use crash_autoscan::types::*;

const FULL_LOG: &str = include_str!("fixtures/crash-2024-03-01-21-14-07.log");
const OVERFLOW_LOG: &str = include_str!("fixtures/crash-2024-03-02-08-00-00.log");
const NO_HEADER_LOG: &str = include_str!("fixtures/crash-2024-03-03-12-30-45.log");

fn builtin() -> SignatureDatabase {
    signatures::builtin().expect("built-in database should load")
}

fn report_for(name: &str, content: &str) -> Report {
    let db = builtin();
    let meta = ReportMeta::new(name, "1.28.6");
    analyze(&CrashLog::new(name, content), &db, &meta)
}

fn section_text(report: &Report, kind: SectionKind) -> String {
    report
        .section(kind)
        .unwrap_or_else(|| panic!("section {:?} should be present", kind))
        .lines
        .join("\n")
}

#[test]
fn test_subway_runner_rendered_with_load_order_index() {
    let report = report_for("crash-subway.log", FULL_LOG);
    assert_eq!(report.status, ReportStatus::Complete);

    let frequent = section_text(&report, SectionKind::FrequentCrashMods);
    assert!(
        frequent.contains("[!] FOUND : [05] Subway Runner"),
        "frequent section was:\n{}",
        frequent
    );
    assert!(report.render().contains("[05] Subway Runner"));
    assert_eq!(report.stats.matches[&Category::FrequentCrashMod], 1);
    assert_eq!(report.stats.matches[&Category::CollectionPatchedMod], 1);
}

#[test]
fn test_sections_in_fixed_order() {
    for (name, content) in [
        ("crash-a.log", FULL_LOG),
        ("crash-b.log", OVERFLOW_LOG),
        ("crash-c.log", NO_HEADER_LOG),
    ] {
        let report = report_for(name, content);
        let kinds: Vec<SectionKind> = report.sections.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, SectionKind::order().to_vec(), "order for {}", name);
    }
}

#[test]
fn test_empty_categories_say_nothing_found() {
    let report = report_for("crash-subway.log", FULL_LOG);

    let solved = section_text(&report, SectionKind::SolvedCulprits);
    assert!(solved.contains("FOUND NO CRASH ERRORS"), "{}", solved);
    let patched = section_text(&report, SectionKind::PatchedMods);
    assert!(patched.contains("FOUND NO PROBLEMATIC MODS"), "{}", patched);
}

#[test]
fn test_missing_header_yields_unsolved_report() {
    let report = report_for("crash-truncated.log", NO_HEADER_LOG);

    assert_eq!(report.status, ReportStatus::Unsolved);
    assert_eq!(report.main_error, UNKNOWN);
    assert!(report.render().contains("Scan Status: UNSOLVED"));

    let solved = section_text(&report, SectionKind::SolvedCulprits);
    assert!(solved.contains("FOUND NO CRASH ERRORS"), "{}", solved);
    let main = section_text(&report, SectionKind::MainError);
    assert!(main.contains("Main Error: UNKNOWN"), "{}", main);
    assert!(main.contains("You have the latest version of Buffout 4"), "{}", main);

    let raw = section_text(&report, SectionKind::PossibleCulprits);
    assert!(raw.contains("[05] Subway Runner.esp"), "{}", raw);
    let frequent = section_text(&report, SectionKind::FrequentCrashMods);
    assert!(frequent.contains("[!] FOUND : [05] Subway Runner"), "{}", frequent);
}

#[test]
fn test_unsolved_report_lists_dynamic_entries() {
    let content = "Fallout 4 v1.10.163\nBuffout 4 v1.28.6\n\nPLUGINS:\n\t[00]     Fallout4.esm\n\t[05]     Subway Runner.esp\n\t[FF]     Runtime Forms\n";
    let report = report_for("crash-headless.log", content);

    assert_eq!(report.status, ReportStatus::Unsolved);
    let raw = section_text(&report, SectionKind::PossibleCulprits);
    assert!(raw.contains("[FF] Runtime Forms"), "{}", raw);
    assert!(!raw.contains("NO LOADED COMPONENTS"), "{}", raw);
}

#[test]
fn test_missing_plugin_list_is_incomplete() {
    let report = report_for("crash-overflow.log", OVERFLOW_LOG);

    assert_eq!(report.status, ReportStatus::Incomplete);
    let solved = section_text(&report, SectionKind::SolvedCulprits);
    assert!(solved.contains("Stack Overflow Crash"), "{}", solved);
    let main = section_text(&report, SectionKind::MainError);
    assert!(main.contains("OUTDATED"), "{}", main);
}

#[test]
fn test_main_error_summary() {
    let report = report_for("crash-subway.log", FULL_LOG);
    let main = section_text(&report, SectionKind::MainError);

    assert!(main.contains("Faulting Module: Fallout4.exe+0C6D8E3"));
    assert!(main.contains("Detected Buffout 4 Version: Buffout 4 v1.28.6"));
    assert!(main.contains("You have the latest version of Buffout 4"));
    assert!(main.contains("Detected Game Version: Fallout 4 v1.10.163"));
    assert!(!main.contains("DLL FILE WAS INVOLVED"));
}

#[test]
fn test_dll_notice_skips_tbbmalloc() {
    let dll = "Unhandled exception \"EXCEPTION_ACCESS_VIOLATION\" at 0x7FFB1 SomeMod.dll+0001A2B\n";
    let report = report_for("crash-dll.log", dll);
    assert!(section_text(&report, SectionKind::MainError).contains("DLL FILE WAS INVOLVED"));

    let tbb = "Unhandled exception \"EXCEPTION_ACCESS_VIOLATION\" at 0x7FFB1 tbbmalloc.dll+0001A2B\n";
    let report = report_for("crash-tbb.log", tbb);
    assert!(!section_text(&report, SectionKind::MainError).contains("DLL FILE WAS INVOLVED"));
}

#[test]
fn test_dynamic_component_listed_verbatim() {
    let report = report_for("crash-subway.log", FULL_LOG);
    let raw = section_text(&report, SectionKind::PossibleCulprits);

    assert!(raw.contains("[FF] Runtime Forms"), "{}", raw);
    assert!(raw.contains("- Subway Runner.esp | 2"));
    assert!(raw.contains("- FormID: 05001234 | [Subway Runner.esp] | 2"));
    for kind in [
        SectionKind::FrequentCrashMods,
        SectionKind::PatchedMods,
        SectionKind::CollectionPatchedMods,
    ] {
        assert!(!section_text(&report, kind).contains("Runtime Forms"));
    }
}

#[test]
fn test_rendering_is_deterministic() {
    let first = report_for("crash-subway.log", FULL_LOG);
    let second = report_for("crash-subway.log", FULL_LOG);
    assert_eq!(first.render(), second.render());
    assert_eq!(first, second);
}

#[test]
fn test_identical_logs_differ_only_in_source_name() {
    let first = report_for("crash-one.log", FULL_LOG);
    let second = report_for("crash-two.log", FULL_LOG);

    assert_ne!(first.render(), second.render());
    assert_eq!(
        first.render().replace("crash-one.log", "crash-two.log"),
        second.render()
    );
}

#[test]
fn test_settings_section_lists_findings() {
    let report = report_for("crash-subway.log", FULL_LOG);
    let settings = section_text(&report, SectionKind::Settings);

    assert!(settings.contains("# [!] CellInit : false #"), "{}", settings);
    assert!(settings.contains("X-Cell is installed, but MemoryManager is set to TRUE"));
    assert_eq!(report.stats.settings_findings, 4);
}

#[test]
fn test_structured_exports() {
    let report = report_for("crash-subway.log", FULL_LOG);

    let json = ReportOutputFormat::Json
        .serialize(&report)
        .expect("json export should succeed");
    let value: serde_json::Value = serde_json::from_str(&json).expect("export should be valid json");
    assert_eq!(value["status"], "complete");
    assert_eq!(value["stats"]["matches"]["frequent-crash-mod"], 1);

    let yaml = ReportOutputFormat::Yaml
        .serialize(&report)
        .expect("yaml export should succeed");
    let back: Report = serde_yaml::from_str(&yaml).expect("yaml should read back");
    assert_eq!(back, report);

    let markdown = ReportOutputFormat::Markdown
        .serialize(&report)
        .expect("markdown export should succeed");
    assert_eq!(markdown, report.render());
}
