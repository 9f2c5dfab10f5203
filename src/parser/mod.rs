// SPDX-License-Identifier: PMPL-1.0-or-later

//! Crash log parsing
//!
//! Splits one decoded crash log into its main error, version lines,
//! settings echo, call stack and loaded-component list. Every field
//! degrades to an explicit unknown or empty value; only a missing main
//! error header is an error.

use crate::error::ScanError;
use crate::signatures::rules::LogLayout;
use crate::types::*;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

const MAIN_ERROR_PREFIX: &str = "Unhandled exception";

static EXCEPTION_KIND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([A-Z0-9_]+)""#).unwrap());

static EXCEPTION_SITE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bat (0x[0-9A-Fa-f]+)(?:\s+([^\s+]+\+[0-9A-Fa-f]+))?").unwrap()
});

static PLUGIN_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[([0-9A-Fa-f: ]+)\]\s*(.+?)\s*$").unwrap());

/// Parts of a crash log between the known section headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Preamble,
    Settings,
    System,
    Stack,
    Modules,
    ScriptExtender,
    Plugins,
}

pub struct LogParser {
    crashgen_name: String,
    game_name: String,
    xse_header: String,
}

impl LogParser {
    pub fn new(layout: &LogLayout) -> Self {
        Self {
            crashgen_name: layout.crashgen_name.clone(),
            game_name: layout.game_name.clone(),
            xse_header: format!("{} PLUGINS:", layout.script_extender.to_uppercase()),
        }
    }

    /// Parse a log that must carry a main error header.
    pub fn parse(&self, log: &CrashLog) -> Result<ParsedLog, ScanError> {
        match self.parse_partial(log) {
            (parsed, None) => Ok(parsed),
            (_, Some(err)) => Err(err),
        }
    }

    /// Parse every segment independently. A missing main error header
    /// leaves the main error `UNKNOWN` and is returned next to the segments
    /// that could still be read.
    pub fn parse_partial(&self, log: &CrashLog) -> (ParsedLog, Option<ScanError>) {
        let mut main_error: Option<MainError> = None;
        let mut crashgen_version: Option<String> = None;
        let mut game_version: Option<String> = None;
        let mut settings = Vec::new();
        let mut section: Option<String> = None;
        let mut stack = Vec::new();
        let mut form_id_lines = Vec::new();
        let mut plugins = Vec::new();
        let mut modules = Vec::new();
        let mut region = Region::Preamble;

        for line in log.content.lines() {
            if matches!(region, Region::Preamble | Region::Settings) {
                if game_version.is_none()
                    && !self.game_name.is_empty()
                    && line.starts_with(&self.game_name)
                {
                    game_version = Some(line.trim().to_string());
                    continue;
                }
                if crashgen_version.is_none()
                    && !self.crashgen_name.is_empty()
                    && line.starts_with(&self.crashgen_name)
                {
                    crashgen_version = Some(line.trim().to_string());
                    continue;
                }
                if main_error.is_none() && line.starts_with(MAIN_ERROR_PREFIX) {
                    main_error = Some(parse_main_error(line));
                    continue;
                }
            }

            if let Some(next) = self.region_header(line) {
                region = next;
                continue;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match region {
                Region::Preamble if is_section_header(trimmed) => {
                    region = Region::Settings;
                    section = Some(trimmed[1..trimmed.len() - 1].to_string());
                }
                Region::Settings => {
                    if is_section_header(trimmed) {
                        section = Some(trimmed[1..trimmed.len() - 1].to_string());
                    } else if let Some((key, value)) = trimmed.split_once(':') {
                        settings.push(Setting {
                            section: section.clone(),
                            key: key.trim().to_string(),
                            value: value.trim().to_string(),
                        });
                    }
                }
                Region::Stack => {
                    if trimmed.to_lowercase().contains("id:") && !trimmed.contains("0xFF") {
                        form_id_lines.push(trimmed.replace("0x", ""));
                    }
                    stack.push(trimmed.to_string());
                }
                Region::ScriptExtender => modules.push(ComponentEntry {
                    index: "DLL".to_string(),
                    name: strip_module_version(trimmed),
                    kind: ComponentKind::Module,
                    form_ids: Vec::new(),
                }),
                Region::Plugins => {
                    if let Some(entry) = parse_plugin_line(line) {
                        plugins.push(entry);
                    }
                }
                Region::Preamble | Region::System | Region::Modules => {}
            }
        }

        let missing_header = main_error.is_none().then(|| ScanError::UnparsableLog {
            file: log.file_name.clone(),
        });

        attribute_form_ids(&mut plugins, &form_id_lines);

        let mut components = plugins;
        components.extend(modules);

        tracing::debug!(
            file = %log.file_name,
            components = components.len(),
            stack_lines = stack.len(),
            settings = settings.len(),
            "crash log parsed"
        );

        let parsed = ParsedLog {
            file_name: log.file_name.clone(),
            main_error: main_error.unwrap_or_else(MainError::unknown),
            crashgen_version: crashgen_version.unwrap_or_else(|| UNKNOWN.to_string()),
            game_version: game_version.unwrap_or_else(|| UNKNOWN.to_string()),
            settings,
            components,
            stack,
            form_id_lines,
        };
        (parsed, missing_header)
    }

    fn region_header(&self, line: &str) -> Option<Region> {
        let line = line.trim_end();
        if line.starts_with("SYSTEM SPECS:") {
            Some(Region::System)
        } else if line.starts_with("PROBABLE CALL STACK:") {
            Some(Region::Stack)
        } else if line.starts_with("MODULES:") {
            Some(Region::Modules)
        } else if line.starts_with(&self.xse_header) {
            Some(Region::ScriptExtender)
        } else if line.starts_with("PLUGINS:") {
            Some(Region::Plugins)
        } else if line.starts_with("SETTINGS:") {
            Some(Region::Settings)
        } else {
            None
        }
    }
}

fn is_section_header(trimmed: &str) -> bool {
    trimmed.len() > 2 && trimmed.starts_with('[') && trimmed.ends_with(']')
}

fn parse_main_error(line: &str) -> MainError {
    let line = line.trim();
    let kind = EXCEPTION_KIND
        .captures(line)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());
    let site = EXCEPTION_SITE.captures(line);
    let address = site.as_ref().map(|c| c[1].to_string());
    let location = site
        .as_ref()
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().to_string());

    MainError {
        kind,
        address,
        location,
        line: line.to_string(),
    }
}

/// `[FE:  0] Light.esl` becomes index `FE:000`.
fn parse_plugin_line(line: &str) -> Option<ComponentEntry> {
    let caps = PLUGIN_LINE.captures(line)?;
    let index = caps[1].trim().replace(' ', "0").to_uppercase();
    let index = if index.starts_with("FE:") {
        format!("FE:{:0>3}", &index[3..])
    } else {
        format!("{:0>2}", index)
    };
    Some(ComponentEntry {
        index,
        name: caps[2].to_string(),
        kind: ComponentKind::Plugin,
        form_ids: Vec::new(),
    })
}

/// `Buffout4.dll v1.28.6` becomes `Buffout4.dll`.
fn strip_module_version(trimmed: &str) -> String {
    if trimmed.to_lowercase().contains("dll v") {
        if let Some((name, _)) = trimmed.split_once(" v") {
            return name.trim().to_string();
        }
    }
    trimmed.to_string()
}

/// Load-order prefix of a form identifier: two hex digits, or `FE:` plus
/// three for light plugins.
fn owner_index(form_id: &str) -> Option<String> {
    let form_id = form_id.to_uppercase();
    if form_id.starts_with("FE") {
        return form_id.get(2..5).map(|slot| format!("FE:{}", slot));
    }
    form_id.get(..2).map(str::to_string)
}

fn attribute_form_ids(plugins: &mut [ComponentEntry], form_id_lines: &[String]) {
    for line in form_id_lines {
        let Some((_, value)) = line.split_once(": ") else {
            continue;
        };
        let value = value.trim();
        let Some(owner) = owner_index(value) else {
            continue;
        };
        if let Some(entry) = plugins.iter_mut().find(|p| p.index == owner) {
            if !entry.form_ids.iter().any(|id| id == value) {
                entry.form_ids.push(value.to_string());
            }
        }
    }
}

impl CrashLog {
    /// Decode raw bytes: UTF-8 first, then Windows-1252.
    ///
    /// Content with NUL bytes is treated as binary and rejected.
    pub fn from_bytes(file_name: impl Into<String>, bytes: &[u8]) -> Result<Self, ScanError> {
        let file_name = file_name.into();
        if bytes.contains(&0) {
            return Err(ScanError::UnreadableInput {
                path: file_name,
                reason: "binary content".to_string(),
            });
        }

        let (content, decode_failed) = match std::str::from_utf8(bytes) {
            Ok(text) => (text.to_string(), false),
            Err(_) => {
                let (cow, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
                if had_errors {
                    return Err(ScanError::UnreadableInput {
                        path: file_name,
                        reason: "neither UTF-8 nor Windows-1252 text".to_string(),
                    });
                }
                tracing::warn!(file = %file_name, "crash log is not valid UTF-8, decoded as Windows-1252");
                (cow.into_owned(), true)
            }
        };

        let content = match content.strip_prefix('\u{feff}') {
            Some(rest) => rest.to_string(),
            None => content,
        };

        Ok(Self {
            file_name,
            content,
            decode_failed,
        })
    }

    pub fn read(path: &Path) -> Result<Self, ScanError> {
        let bytes = fs::read(path).map_err(|e| ScanError::UnreadableInput {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_bytes(file_name, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_error_fields() {
        let error = parse_main_error(
            "Unhandled exception \"EXCEPTION_ACCESS_VIOLATION\" at 0x7FF6B1F0C8E3 Fallout4.exe+0C6D8E3\tmov rax, [rcx]",
        );
        assert_eq!(error.kind, "EXCEPTION_ACCESS_VIOLATION");
        assert_eq!(error.address.as_deref(), Some("0x7FF6B1F0C8E3"));
        assert_eq!(error.location.as_deref(), Some("Fallout4.exe+0C6D8E3"));
    }

    #[test]
    fn test_main_error_without_kind() {
        let error = parse_main_error("Unhandled exception at 0x7FF6B1F0C8E3");
        assert_eq!(error.kind, UNKNOWN);
        assert!(error.location.is_none());
    }

    #[test]
    fn test_plugin_index_blanks_become_zeros() {
        let light = parse_plugin_line("\t[FE:  0] RedRocketsGlareII.esl").unwrap();
        assert_eq!(light.index, "FE:000");
        assert_eq!(light.name, "RedRocketsGlareII.esl");

        let regular = parse_plugin_line("\t[ 1]     DLCRobot.esm").unwrap();
        assert_eq!(regular.index, "01");
        assert!(parse_plugin_line("\tnot a plugin").is_none());
    }

    #[test]
    fn test_module_version_stripped() {
        assert_eq!(strip_module_version("x-cell-fo4.dll v2.0"), "x-cell-fo4.dll");
        assert_eq!(strip_module_version("f4ee.dll"), "f4ee.dll");
    }

    #[test]
    fn test_owner_index_for_light_plugins() {
        assert_eq!(owner_index("05001234").as_deref(), Some("05"));
        assert_eq!(owner_index("FE00A123").as_deref(), Some("FE:00A"));
    }

    #[test]
    fn test_binary_content_rejected() {
        let err = CrashLog::from_bytes("crash-bin.log", b"PK\x03\x04\0\0").unwrap_err();
        assert!(matches!(err, ScanError::UnreadableInput { .. }));
    }

    #[test]
    fn test_windows_1252_fallback_sets_flag() {
        let log = CrashLog::from_bytes("crash-cp.log", b"Caf\xe9 log").unwrap();
        assert!(log.decode_failed);
        assert_eq!(log.content, "Caf\u{e9} log");
    }
}
