// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error taxonomy for per-log processing
//!
//! None of these abort a batch: unreadable inputs are counted as failures,
//! unparsable logs still yield an unsolved report and malformed database
//! records are skipped with a warning.

/// Errors raised while loading inputs or the signature database
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    /// File missing, unreadable or not text
    #[error("unreadable crash log {path}: {reason}")]
    UnreadableInput {
        /// Path or identifier of the input
        path: String,
        /// Underlying cause
        reason: String,
    },

    /// No main-error header in the log
    #[error("no recognizable main error header in {file}")]
    UnparsableLog {
        /// File identifier of the crash log
        file: String,
    },

    /// One signature database record could not be used
    #[error("malformed signature record #{index} ({id}): {reason}")]
    MalformedDatabase {
        /// Position of the record in its source
        index: usize,
        /// Record identity, or `?` when it has none
        id: String,
        /// What was missing or invalid
        reason: String,
    },
}
