// SPDX-License-Identifier: PMPL-1.0-or-later

//! Crash signature database and matcher
//!
//! The database is loaded once per run and shared read-only; the engine
//! evaluates it against each parsed log independently.

pub mod engine;
pub mod loader;
pub mod rules;

use crate::types::*;

pub use engine::SignatureEngine;
pub use loader::{builtin, from_yaml_str, load_database};
pub use rules::SignatureDatabase;

/// Match one parsed log against a database
pub fn detect(log: &ParsedLog, db: &SignatureDatabase) -> MatchSet {
    SignatureEngine::new(db).match_log(log)
}
