// SPDX-License-Identifier: PMPL-1.0-or-later

//! Crash-Autoscan: signature matching and report synthesis for game crash logs.
//!
//! Turns the free-form crash logs written by Buffout 4 into structured
//! diagnostic reports for players troubleshooting a modded Fallout 4.
//!
//! PIPELINE:
//! 1. **Parser**: splits a log into main error, versions, settings echo,
//!    call stack and loaded-component list.
//! 2. **Signatures**: a prioritized database of known crash patterns and
//!    problematic mods, matched against the parsed segments.
//! 3. **Report**: renders the matches into a fixed, deterministic layout.
//!
//! `sweep` and `storage` wrap the pipeline for batch runs over a directory.

pub mod error;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod signatures;
pub mod storage;
pub mod sweep;
pub mod types;

pub use error::ScanError;
pub use pipeline::analyze;
