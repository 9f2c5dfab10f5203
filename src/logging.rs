// SPDX-License-Identifier: PMPL-1.0-or-later

//! Logging initialization for the crash-autoscan binary.
//!
//! The library only emits `tracing` events; installing a subscriber is
//! left to the caller.

use anyhow::Result;
use clap::ValueEnum;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Single-line human-readable output
    Compact,
    /// Multi-line human-readable output
    Pretty,
    /// Machine-parseable JSON lines
    Json,
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins over `level` when set. Log lines go to stderr so that
/// reports printed on stdout stay clean.
pub fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match format {
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {}", e))
}
