// SPDX-License-Identifier: PMPL-1.0-or-later

//! crash-autoscan: signature matching and report synthesis for Buffout 4 crash logs
//!
//! Scans `crash-*.log` files written by the crash generator of a modded
//! Fallout 4 installation and writes one `-AUTOSCAN` report per log.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crash_autoscan::logging::{self, LogFormat};
use crash_autoscan::pipeline;
use crash_autoscan::report::{self, ReportFormatter, ReportOutputFormat};
use crash_autoscan::signatures::{self, SignatureDatabase};
use crash_autoscan::sweep::{self, SweepConfig};
use crash_autoscan::types::*;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "crash-autoscan")]
#[command(version)]
#[command(about = "Crash log signature matching and report synthesis")]
#[command(long_about = None)]
struct Cli {
    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Log line format on stderr
    #[arg(long, global = true, value_enum, default_value = "compact")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan every crash-*.log under a directory and write a report beside each
    Scan {
        /// Directory holding crash logs
        #[arg(value_name = "DIR")]
        directory: PathBuf,

        /// Signature database (YAML); the built-in Fallout 4 database when omitted
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Report format
        #[arg(short, long, value_enum, default_value = "markdown")]
        format: ReportOutputFormat,

        /// Scan one log at a time instead of in parallel
        #[arg(long)]
        sequential: bool,

        /// Copy unsolved logs and their reports into this folder
        #[arg(long, value_name = "DIR")]
        backup_unsolved: Option<PathBuf>,

        /// Latest crash generator version to compare against
        #[arg(long, value_name = "VERSION")]
        latest: Option<String>,

        /// Write the batch summary as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Suppress the console summary
        #[arg(short, long)]
        quiet: bool,
    },

    /// Analyze one crash log and print its report
    Analyze {
        /// Crash log file
        #[arg(value_name = "LOG")]
        log: PathBuf,

        /// Signature database (YAML)
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Report format
        #[arg(short, long, value_enum, default_value = "markdown")]
        format: ReportOutputFormat,

        /// Latest crash generator version to compare against
        #[arg(long, value_name = "VERSION")]
        latest: Option<String>,
    },

    /// List the loaded signatures in lookup order
    Signatures {
        /// Signature database (YAML)
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Only show one category
        #[arg(short, long, value_enum)]
        category: Option<CategoryArg>,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CategoryArg {
    SolvedCulprit,
    FrequentCrashMod,
    PatchedMod,
    CollectionPatchedMod,
}

impl From<CategoryArg> for Category {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::SolvedCulprit => Category::SolvedCulprit,
            CategoryArg::FrequentCrashMod => Category::FrequentCrashMod,
            CategoryArg::PatchedMod => Category::PatchedMod,
            CategoryArg::CollectionPatchedMod => Category::CollectionPatchedMod,
        }
    }
}

fn load_database(path: Option<&Path>) -> Result<SignatureDatabase> {
    let db = match path {
        Some(path) => signatures::load_database(path)?,
        None => signatures::builtin()?,
    };
    if db.is_empty() {
        anyhow::bail!("signature database contains no usable signatures");
    }
    Ok(db)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(&cli.log_level, cli.log_format)?;

    match cli.command {
        Commands::Scan {
            directory,
            database,
            format,
            sequential,
            backup_unsolved,
            latest,
            output,
            quiet,
        } => {
            let db = load_database(database.as_deref())?;
            let config = SweepConfig {
                format,
                parallel: !sequential,
                backup_unsolved,
                latest_version: latest,
                ..SweepConfig::new(directory)
            };

            let summary = sweep::run(&config, &db)?;
            sweep::print_summary(&summary, quiet);

            if let Some(path) = output {
                sweep::write_report(&summary, &path)
                    .with_context(|| format!("writing scan summary {}", path.display()))?;
                if !quiet {
                    println!("Summary saved to: {}", path.display());
                }
            }
        }

        Commands::Analyze {
            log,
            database,
            format,
            latest,
        } => {
            let db = load_database(database.as_deref())?;
            let crash_log = CrashLog::read(&log)?;
            let latest = latest.unwrap_or_else(|| db.layout().latest_version.clone());
            let meta = ReportMeta::new(&crash_log.file_name, latest);
            let report = pipeline::analyze(&crash_log, &db, &meta);

            if format == ReportOutputFormat::Markdown && std::io::stdout().is_terminal() {
                report::print_report(&report);
            } else {
                print!("{}", format.serialize(&report)?);
            }
        }

        Commands::Signatures { database, category } => {
            let db = load_database(database.as_deref())?;
            ReportFormatter::new().print_signatures(&db, category.map(Category::from));
        }
    }

    Ok(())
}
