//! CLI commands and argument parsing.

pub mod convert;
pub mod create;
pub mod doc;
pub mod inspect;

use std::fmt;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use kanon_compiler::{loader::DEFAULT_IGNORE_PATTERN, CompilerConfig, LoaderConfig};

/// Kanon - Gatekeeper policy toolchain for Rego
#[derive(Parser)]
#[command(name = "kanon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log verbosity, overrides RUST_LOG
    #[arg(long, global = true, env = "KANON_LOG_LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Regular expression for paths to skip
    #[arg(long, global = true, env = "KANON_IGNORE", default_value = DEFAULT_IGNORE_PATTERN)]
    pub ignore: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Create ConstraintTemplates and Constraints from policies
    Create(create::CreateArgs),

    /// Generate Markdown documentation for policies
    Doc(doc::DocArgs),

    /// Rewrite legacy annotations as OPA METADATA blocks
    Convert(convert::ConvertArgs),

    /// Print the extracted policy records as JSON
    Inspect(inspect::InspectArgs),

    /// Print version information
    Version,
}

/// Log verbosity accepted by `--log-level`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Errors only
    Error,
    /// Warnings and errors
    Warn,
    /// Progress messages
    Info,
    /// Per-file detail
    Debug,
    /// Everything
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        };
        f.write_str(level)
    }
}

/// Builds the compiler configuration shared by every command.
pub fn compiler_config(ignore: &str) -> Result<CompilerConfig> {
    let loader = LoaderConfig::new()
        .with_ignore_pattern(ignore)
        .with_context(|| format!("Invalid ignore pattern: {ignore}"))?;
    Ok(CompilerConfig::new().with_loader(loader))
}
