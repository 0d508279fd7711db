//! Inspect command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use kanon_compiler::Compiler;

/// Arguments for the inspect command.
#[derive(Args)]
pub struct InspectArgs {
    /// Directory containing the policies
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Print the policies on a single line
    #[arg(long)]
    pub compact: bool,
}

/// Runs the inspect command.
pub fn run(args: &InspectArgs, ignore: &str) -> Result<()> {
    info!(path = ?args.path, "Inspecting policies");

    let compiler = Compiler::new(super::compiler_config(ignore)?);
    let policies = compiler
        .compile_dir(&args.path)
        .with_context(|| format!("Failed to compile policies in {}", args.path.display()))?;

    let json = if args.compact {
        serde_json::to_string(&policies)?
    } else {
        serde_json::to_string_pretty(&policies)?
    };
    println!("{json}");
    Ok(())
}
