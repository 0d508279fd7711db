//! Doc command implementation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use kanon_compiler::docs::{self, DocsOptions};
use kanon_compiler::Compiler;

/// Arguments for the doc command.
#[derive(Args)]
pub struct DocArgs {
    /// Directory containing the policies
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Markdown file to write
    #[arg(short, long, env = "KANON_OUTPUT", default_value = "policies.md")]
    pub output: PathBuf,

    /// Base URL for source links, relative links are used when unset
    #[arg(long, env = "KANON_URL")]
    pub url: Option<String>,
}

/// Runs the doc command.
pub fn run(args: &DocArgs, ignore: &str) -> Result<()> {
    info!(path = ?args.path, output = ?args.output, "Generating documentation");

    let compiler = Compiler::new(super::compiler_config(ignore)?);
    let policies = compiler
        .compile_dir(&args.path)
        .with_context(|| format!("Failed to compile policies in {}", args.path.display()))?;

    let output_dir = args
        .output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut options = DocsOptions::new(output_dir);
    if let Some(url) = &args.url {
        options = options.with_url(url);
    }

    let document = docs::render(&policies, &options)?;
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create directory {}", output_dir.display()))?;
    fs::write(&args.output, document)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    info!(policies = policies.len(), output = ?args.output, "Completed successfully");
    Ok(())
}
