//! Convert command implementation.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{debug, info};

use kanon_compiler::convert::convert_module;
use kanon_compiler::{classify, Loader};

/// Arguments for the convert command.
#[derive(Args)]
pub struct ConvertArgs {
    /// Directory containing the policies
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

/// Runs the convert command.
///
/// Every policy file carrying legacy annotations is rewritten in place.
/// Library files and files that already have a METADATA block are left alone.
pub fn run(args: &ConvertArgs, ignore: &str) -> Result<()> {
    info!(path = ?args.path, "Converting legacy annotations");

    let config = super::compiler_config(ignore)?;
    let modules = Loader::new(config.loader)
        .load_dir(&args.path)
        .with_context(|| format!("Failed to load policies in {}", args.path.display()))?;

    let mut converted = 0;
    for module in modules.modules() {
        if classify(&module.rule_names()).is_none() {
            continue;
        }

        let Some(source) = convert_module(module)? else {
            debug!(path = %module.path.display(), "Nothing to convert");
            continue;
        };
        fs::write(&module.path, source)
            .with_context(|| format!("Failed to write {}", module.path.display()))?;
        info!(path = %module.path.display(), "Converted");
        converted += 1;
    }

    info!(converted, "Completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rewrites_legacy_policy_only() {
        let dir = TempDir::new().unwrap();
        let policy = dir.path().join("policies/privileged/src.rego");
        let library = dir.path().join("lib/util.rego");
        fs::create_dir_all(policy.parent().unwrap()).unwrap();
        fs::create_dir_all(library.parent().unwrap()).unwrap();

        fs::write(
            &policy,
            "# @title Privileged containers\n# @kinds core/Pod\npackage privileged\n\nimport rego.v1\n\nviolation contains \"privileged\" if {\n    input.review.object.spec.privileged\n}\n",
        )
        .unwrap();
        let library_source = "# Helpers.\npackage lib.util\n\nimport rego.v1\n\nname(obj) := obj.metadata.name\n";
        fs::write(&library, library_source).unwrap();

        run(&ConvertArgs { path: dir.path().to_path_buf() }, "^$").unwrap();

        let rewritten = fs::read_to_string(&policy).unwrap();
        assert!(rewritten.starts_with("# METADATA\n# title: Privileged containers\n"));
        assert!(!rewritten.contains("@kinds"));
        assert_eq!(fs::read_to_string(&library).unwrap(), library_source);

        // A second pass finds nothing left to convert
        run(&ConvertArgs { path: dir.path().to_path_buf() }, "^$").unwrap();
        assert_eq!(fs::read_to_string(&policy).unwrap(), rewritten);
    }
}
