//! Create command implementation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::{debug, info};

use kanon_compiler::{Compiler, CustomTemplate, ManifestBuilder, ManifestOptions, TemplateVersion};
use kanon_core::Policy;

/// Arguments for the create command.
#[derive(Args)]
pub struct CreateArgs {
    /// Directory containing the policies
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Write every manifest into this directory instead of next to its policy
    #[arg(short, long, env = "KANON_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Set the enforcement action of every Constraint to dryrun
    #[arg(short, long, env = "KANON_DRYRUN")]
    pub dryrun: bool,

    /// Only generate ConstraintTemplates
    #[arg(long, env = "KANON_SKIP_CONSTRAINTS")]
    pub skip_constraints: bool,

    /// Generate Constraints with parameter placeholders for parameterized policies
    #[arg(long, env = "KANON_PARTIAL_CONSTRAINTS")]
    pub partial_constraints: bool,

    /// ConstraintTemplate API version (v1 or v1beta1) [default: v1]
    #[arg(long, env = "KANON_CONSTRAINT_TEMPLATE_VERSION")]
    pub constraint_template_version: Option<TemplateVersion>,

    /// Jinja template file used to render ConstraintTemplates
    #[arg(
        long,
        env = "KANON_CONSTRAINT_TEMPLATE_CUSTOM_TEMPLATE_FILE",
        conflicts_with = "constraint_template_version"
    )]
    pub constraint_template_custom_template_file: Option<PathBuf>,

    /// Jinja template file used to render Constraints
    #[arg(long, env = "KANON_CONSTRAINT_CUSTOM_TEMPLATE_FILE")]
    pub constraint_custom_template_file: Option<PathBuf>,
}

impl CreateArgs {
    fn manifest_builder(&self) -> Result<ManifestBuilder> {
        if self.constraint_template_version.is_some()
            && self.constraint_template_custom_template_file.is_some()
        {
            bail!("Set either --constraint-template-custom-template-file or --constraint-template-version, not both");
        }

        let options = ManifestOptions::new()
            .with_template_version(self.constraint_template_version.unwrap_or_default())
            .with_dryrun(self.dryrun)
            .with_skip_constraints(self.skip_constraints)
            .with_partial_constraints(self.partial_constraints);
        let mut builder = ManifestBuilder::new(options);

        if let Some(path) = &self.constraint_template_custom_template_file {
            let template = CustomTemplate::from_file(path)
                .with_context(|| format!("Unable to read template file {}", path.display()))?;
            builder = builder.with_template_file(template);
        }
        if let Some(path) = &self.constraint_custom_template_file {
            let template = CustomTemplate::from_file(path)
                .with_context(|| format!("Unable to read template file {}", path.display()))?;
            builder = builder.with_constraint_file(template);
        }

        Ok(builder)
    }
}

/// Runs the create command.
pub fn run(args: &CreateArgs, ignore: &str) -> Result<()> {
    info!(path = ?args.path, output = ?args.output, "Creating manifests");

    let builder = args.manifest_builder()?;
    let compiler = Compiler::new(super::compiler_config(ignore)?);
    let policies = compiler
        .compile_dir(&args.path)
        .with_context(|| format!("Failed to compile policies in {}", args.path.display()))?;

    let mut written = 0;
    for policy in &policies {
        let manifests = builder
            .render(policy)
            .with_context(|| format!("Failed to render manifests for {}", policy.path.display()))?;

        if let Some(template) = &manifests.template {
            let path = output_path(policy, args.output.as_deref(), "template");
            write_manifest(&path, template)?;
            written += 1;
        }
        if let Some(constraint) = &manifests.constraint {
            let path = output_path(policy, args.output.as_deref(), "constraint");
            write_manifest(&path, constraint)?;
            written += 1;
        }
    }

    info!(policies = policies.len(), manifests = written, "Completed successfully");
    Ok(())
}

/// Returns where a manifest of the given type is written.
///
/// Without an output directory the manifest sits next to its policy as
/// `<type>.yaml`; with one, files are named `<type>_<Kind>.yaml` so that
/// policies do not overwrite each other.
fn output_path(policy: &Policy, output: Option<&Path>, manifest_type: &str) -> PathBuf {
    match output {
        Some(dir) => dir.join(format!("{manifest_type}_{}.yaml", policy.kind)),
        None => policy
            .path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!("{manifest_type}.yaml")),
    }
}

fn write_manifest(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    debug!(path = %path.display(), "Wrote manifest");
    Ok(())
}
