//! Markdown documentation for a policy corpus.

use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};

use kanon_core::{Policy, Severity};
use tracing::debug;

use crate::error::{CompilerError, Result};
use crate::parser::strip_comment_lines;

/// Where the rendered document lives and how sources are linked.
#[derive(Debug, Clone, Default)]
pub struct DocsOptions {
    /// Base URL for source links. Relative links are used when unset.
    pub url: Option<String>,
    /// Directory the document is written to.
    pub output_dir: PathBuf,
}

impl DocsOptions {
    /// Creates options for a document written to `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: None,
            output_dir: output_dir.into(),
        }
    }

    /// Sets the base URL for source links.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Returns the Markdown anchor for a title.
///
/// ```rust
/// assert_eq!(kanon_compiler::docs::anchor("Required Labels"), "required-labels");
/// ```
#[must_use]
pub fn anchor(title: &str) -> String {
    title.trim().to_lowercase().replace(' ', "-")
}

/// Renders the Markdown document. Policies without a title are left out.
///
/// # Errors
///
/// Returns an error if the document cannot be written.
pub fn render(policies: &[Policy], options: &DocsOptions) -> Result<String> {
    let titled: Vec<&Policy> = policies.iter().filter(|p| !p.title.is_empty()).collect();
    let mut out = String::new();

    render_inner(&mut out, &titled, options).map_err(|e| CompilerError::RenderError {
        what: "documentation".to_string(),
        message: e.to_string(),
    })?;

    debug!(policies = titled.len(), "Rendered documentation");
    Ok(out)
}

fn render_inner(out: &mut String, policies: &[&Policy], options: &DocsOptions) -> std::fmt::Result {
    writeln!(out, "# Policies")?;

    for (heading, severity) in [("Violations", Severity::Violation), ("Warnings", Severity::Warning)] {
        writeln!(out, "\n## {heading}\n")?;
        for policy in policies.iter().filter(|p| p.severity == severity) {
            writeln!(out, "* [{}](#{})", policy.title, anchor(&policy.title))?;
        }
    }

    for policy in policies {
        writeln!(out, "\n## {}\n", policy.title)?;
        writeln!(out, "**Severity:** {}\n", policy.severity)?;

        if !policy.matchers.kind_matchers.is_empty() {
            writeln!(out, "**Resources:** {}\n", policy.matchers.kind_matchers)?;
        }

        if !policy.parameters.is_empty() {
            writeln!(out, "**Parameters:**\n")?;
            for parameter in &policy.parameters {
                let ty = if parameter.is_array {
                    format!("array of {}", parameter.ty)
                } else {
                    parameter.ty.clone()
                };
                write!(out, "* `{}`: {ty}", parameter.name)?;
                if let Some(description) = &parameter.description {
                    write!(out, ". {description}")?;
                }
                writeln!(out)?;
            }
            writeln!(out)?;
        }

        if !policy.description.is_empty() {
            writeln!(out, "{}\n", policy.description)?;
        }

        writeln!(out, "### Rego\n")?;
        writeln!(out, "```rego\n{}\n```\n", rego_without_comments(&policy.sanitized_source))?;

        let link = source_link(policy, options);
        writeln!(out, "_source: [{link}]({link})_")?;
    }

    Ok(())
}

/// Returns the link to a policy's directory.
#[must_use]
pub fn source_link(policy: &Policy, options: &DocsOptions) -> String {
    let dir = policy.path.parent().unwrap_or_else(|| Path::new(""));

    match &options.url {
        Some(url) => format!("{}/{}", url.trim_end_matches('/'), to_slash(dir)),
        None => to_slash(&relative_path(&options.output_dir, dir)),
    }
}

/// Drops full-line comments and surrounding blank lines.
fn rego_without_comments(source: &str) -> String {
    strip_comment_lines(source).trim_matches('\n').to_string()
}

fn to_slash(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Returns `to` relative to the directory `from`, both lexically normalized.
fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from = normalize(from);
    let to = normalize(to);

    let common = from
        .iter()
        .zip(&to)
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..from.len() {
        result.push("..");
    }
    for part in &to[common..] {
        result.push(part);
    }
    result
}

fn normalize(path: &Path) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.last().is_some_and(|p| p != "..") {
                    parts.pop();
                } else {
                    parts.push("..".to_string());
                }
            }
            other => parts.push(other.as_os_str().to_string_lossy().into_owned()),
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use kanon_core::{KindMatchers, Matchers, Parameter};

    use super::*;

    fn policies() -> Vec<Policy> {
        vec![
            Policy::new(
                "policies/pod-limits/src.rego",
                "# @title Pod limits\npackage pod_limits\n\nviolation[msg] {\n  msg := \"x\"\n}\n",
                Severity::Violation,
            )
            .with_title("Pod limits")
            .with_description("Containers set limits.")
            .with_parameter(Parameter::new("max", "integer").with_description("Upper bound"))
            .with_matchers(Matchers {
                kind_matchers: KindMatchers::from_pairs([("core", "Pod"), ("apps", "Deployment")]),
                ..Matchers::default()
            }),
            Policy::new("policies/deprecated-api/src.rego", "package x\n\nwarn[msg] { msg := 1 }", Severity::Warning)
                .with_title("Deprecated API"),
            Policy::new("policies/untitled/src.rego", "package y\n", Severity::Violation),
        ]
    }

    #[test]
    fn test_anchor() {
        assert_eq!(anchor("Pod limits"), "pod-limits");
    }

    #[test]
    fn test_render() {
        let doc = render(&policies(), &DocsOptions::new("docs")).unwrap();

        assert!(doc.starts_with("# Policies\n\n## Violations\n\n* [Pod limits](#pod-limits)\n"));
        assert!(doc.contains("## Warnings\n\n* [Deprecated API](#deprecated-api)\n"));
        assert!(doc.contains("**Severity:** Violation"));
        assert!(doc.contains("**Resources:** core/Pod apps/Deployment"));
        assert!(doc.contains("* `max`: integer. Upper bound"));
        assert!(doc.contains("```rego\npackage pod_limits\n\nviolation[msg] {\n  msg := \"x\"\n}\n```"));
        assert!(doc.contains("_source: [../policies/pod-limits](../policies/pod-limits)_"));
        assert!(!doc.contains("untitled"));
        assert!(!doc.contains("@title"));
    }

    #[test]
    fn test_rego_keeps_hash_lines_in_raw_strings() {
        let source = "# @title X\npackage x\n\n# helper\nmsg := `\n# heading\n`\n";
        assert_eq!(rego_without_comments(source), "package x\n\nmsg := `\n# heading\n`");
    }

    #[test]
    fn test_source_link_with_url() {
        let options = DocsOptions::new(".").with_url("https://github.com/org/repo/");
        let link = source_link(&policies()[0], &options);
        assert_eq!(link, "https://github.com/org/repo/policies/pod-limits");
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("."), Path::new("policies/a")),
            PathBuf::from("policies/a")
        );
        assert_eq!(
            relative_path(Path::new("docs/out"), Path::new("./policies/a")),
            PathBuf::from("../../policies/a")
        );
        assert_eq!(
            relative_path(Path::new("policies"), Path::new("policies/a")),
            PathBuf::from("a")
        );
    }
}
