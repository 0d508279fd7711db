//! Policy model and metadata.
//!
//! This module defines the [`Policy`] structure handed to manifest and
//! documentation generators: one record per severity-classified Rego file.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::matchers::Matchers;
use crate::parameter::Parameter;

/// Enforcement action used when a policy declares none.
pub const DEFAULT_ENFORCEMENT: &str = "deny";

/// Enforcement actions Gatekeeper accepts on a Constraint.
pub const ENFORCEMENT_ACTIONS: [&str; 3] = ["deny", "dryrun", "warn"];

/// Severity of a policy, derived from its rule heads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The policy has a `violation` rule.
    Violation,
    /// The policy has a `warn` rule and no `violation` rule.
    Warning,
}

impl Severity {
    /// Returns the rule name that carries this severity.
    #[must_use]
    pub const fn rule_name(&self) -> &'static str {
        match self {
            Self::Violation => "violation",
            Self::Warning => "warn",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Violation => f.write_str("Violation"),
            Self::Warning => f.write_str("Warning"),
        }
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "violation" => Ok(Self::Violation),
            "warn" | "warning" => Ok(Self::Warning),
            other => Err(Error::UnknownSeverity(other.to_string())),
        }
    }
}

/// Category of a non-fatal finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdvisoryKind {
    /// Legacy and METADATA annotations both set the same thing.
    PrecedenceConflict,
    /// A legacy `@tag` annotation is in use.
    LegacyAnnotation,
    /// A METADATA key was not understood and was ignored.
    UnsupportedKey,
}

/// A non-fatal finding attached to a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advisory {
    /// What kind of finding this is.
    pub kind: AdvisoryKind,
    /// Human-readable message.
    pub message: String,
}

impl Advisory {
    /// Creates a new advisory.
    #[must_use]
    pub fn new(kind: AdvisoryKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A Rego policy with its extracted metadata.
///
/// # Examples
///
/// ```rust
/// use kanon_core::{Policy, Severity};
///
/// let policy = Policy::new(
///     "policies/container-deny-latest/src.rego",
///     "package container_deny_latest\n",
///     Severity::Violation,
/// );
///
/// assert_eq!(policy.kind, "ContainerDenyLatest");
/// assert_eq!(policy.name, "containerdenylatest");
/// assert_eq!(policy.enforcement, "deny");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Source file path.
    pub path: PathBuf,

    /// Constraint kind, PascalCase of the containing directory.
    pub kind: String,

    /// Constraint name, the lowercase kind.
    pub name: String,

    /// Declared Rego package (without the `data.` prefix).
    #[serde(default)]
    pub package: String,

    /// Policy title.
    #[serde(default)]
    pub title: String,

    /// Policy description.
    #[serde(default)]
    pub description: String,

    /// Raw Rego source.
    pub source: String,

    /// Source with carriage returns removed, tabs expanded and trailing
    /// whitespace trimmed.
    pub sanitized_source: String,

    /// Comments before the package declaration, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub header_comments: Vec<String>,

    /// Rule head names, in declaration order.
    #[serde(default)]
    pub rule_names: Vec<String>,

    /// Severity classification.
    pub severity: Severity,

    /// Gatekeeper enforcement action.
    pub enforcement: String,

    /// Whether Constraint generation is skipped.
    #[serde(default)]
    pub skip_constraint: bool,

    /// Whether ConstraintTemplate generation is skipped.
    #[serde(default)]
    pub skip_template: bool,

    /// Identifier declared through the `policyID` rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,

    /// Declared parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,

    /// Normalized matchers.
    #[serde(default)]
    pub matchers: Matchers,

    /// Annotations to put on the generated Constraint.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Labels to put on the generated Constraint.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Whether the header carries a `# METADATA` block.
    #[serde(default)]
    pub has_metadata: bool,

    /// Sources of every library this policy transitively imports.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    /// Non-fatal findings from extraction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advisories: Vec<Advisory>,
}

impl Policy {
    /// Creates a policy with derived identity and default metadata.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, source: impl Into<String>, severity: Severity) -> Self {
        let path = path.into();
        let source = source.into();
        let kind = kind_from_path(&path);

        Self {
            name: kind.to_lowercase(),
            kind,
            package: String::new(),
            title: String::new(),
            description: String::new(),
            sanitized_source: sanitize_source(&source),
            source,
            path,
            header_comments: Vec::new(),
            rule_names: Vec::new(),
            severity,
            enforcement: DEFAULT_ENFORCEMENT.to_string(),
            skip_constraint: false,
            skip_template: false,
            policy_id: None,
            parameters: Vec::new(),
            matchers: Matchers::default(),
            annotations: BTreeMap::new(),
            labels: BTreeMap::new(),
            has_metadata: false,
            dependencies: Vec::new(),
            advisories: Vec::new(),
        }
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the enforcement action.
    #[must_use]
    pub fn with_enforcement(mut self, enforcement: impl Into<String>) -> Self {
        self.enforcement = enforcement.into();
        self
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Sets the matchers.
    #[must_use]
    pub fn with_matchers(mut self, matchers: Matchers) -> Self {
        self.matchers = matchers;
        self
    }

    /// Returns the source path as a display string.
    #[must_use]
    pub fn path_str(&self) -> String {
        self.path.display().to_string()
    }

    /// Checks that the enforcement action is one Gatekeeper accepts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEnforcement`] for any other action.
    pub fn validate_enforcement(&self) -> Result<()> {
        if ENFORCEMENT_ACTIONS.contains(&self.enforcement.as_str()) {
            Ok(())
        } else {
            Err(Error::InvalidEnforcement {
                action: self.enforcement.clone(),
                path: self.path_str(),
            })
        }
    }
}

/// Derives the constraint kind from a policy path.
///
/// The containing directory name is split on `-`, `_` and spaces and each
/// word gets an upper-case first letter.
///
/// ```rust
/// use kanon_core::policy::kind_from_path;
///
/// assert_eq!(
///     kind_from_path("/path/to/container-resource-limits/src.rego"),
///     "ContainerResourceLimits"
/// );
/// ```
#[must_use]
pub fn kind_from_path(path: impl AsRef<Path>) -> String {
    let dir = path
        .as_ref()
        .parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    dir.split(['-', '_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect::<String>()
            })
        })
        .collect()
}

/// Normalizes Rego source for embedding in YAML block scalars.
///
/// ```rust
/// use kanon_core::policy::sanitize_source;
///
/// assert_eq!(sanitize_source("a  \r\n\tb\t\n"), "a\n    b");
/// ```
#[must_use]
pub fn sanitize_source(source: &str) -> String {
    source
        .replace('\r', "")
        .replace('\t', "    ")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_new_derives_identity() {
        let policy = Policy::new(
            "/path/to/rego/container-resource-limits/something.rego",
            "package x",
            Severity::Violation,
        );

        assert_eq!(policy.kind, "ContainerResourceLimits");
        assert_eq!(policy.name, "containerresourcelimits");
        assert_eq!(policy.enforcement, DEFAULT_ENFORCEMENT);
        assert!(policy.parameters.is_empty());
        assert!(policy.matchers.is_empty());
    }

    #[test]
    fn test_kind_keeps_inner_case() {
        assert_eq!(kind_from_path("policies/pod-PSP_rules/src.rego"), "PodPSPRules");
    }

    #[test]
    fn test_kind_without_parent() {
        assert_eq!(kind_from_path("src.rego"), "");
    }

    #[test]
    fn test_sanitize_source() {
        let source = "package test\r\n\nviolation[msg] {  \n\tmsg := \"x\"\n}\n\n";
        assert_eq!(
            sanitize_source(source),
            "package test\n\nviolation[msg] {\n    msg := \"x\"\n}"
        );
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("violation".parse::<Severity>().unwrap(), Severity::Violation);
        assert_eq!("warn".parse::<Severity>().unwrap(), Severity::Warning);
        assert!("deny".parse::<Severity>().is_err());
    }

    #[test]
    fn test_validate_enforcement() {
        let policy = Policy::new("a/b/src.rego", "", Severity::Warning);
        assert!(policy.validate_enforcement().is_ok());

        let policy = policy.with_enforcement("dryrun");
        assert!(policy.validate_enforcement().is_ok());

        let policy = policy.with_enforcement("block");
        let err = policy.validate_enforcement().unwrap_err();
        assert!(matches!(err, Error::InvalidEnforcement { .. }));
    }

    #[test]
    fn test_policy_serialization() {
        let policy = Policy::new("policies/pod-limits/src.rego", "package x", Severity::Violation)
            .with_title("Pod limits");

        let json = serde_json::to_string(&policy).unwrap();
        assert!(json.contains(r#""kind":"PodLimits""#));
        assert!(json.contains(r#""severity":"violation""#));

        let deserialized: Policy = serde_json::from_str(&json).unwrap();
        assert_eq!(policy, deserialized);
    }
}
