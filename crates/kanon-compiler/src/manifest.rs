//! Gatekeeper manifest generation.
//!
//! Each [`Policy`] becomes a `ConstraintTemplate` and, when it can be
//! instantiated without user input, a `Constraint`.

use std::fmt;
use std::str::FromStr;

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use kanon_core::Policy;

use crate::custom_template::CustomTemplate;
use crate::error::{CompilerError, Result};

/// Target every template is registered for.
pub const ADMISSION_TARGET: &str = "admission.k8s.gatekeeper.sh";

/// API group of ConstraintTemplates.
pub const TEMPLATE_API_GROUP: &str = "templates.gatekeeper.sh";

/// API version of generated Constraints.
pub const CONSTRAINT_API_VERSION: &str = "constraints.gatekeeper.sh/v1beta1";

/// Enforcement action forced by dry-run mode.
const DRYRUN: &str = "dryrun";

/// ConstraintTemplate API version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TemplateVersion {
    /// `templates.gatekeeper.sh/v1`.
    #[default]
    V1,
    /// `templates.gatekeeper.sh/v1beta1`.
    V1Beta1,
}

impl TemplateVersion {
    /// Returns the version segment of the API version.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V1Beta1 => "v1beta1",
        }
    }

    /// Returns the full `apiVersion` value.
    #[must_use]
    pub fn api_version(&self) -> String {
        format!("{TEMPLATE_API_GROUP}/{}", self.as_str())
    }
}

impl fmt::Display for TemplateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateVersion {
    type Err = CompilerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "v1" => Ok(Self::V1),
            "v1beta1" => Ok(Self::V1Beta1),
            other => Err(CompilerError::RenderError {
                what: "ConstraintTemplate".to_string(),
                message: format!("unsupported API version: {other}"),
            }),
        }
    }
}

/// Options controlling manifest generation.
#[derive(Debug, Clone, Default)]
pub struct ManifestOptions {
    /// ConstraintTemplate API version.
    pub template_version: TemplateVersion,
    /// Force `enforcementAction: dryrun` on every Constraint.
    pub dryrun: bool,
    /// Never generate Constraints.
    pub skip_constraints: bool,
    /// Generate Constraints with parameter placeholders for parameterized
    /// policies instead of skipping them.
    pub partial_constraints: bool,
}

impl ManifestOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ConstraintTemplate API version.
    #[must_use]
    pub const fn with_template_version(mut self, version: TemplateVersion) -> Self {
        self.template_version = version;
        self
    }

    /// Sets dry-run mode.
    #[must_use]
    pub const fn with_dryrun(mut self, dryrun: bool) -> Self {
        self.dryrun = dryrun;
        self
    }

    /// Sets whether Constraints are skipped.
    #[must_use]
    pub const fn with_skip_constraints(mut self, skip: bool) -> Self {
        self.skip_constraints = skip;
        self
    }

    /// Sets whether partial Constraints are generated.
    #[must_use]
    pub const fn with_partial_constraints(mut self, partial: bool) -> Self {
        self.partial_constraints = partial;
        self
    }
}

/// Manifests generated for one policy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifests {
    /// The ConstraintTemplate, unless skipped.
    pub template: Option<Value>,
    /// The Constraint, unless skipped.
    pub constraint: Option<Value>,
}

/// Manifests for one policy, serialized for writing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedManifests {
    /// The ConstraintTemplate document, unless skipped.
    pub template: Option<String>,
    /// The Constraint document, unless skipped.
    pub constraint: Option<String>,
}

/// Builds Gatekeeper manifests from policies.
///
/// # Examples
///
/// ```rust
/// use kanon_compiler::manifest::{ManifestBuilder, ManifestOptions};
/// use kanon_core::{Policy, Severity};
///
/// let policy = Policy::new(
///     "policies/pod-limits/src.rego",
///     "package pod_limits\n",
///     Severity::Violation,
/// );
///
/// let manifests = ManifestBuilder::new(ManifestOptions::new()).build(&policy).unwrap();
/// let template = manifests.template.unwrap();
/// assert_eq!(template["spec"]["crd"]["spec"]["names"]["kind"], "PodLimits");
/// ```
#[derive(Debug, Default)]
pub struct ManifestBuilder {
    options: ManifestOptions,
    template_file: Option<CustomTemplate>,
    constraint_file: Option<CustomTemplate>,
}

impl ManifestBuilder {
    /// Creates a builder.
    #[must_use]
    pub const fn new(options: ManifestOptions) -> Self {
        Self {
            options,
            template_file: None,
            constraint_file: None,
        }
    }

    /// Renders ConstraintTemplates from a custom template.
    #[must_use]
    pub fn with_template_file(mut self, template: CustomTemplate) -> Self {
        self.template_file = Some(template);
        self
    }

    /// Renders Constraints from a custom template.
    #[must_use]
    pub fn with_constraint_file(mut self, template: CustomTemplate) -> Self {
        self.constraint_file = Some(template);
        self
    }

    /// Builds and serializes the manifests for a policy.
    ///
    /// The same skip rules as [`Self::build`] apply. A manifest with a
    /// custom template is rendered from it, any other is written as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the enforcement action is invalid or a manifest
    /// cannot be rendered.
    pub fn render(&self, policy: &Policy) -> Result<RenderedManifests> {
        let manifests = self.build(policy)?;

        let template = match (&manifests.template, &self.template_file) {
            (None, _) => None,
            (Some(_), Some(custom)) => Some(custom.render(self.context(policy)?)?),
            (Some(template), None) => Some(to_yaml(template)?),
        };
        let constraint = match (&manifests.constraint, &self.constraint_file) {
            (None, _) => None,
            (Some(_), Some(custom)) => Some(custom.render(self.context(policy)?)?),
            (Some(constraint), None) => Some(to_yaml(constraint)?),
        };

        Ok(RenderedManifests {
            template,
            constraint,
        })
    }

    /// Returns the values custom templates are rendered against.
    ///
    /// Every [`Policy`] field under its camelCase name, plus `match` (the
    /// Constraint match block or null), `enforcementAction` (the action
    /// after dry-run is applied) and `templateApiVersion`.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy cannot be serialized.
    pub fn context(&self, policy: &Policy) -> Result<Value> {
        let mut context = match serde_json::to_value(policy) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(e) => {
                return Err(CompilerError::RenderError {
                    what: "template context".to_string(),
                    message: e.to_string(),
                })
            }
        };

        let enforcement = if self.options.dryrun {
            DRYRUN
        } else {
            policy.enforcement.as_str()
        };
        context.insert(
            "match".to_string(),
            policy.matchers.to_spec().unwrap_or(Value::Null),
        );
        context.insert("enforcementAction".to_string(), json!(enforcement));
        context.insert(
            "templateApiVersion".to_string(),
            json!(self.options.template_version.api_version()),
        );

        Ok(Value::Object(context))
    }

    /// Builds the manifests for a policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the enforcement action is not one Gatekeeper
    /// accepts.
    pub fn build(&self, policy: &Policy) -> Result<Manifests> {
        let path = policy.path_str();

        if policy.skip_template {
            info!(%path, "Skipping ConstraintTemplate generation due to configuration");
            return Ok(Manifests::default());
        }
        policy.validate_enforcement()?;

        let template = self.template(policy);

        let constraint = if self.options.skip_constraints || policy.skip_constraint {
            info!(%path, "Skipping Constraint generation due to configuration");
            None
        } else if !self.options.partial_constraints && !policy.parameters.is_empty() {
            warn!(%path, "Skipping Constraint generation due to use of parameters");
            None
        } else {
            Some(self.constraint(policy))
        };

        debug!(%path, kind = %policy.kind, "Built manifests");
        Ok(Manifests {
            template: Some(template),
            constraint,
        })
    }

    /// Returns the ConstraintTemplate object.
    #[must_use]
    pub fn template(&self, policy: &Policy) -> Value {
        let mut crd_spec = Map::new();
        crd_spec.insert("names".to_string(), json!({ "kind": policy.kind }));

        if !policy.parameters.is_empty() {
            let properties: Map<String, Value> = policy
                .parameters
                .iter()
                .map(|p| (p.name.clone(), p.schema()))
                .collect();

            let mut schema = Map::new();
            schema.insert("properties".to_string(), Value::Object(properties));
            if self.options.template_version == TemplateVersion::V1 {
                schema.insert("type".to_string(), json!("object"));
            }
            crd_spec.insert(
                "validation".to_string(),
                json!({ "openAPIV3Schema": schema }),
            );
        }

        let mut target = Map::new();
        target.insert("target".to_string(), json!(ADMISSION_TARGET));
        if !policy.dependencies.is_empty() {
            target.insert("libs".to_string(), json!(policy.dependencies));
        }
        target.insert("rego".to_string(), json!(policy.sanitized_source));

        json!({
            "apiVersion": self.options.template_version.api_version(),
            "kind": "ConstraintTemplate",
            "metadata": { "name": policy.name },
            "spec": {
                "crd": { "spec": crd_spec },
                "targets": [target]
            }
        })
    }

    /// Returns the Constraint object.
    #[must_use]
    pub fn constraint(&self, policy: &Policy) -> Value {
        let mut metadata = Map::new();
        metadata.insert("name".to_string(), json!(policy.name));
        if !policy.annotations.is_empty() {
            metadata.insert("annotations".to_string(), json!(policy.annotations));
        }
        if !policy.labels.is_empty() {
            metadata.insert("labels".to_string(), json!(policy.labels));
        }

        let mut spec = Map::new();
        if self.options.dryrun {
            spec.insert("enforcementAction".to_string(), json!(DRYRUN));
        } else if policy.enforcement != kanon_core::policy::DEFAULT_ENFORCEMENT {
            spec.insert("enforcementAction".to_string(), json!(policy.enforcement));
        }
        if let Some(matchers) = policy.matchers.to_spec() {
            spec.insert("match".to_string(), matchers);
        }
        if self.options.partial_constraints && !policy.parameters.is_empty() {
            let placeholders: Map<String, Value> = policy
                .parameters
                .iter()
                .map(|p| (p.name.clone(), Value::Null))
                .collect();
            spec.insert("parameters".to_string(), Value::Object(placeholders));
        }

        let mut constraint = Map::new();
        constraint.insert("apiVersion".to_string(), json!(CONSTRAINT_API_VERSION));
        constraint.insert("kind".to_string(), json!(policy.kind));
        constraint.insert("metadata".to_string(), Value::Object(metadata));
        if !spec.is_empty() {
            constraint.insert("spec".to_string(), Value::Object(spec));
        }

        Value::Object(constraint)
    }
}

/// Serializes a manifest as YAML.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_yaml(manifest: &Value) -> Result<String> {
    Ok(serde_yaml::to_string(manifest)?)
}
