//! Policy assembly.
//!
//! Ties the pipeline together: load every module, classify it, and for each
//! policy extract annotations, check parameters and resolve libraries into a
//! [`Policy`] record.

use std::path::Path;

use tracing::{debug, info, instrument, warn};

use kanon_core::policy::kind_from_path;
use kanon_core::{Policy, Severity};

use crate::annotations::HeaderAnnotations;
use crate::classifier::classify;
use crate::error::{CompilerError, Result};
use crate::loader::{Loader, LoaderConfig, ModuleSet};
use crate::parameters;
use crate::parser::{RegoModule, Rule};
use crate::resolver::{Resolver, ResolverConfig};

/// Rule whose value is the policy identifier.
pub const POLICY_ID_RULE: &str = "policyID";

/// Configuration for a full compilation.
#[derive(Debug, Clone, Default)]
pub struct CompilerConfig {
    /// Module loading.
    pub loader: LoaderConfig,
    /// Dependency resolution.
    pub resolver: ResolverConfig,
}

impl CompilerConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the loader configuration.
    #[must_use]
    pub fn with_loader(mut self, loader: LoaderConfig) -> Self {
        self.loader = loader;
        self
    }

    /// Sets the resolver configuration.
    #[must_use]
    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }
}

/// Turns a directory of Rego modules into [`Policy`] records.
///
/// # Examples
///
/// ```rust,no_run
/// use kanon_compiler::{Compiler, CompilerConfig};
///
/// let policies = Compiler::new(CompilerConfig::new())
///     .compile_dir("policies")
///     .unwrap();
///
/// for policy in &policies {
///     println!("{} ({})", policy.kind, policy.severity);
/// }
/// ```
#[derive(Debug, Default)]
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    /// Creates a compiler.
    #[must_use]
    pub const fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    /// Returns the compiler configuration.
    #[must_use]
    pub const fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Loads `root` and compiles every policy in it.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error; nothing is returned for the rest of
    /// the corpus.
    #[instrument(skip(self), fields(root = %root.as_ref().display()))]
    pub fn compile_dir(&self, root: impl AsRef<Path>) -> Result<Vec<Policy>> {
        let modules = Loader::new(self.config.loader.clone()).load_dir(root)?;
        self.compile(&modules)
    }

    /// Compiles every policy in an already loaded module set, in file order.
    ///
    /// Modules without a `violation` or `warn` rule are libraries and are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error.
    pub fn compile(&self, modules: &ModuleSet) -> Result<Vec<Policy>> {
        let resolver = Resolver::new(modules, self.config.resolver.clone());

        let mut policies = Vec::new();
        for module in modules.modules() {
            if let Some(policy) = self.compile_module(module, &resolver)? {
                policies.push(policy);
            }
        }

        info!(
            policies = policies.len(),
            violations = policies.iter().filter(|p| p.severity == Severity::Violation).count(),
            "Compiled policies"
        );
        Ok(policies)
    }

    /// Compiles a single module, or returns `None` for a library.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed annotations, undeclared parameters or
    /// unresolved imports.
    pub fn compile_module(
        &self,
        module: &RegoModule,
        resolver: &Resolver<'_>,
    ) -> Result<Option<Policy>> {
        let file = module.file_name();
        let rule_names = module.rule_names();

        let Some(severity) = classify(&rule_names) else {
            debug!(path = %file, "No violation or warn rule, skipping");
            return Ok(None);
        };
        if kind_from_path(&module.path).is_empty() {
            return Err(CompilerError::MissingKind { file });
        }

        let header = module.header_comments();
        let annotations = HeaderAnnotations::extract(&header)
            .and_then(HeaderAnnotations::resolve)
            .map_err(|e| CompilerError::annotation(&file, e))?;

        parameters::reconcile(module, &annotations.parameters)?;
        let dependencies = resolver.dependencies(module)?;

        for advisory in &annotations.advisories {
            warn!(path = %file, kind = ?advisory.kind, "{}", advisory.message);
        }

        let mut policy = Policy::new(&module.path, &module.source, severity)
            .with_title(annotations.title)
            .with_description(annotations.description)
            .with_enforcement(annotations.enforcement)
            .with_matchers(annotations.matchers);

        policy.package.clone_from(&module.package);
        policy.header_comments = header.into_iter().map(|c| c.text).collect();
        policy.rule_names = rule_names;
        policy.skip_constraint = annotations.skip_constraint;
        policy.skip_template = annotations.skip_template;
        policy.policy_id = module.rule(POLICY_ID_RULE).and_then(Rule::head_value);
        policy.parameters = annotations.parameters;
        policy.annotations = annotations.annotations;
        policy.labels = annotations.labels;
        policy.has_metadata = annotations.has_metadata;
        policy.dependencies = dependencies;
        policy.advisories = annotations.advisories;

        debug!(path = %file, kind = %policy.kind, %severity, "Compiled policy");
        Ok(Some(policy))
    }
}
