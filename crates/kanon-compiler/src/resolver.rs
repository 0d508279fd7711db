//! Library dependency resolution.
//!
//! Collects the transitive closure of `data.` imports for a policy so the
//! generated template can ship every library it needs.

use std::collections::HashSet;

use tracing::{debug, trace};

use kanon_core::policy::sanitize_source;

use crate::error::{CompilerError, Result};
use crate::loader::ModuleSet;
use crate::parser::RegoModule;

/// Root every resolvable import starts with.
pub const DATA_ROOT: &str = "data";

/// Data roots supplied at admission time rather than by the corpus.
pub const DEFAULT_EXTERNAL_ROOTS: [&str; 1] = ["data.inventory"];

/// Configuration for dependency resolution.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Import prefixes that are never looked up in the corpus.
    pub external_roots: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            external_roots: DEFAULT_EXTERNAL_ROOTS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl ResolverConfig {
    /// Creates a resolver configuration with the default external roots.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an external data root.
    #[must_use]
    pub fn with_external_root(mut self, root: impl Into<String>) -> Self {
        self.external_roots.push(root.into());
        self
    }

    /// Returns true if the import must be found in the corpus.
    ///
    /// Only `data.` imports outside the external roots qualify; `input`,
    /// `future.keywords` and `rego.v1` never do.
    #[must_use]
    pub fn is_resolvable(&self, import: &str) -> bool {
        let Some(rest) = import.strip_prefix(DATA_ROOT) else {
            return false;
        };
        if !rest.starts_with('.') {
            return false;
        }
        !self.external_roots.iter().any(|root| {
            import == root
                || import
                    .strip_prefix(root.as_str())
                    .is_some_and(|tail| tail.starts_with('.'))
        })
    }
}

/// Resolves imports against a loaded corpus.
///
/// # Examples
///
/// ```rust,no_run
/// use kanon_compiler::{Loader, Resolver, ResolverConfig};
///
/// let modules = Loader::default().load_dir("policies").unwrap();
/// let resolver = Resolver::new(&modules, ResolverConfig::new());
///
/// for module in modules.modules() {
///     let libs = resolver.dependencies(module).unwrap();
///     println!("{}: {} libraries", module.file_name(), libs.len());
/// }
/// ```
#[derive(Debug)]
pub struct Resolver<'a> {
    modules: &'a ModuleSet,
    config: ResolverConfig,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver over the given modules.
    #[must_use]
    pub const fn new(modules: &'a ModuleSet, config: ResolverConfig) -> Self {
        Self { modules, config }
    }

    /// Maps an import to the package path that satisfies it.
    ///
    /// An exact package match wins; otherwise the last segment is dropped
    /// once, so importing a single rule of a package works.
    ///
    /// # Errors
    ///
    /// Returns [`CompilerError::ImportNotFound`] if neither lookup succeeds.
    pub fn resolve_import(&self, file: &str, import: &str) -> Result<String> {
        if self.modules.contains(import) {
            return Ok(import.to_string());
        }

        if let Some((parent, _)) = import.rsplit_once('.') {
            if self.modules.contains(parent) {
                trace!(import, package = parent, "Resolved import to parent package");
                return Ok(parent.to_string());
            }
        }

        Err(CompilerError::ImportNotFound {
            file: file.to_string(),
            import: import.to_string(),
        })
    }

    /// Returns the package paths the module transitively imports, in
    /// first-visit order.
    ///
    /// Packages are compared case-insensitively and the module's own package
    /// is never included, so import cycles terminate.
    ///
    /// # Errors
    ///
    /// Returns the first import that cannot be resolved.
    pub fn dependency_packages(&self, module: &RegoModule) -> Result<Vec<String>> {
        let mut visited = HashSet::from([module.package_path().to_lowercase()]);
        let mut order = Vec::new();

        self.visit(module, &mut visited, &mut order)?;
        Ok(order)
    }

    /// Returns the sanitized source of every library the module transitively
    /// imports. A package split across files contributes each file.
    ///
    /// # Errors
    ///
    /// Returns the first import that cannot be resolved.
    pub fn dependencies(&self, module: &RegoModule) -> Result<Vec<String>> {
        let packages = self.dependency_packages(module)?;

        let sources: Vec<String> = packages
            .iter()
            .flat_map(|pkg| self.modules.get(pkg))
            .map(|m| sanitize_source(&m.source))
            .collect();

        debug!(
            file = %module.file_name(),
            packages = packages.len(),
            "Resolved dependencies"
        );
        Ok(sources)
    }

    fn visit(
        &self,
        module: &RegoModule,
        visited: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        for import in &module.imports {
            if !self.config.is_resolvable(import) {
                continue;
            }

            let package = self.resolve_import(&module.file_name(), import)?;
            if !visited.insert(package.to_lowercase()) {
                continue;
            }
            order.push(package.clone());

            for dependency in self.modules.get(&package) {
                self.visit(dependency, visited, order)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn set(files: &[(&str, &str)]) -> ModuleSet {
        let parser = Parser::new().with_syntax_check(false);
        ModuleSet::from_modules(
            files
                .iter()
                .map(|(path, source)| parser.parse_source(source, path).unwrap())
                .collect(),
        )
    }

    fn package_of<'a>(modules: &'a ModuleSet, path: &str) -> &'a RegoModule {
        modules
            .modules()
            .find(|m| m.file_name() == path)
            .unwrap()
    }

    #[test]
    fn test_transitive_closure() {
        let modules = set(&[
            ("a/src.rego", "package a\n\nimport data.lib.b\nimport data.lib.b.helper\n"),
            ("lib/b.rego", "package lib.b\n\nimport data.lib.c\n\nhelper := 1\n"),
            ("lib/c.rego", "package lib.c\n\nx := 1\n"),
        ]);
        let resolver = Resolver::new(&modules, ResolverConfig::new());
        let a = package_of(&modules, "a/src.rego");

        assert_eq!(
            resolver.dependency_packages(a).unwrap(),
            vec!["data.lib.b", "data.lib.c"]
        );
        let sources = resolver.dependencies(a).unwrap();
        assert_eq!(sources.len(), 2);
        assert!(sources[0].starts_with("package lib.b"));
        assert!(sources[1].starts_with("package lib.c"));
    }

    #[test]
    fn test_cycle_terminates() {
        let modules = set(&[
            ("lib/x.rego", "package lib.x\n\nimport data.lib.y\n"),
            ("lib/y.rego", "package lib.y\n\nimport data.lib.x\n"),
        ]);
        let resolver = Resolver::new(&modules, ResolverConfig::new());
        let x = package_of(&modules, "lib/x.rego");

        assert_eq!(resolver.dependency_packages(x).unwrap(), vec!["data.lib.y"]);
    }

    #[test]
    fn test_case_insensitive_dedup() {
        let modules = set(&[
            ("a/src.rego", "package a\n\nimport data.lib.Util\nimport data.lib.util\n"),
            ("lib/u1.rego", "package lib.Util\n"),
            ("lib/u2.rego", "package lib.util\n"),
        ]);
        let resolver = Resolver::new(&modules, ResolverConfig::new());
        let a = package_of(&modules, "a/src.rego");

        assert_eq!(resolver.dependency_packages(a).unwrap(), vec!["data.lib.Util"]);
    }

    #[test]
    fn test_split_package_contributes_every_file() {
        let modules = set(&[
            ("a/src.rego", "package a\n\nimport data.lib.k8s\n"),
            ("lib/k8s/a.rego", "package lib.k8s\n\na := 1\n"),
            ("lib/k8s/b.rego", "package lib.k8s\n\nb := 1\n"),
        ]);
        let resolver = Resolver::new(&modules, ResolverConfig::new());

        let sources = resolver.dependencies(package_of(&modules, "a/src.rego")).unwrap();
        assert_eq!(sources.len(), 2);
    }

    #[test]
    fn test_missing_import() {
        let modules = set(&[("a/src.rego", "package a\n\nimport data.lib.missing.rule\n")]);
        let resolver = Resolver::new(&modules, ResolverConfig::new());

        let err = resolver
            .dependencies(package_of(&modules, "a/src.rego"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "import not found: `data.lib.missing.rule` (in a/src.rego)"
        );
    }

    #[test]
    fn test_non_data_and_external_imports_are_skipped() {
        let modules = set(&[(
            "a/src.rego",
            "package a\n\nimport future.keywords.in\nimport rego.v1\nimport input.review\nimport data.inventory.cluster\nimport data.custom.ext\n",
        )]);
        let config = ResolverConfig::new().with_external_root("data.custom");
        let resolver = Resolver::new(&modules, config);

        assert!(resolver
            .dependency_packages(package_of(&modules, "a/src.rego"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_is_resolvable() {
        let config = ResolverConfig::new();
        assert!(config.is_resolvable("data.lib.core"));
        assert!(config.is_resolvable("data.inventoryx"));
        assert!(!config.is_resolvable("data.inventory"));
        assert!(!config.is_resolvable("data.inventory.namespace"));
        assert!(!config.is_resolvable("database.x"));
        assert!(!config.is_resolvable("input"));
    }
}
