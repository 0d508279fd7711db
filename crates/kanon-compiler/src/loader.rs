//! Module loading.
//!
//! Walks a policy directory, parses every Rego file and indexes the resulting
//! modules by package path. Any parse failure aborts the whole load.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, info, instrument};
use walkdir::{DirEntry, WalkDir};

use crate::error::{CompilerError, Result};
use crate::parser::{Parser, RegoModule};

/// Ignore pattern that matches nothing.
pub const DEFAULT_IGNORE_PATTERN: &str = "^$";

/// Version control directory that is never traversed.
const VCS_DIR: &str = ".git";

/// Configuration for module loading.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Paths matching this pattern are skipped.
    pub ignore: Option<Regex>,
    /// Whether `*_test.rego` files are loaded.
    pub include_tests: bool,
    /// File extension of policy sources.
    pub extension: String,
    /// Whether sources are syntax-checked with the Rego parser.
    pub syntax_check: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            ignore: None,
            include_tests: false,
            extension: "rego".to_string(),
            syntax_check: true,
        }
    }
}

impl LoaderConfig {
    /// Creates a new loader configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ignore pattern from a regex string.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is not a valid regex.
    pub fn with_ignore_pattern(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| CompilerError::InvalidIgnorePattern {
            pattern: pattern.to_string(),
            source: e,
        })?;
        self.ignore = Some(regex);
        Ok(self)
    }

    /// Sets whether test files are loaded.
    #[must_use]
    pub const fn with_tests(mut self, include: bool) -> Self {
        self.include_tests = include;
        self
    }

    /// Sets whether sources are syntax-checked.
    #[must_use]
    pub const fn with_syntax_check(mut self, check: bool) -> Self {
        self.syntax_check = check;
        self
    }

    /// Returns true if the path matches the ignore pattern.
    #[must_use]
    pub fn is_ignored(&self, path: &Path) -> bool {
        self.ignore
            .as_ref()
            .is_some_and(|re| re.is_match(&path.to_string_lossy()))
    }
}

/// Parsed modules indexed by `data.`-qualified package path.
#[derive(Debug, Default)]
pub struct ModuleSet {
    /// Modules ordered by file path.
    modules: Vec<RegoModule>,
    /// Package path to indices into `modules`.
    by_package: HashMap<String, Vec<usize>>,
}

impl ModuleSet {
    /// Builds an index over the given modules.
    #[must_use]
    pub fn from_modules(mut modules: Vec<RegoModule>) -> Self {
        modules.sort_by(|a, b| a.path.cmp(&b.path));

        let mut by_package: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, module) in modules.iter().enumerate() {
            by_package.entry(module.package_path()).or_default().push(idx);
        }

        Self {
            modules,
            by_package,
        }
    }

    /// Returns every module declaring the package path, in file order.
    #[must_use]
    pub fn get(&self, package_path: &str) -> Vec<&RegoModule> {
        self.by_package
            .get(package_path)
            .map(|indices| indices.iter().map(|&i| &self.modules[i]).collect())
            .unwrap_or_default()
    }

    /// Returns true if some module declares the package path.
    #[must_use]
    pub fn contains(&self, package_path: &str) -> bool {
        self.by_package.contains_key(package_path)
    }

    /// Iterates over all modules in file order.
    pub fn modules(&self) -> impl Iterator<Item = &RegoModule> {
        self.modules.iter()
    }

    /// Returns the number of modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns true if no modules were loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Loads Rego modules from a directory tree.
///
/// # Examples
///
/// ```rust,no_run
/// use kanon_compiler::{Loader, LoaderConfig};
///
/// let config = LoaderConfig::new().with_ignore_pattern("deprecated/").unwrap();
/// let modules = Loader::new(config).load_dir("policies").unwrap();
/// println!("Loaded {} modules", modules.len());
/// ```
#[derive(Debug, Default)]
pub struct Loader {
    config: LoaderConfig,
}

impl Loader {
    /// Creates a loader with the given configuration.
    #[must_use]
    pub const fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Returns the loader configuration.
    #[must_use]
    pub const fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Lists the policy files under `root`, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be walked.
    pub fn discover(&self, root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let root = root.as_ref();
        let mut files = Vec::new();

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_excluded(entry));

        for entry in walker {
            let entry = entry.map_err(|e| CompilerError::WalkError {
                path: root.to_path_buf(),
                source: e,
            })?;

            if entry.file_type().is_file() && self.is_policy_file(entry.path()) {
                files.push(entry.into_path());
            }
        }

        Ok(files)
    }

    /// Loads and parses every policy file under `root`.
    ///
    /// # Errors
    ///
    /// Returns the first read or parse error; no partial result is produced.
    #[instrument(skip(self), fields(root = %root.as_ref().display()))]
    pub fn load_dir(&self, root: impl AsRef<Path>) -> Result<ModuleSet> {
        let parser = Parser::new().with_syntax_check(self.config.syntax_check);

        let modules = self
            .discover(root)?
            .iter()
            .map(|path| parser.parse_file(path))
            .collect::<Result<Vec<_>>>()?;

        info!(modules = modules.len(), "Loaded rego modules");
        Ok(ModuleSet::from_modules(modules))
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return false;
        }
        if entry.file_type().is_dir() && entry.file_name() == VCS_DIR {
            return true;
        }
        let ignored = self.config.is_ignored(entry.path());
        if ignored {
            debug!(path = ?entry.path(), "Ignoring path");
        }
        ignored
    }

    fn is_policy_file(&self, path: &Path) -> bool {
        if !path
            .extension()
            .is_some_and(|ext| ext == self.config.extension.as_str())
        {
            return false;
        }
        if self.config.include_tests {
            return true;
        }
        !path
            .file_stem()
            .is_some_and(|stem| stem.to_string_lossy().ends_with("_test"))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn corpus() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "lib/core.rego", "package lib.core\n\nis_pod := true\n");
        write(dir.path(), "pod-limits/src.rego", "package pod_limits\n\nimport data.lib.core\n");
        write(dir.path(), "pod-limits/src_test.rego", "package pod_limits\n\ntest_x := true\n");
        write(dir.path(), "pod-limits/README.md", "# docs\n");
        write(dir.path(), ".git/hooks/bad.rego", "not rego\n");
        write(dir.path(), "deprecated/old.rego", "package old\n");
        dir
    }

    #[test]
    fn test_discover_skips_tests_vcs_and_other_files() {
        let dir = corpus();
        let files = Loader::default().discover(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();

        assert_eq!(names, vec!["deprecated/old.rego", "lib/core.rego", "pod-limits/src.rego"]);
    }

    #[test]
    fn test_discover_applies_ignore_pattern() {
        let dir = corpus();
        let config = LoaderConfig::new().with_ignore_pattern("deprecated").unwrap();
        let files = Loader::new(config).discover(dir.path()).unwrap();

        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| !p.to_string_lossy().contains("deprecated")));
    }

    #[test]
    fn test_discover_includes_tests_when_asked() {
        let dir = corpus();
        let files = Loader::new(LoaderConfig::new().with_tests(true))
            .discover(dir.path())
            .unwrap();
        assert_eq!(files.len(), 4);
    }

    #[test]
    fn test_invalid_ignore_pattern() {
        let result = LoaderConfig::new().with_ignore_pattern("(unclosed");
        assert!(matches!(result, Err(CompilerError::InvalidIgnorePattern { .. })));
    }

    #[test]
    fn test_load_dir_indexes_by_package() {
        let dir = corpus();
        let modules = Loader::default().load_dir(dir.path()).unwrap();

        assert_eq!(modules.len(), 3);
        assert!(modules.contains("data.lib.core"));
        assert_eq!(modules.get("data.pod_limits").len(), 1);
        assert!(modules.get("data.missing").is_empty());
    }

    #[test]
    fn test_load_dir_fails_on_invalid_file() {
        let dir = corpus();
        write(dir.path(), "broken/src.rego", "package broken\n\nviolation contains {{{\n");

        let result = Loader::default().load_dir(dir.path());
        assert!(matches!(result, Err(CompilerError::ParseError { .. })));
    }

    #[test]
    fn test_module_set_groups_split_packages() {
        let parser = Parser::new().with_syntax_check(false);
        let a = parser.parse_source("package lib.k8s\n\na := 1\n", "lib/a.rego").unwrap();
        let b = parser.parse_source("package lib.k8s\n\nb := 1\n", "lib/b.rego").unwrap();

        let set = ModuleSet::from_modules(vec![b, a]);
        let files: Vec<_> = set.get("data.lib.k8s").iter().map(|m| m.file_name()).collect();
        assert_eq!(files, vec!["lib/a.rego", "lib/b.rego"]);
    }
}
