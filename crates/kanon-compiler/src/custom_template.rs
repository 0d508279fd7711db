//! User-supplied manifest templates.
//!
//! A custom template replaces the built-in ConstraintTemplate or Constraint
//! object. Templates use Jinja syntax and are rendered against the policy
//! record, see [`crate::manifest::ManifestBuilder::context`] for the
//! available values.

use std::fs;
use std::path::{Path, PathBuf};

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use tracing::debug;

use crate::error::{CompilerError, Result};

/// A manifest template read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomTemplate {
    path: PathBuf,
    source: String,
}

impl CustomTemplate {
    /// Creates a template from its source. `path` is only used in messages.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Reads a template file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|e| CompilerError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self::new(path, source))
    }

    /// Returns the template path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Renders the template. Undefined values are errors.
    ///
    /// # Errors
    ///
    /// Returns [`CompilerError::RenderError`] if the template does not parse
    /// or refers to a value the context lacks.
    pub fn render<S: Serialize>(&self, context: S) -> Result<String> {
        let name = self.path.display().to_string();

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);

        let rendered = env
            .render_named_str(&name, &self.source, context)
            .map_err(|e| CompilerError::RenderError {
                what: format!("custom template {name}"),
                message: e.to_string(),
            })?;

        debug!(template = %name, "Rendered custom template");
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_render() {
        let template = CustomTemplate::new(
            "constraint.tpl",
            "kind: {{ kind }}\nmetadata:\n  name: {{ name }}\n",
        );
        let rendered = template
            .render(json!({ "kind": "PodLimits", "name": "podlimits" }))
            .unwrap();

        assert_eq!(rendered, "kind: PodLimits\nmetadata:\n  name: podlimits\n");
    }

    #[test]
    fn test_undefined_value_is_error() {
        let template = CustomTemplate::new("t.tpl", "{{ missing.field }}");
        let err = template.render(json!({ "kind": "X" })).unwrap_err();
        assert!(err.to_string().contains("t.tpl"));
    }

    #[test]
    fn test_syntax_error() {
        let template = CustomTemplate::new("t.tpl", "{% for %}");
        assert!(matches!(
            template.render(json!({})),
            Err(CompilerError::RenderError { .. })
        ));
    }

    #[test]
    fn test_from_missing_file() {
        assert!(matches!(
            CustomTemplate::from_file("/nonexistent/template.tpl"),
            Err(CompilerError::FileReadError { .. })
        ));
    }
}
