//! Parameter declaration and reference checking.
//!
//! Rule bodies reference parameters as `input.parameters.<name>` (or the
//! older `core.parameters.<name>`). Every referenced name must be declared,
//! otherwise the generated template would accept arbitrary input.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use kanon_core::Parameter;

use crate::annotations::structured::{expect_object, expect_str, optional, required};
use crate::error::{AnnotationError, CompilerError, Result};
use crate::parser::RegoModule;

/// Type assumed for a METADATA parameter without `type`.
pub const DEFAULT_PARAMETER_TYPE: &str = "object";

static PARAMETER_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:input|core)\.parameters\.([A-Za-z_][A-Za-z0-9_]*)")
        .expect("parameter reference regex")
});

/// Returns the parameter names referenced in `texts`, deduplicated in
/// first-seen order.
///
/// ```rust
/// use kanon_compiler::parameters::referenced_parameters;
///
/// let names = referenced_parameters(["x := input.parameters.b\ny := core.parameters.a + input.parameters.b"]);
/// assert_eq!(names, vec!["b", "a"]);
/// ```
pub fn referenced_parameters<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();

    for text in texts {
        for capture in PARAMETER_REF.captures_iter(text) {
            let name = &capture[1];
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }

    names
}

/// Checks that every parameter referenced by the module's rules is declared.
///
/// Returns the referenced names on success.
///
/// # Errors
///
/// Returns [`CompilerError::UndeclaredParameters`] listing every missing
/// name.
pub fn reconcile(module: &RegoModule, declared: &[Parameter]) -> Result<Vec<String>> {
    let referenced = referenced_parameters(module.rules.iter().map(|r| r.text.as_str()));

    let missing: Vec<String> = referenced
        .iter()
        .filter(|name| !declared.iter().any(|p| &p.name == *name))
        .cloned()
        .collect();

    if !missing.is_empty() {
        return Err(CompilerError::UndeclaredParameters {
            file: module.file_name(),
            names: missing,
        });
    }

    debug!(file = %module.file_name(), referenced = referenced.len(), "Parameters reconciled");
    Ok(referenced)
}

/// Reads the METADATA `custom.parameters` map (`name -> schema`).
///
/// Arrays take their item type from `items.type`; a schema without `type`
/// is an `object`. The raw schema is attached to each parameter.
///
/// # Errors
///
/// Returns an error for a non-object schema, a non-string type or
/// description, or an array without an item type.
pub fn from_structured(value: &Value) -> std::result::Result<Vec<Parameter>, AnnotationError> {
    expect_object("parameters", value)?
        .iter()
        .map(|(name, schema)| {
            let key = format!("parameters.{name}");
            let fields = expect_object(&key, schema)?;

            let ty = optional(fields, "type", &format!("{key}.type"), expect_str)?
                .unwrap_or_else(|| DEFAULT_PARAMETER_TYPE.to_string());

            let parameter = if ty == "array" {
                let items_key = format!("{key}.items");
                let items = required(fields, "items", &format!("{items_key}.type"), |k, v| {
                    expect_object(k, v).cloned()
                })?;
                let item_ty = required(&items, "type", &format!("{items_key}.type"), expect_str)?;
                Parameter::new(name, item_ty).array()
            } else {
                Parameter::new(name, ty)
            };

            let parameter = match optional(fields, "description", &format!("{key}.description"), expect_str)? {
                Some(description) => parameter.with_description(description),
                None => parameter,
            };

            Ok(parameter.with_schema(schema.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::parser::Parser;

    fn module(source: &str) -> RegoModule {
        Parser::new()
            .with_syntax_check(false)
            .parse_source(source, "policies/sample/src.rego")
            .unwrap()
    }

    #[test]
    fn test_references_are_deduplicated() {
        let names = referenced_parameters([
            "violation contains msg if { input.parameters.baz; input.parameters.baz }",
        ]);
        assert_eq!(names, vec!["baz"]);
    }

    #[test]
    fn test_reference_requires_identifier() {
        let names = referenced_parameters(["input.parameters[x]", "input.parameters.9bad", "xinput.parameters.ok"]);
        assert_eq!(names, vec!["ok"]);
    }

    #[test]
    fn test_reconcile_accepts_declared() {
        let m = module("package p\n\nviolation[msg] {\n  count(input.parameters.labels) > 0\n  msg := \"x\"\n}\n");
        let declared = vec![Parameter::new("labels", "string").array()];
        assert_eq!(reconcile(&m, &declared).unwrap(), vec!["labels"]);
    }

    #[test]
    fn test_reconcile_lists_every_missing_name() {
        let m = module(
            "package p\n\nviolation[msg] {\n  input.parameters.unknown\n  core.parameters.other\n  input.parameters.known\n  msg := \"x\"\n}\n",
        );
        let declared = vec![Parameter::new("known", "string")];

        match reconcile(&m, &declared) {
            Err(CompilerError::UndeclaredParameters { file, names }) => {
                assert_eq!(file, "policies/sample/src.rego");
                assert_eq!(names, vec!["unknown", "other"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_comment_lines_are_not_scanned() {
        let m = module("package p\n\nviolation[msg] {\n  # input.parameters.ghost\n  msg := \"x\"\n}\n");
        assert!(reconcile(&m, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_structured_parameters() {
        let value = json!({
            "repos": {
                "type": "array",
                "description": "Allowed registries",
                "items": { "type": "string" }
            },
            "max": { "type": "integer" },
            "config": { "properties": { "a": { "type": "string" } } }
        });

        let params = from_structured(&value).unwrap();
        let names: Vec<_> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["config", "max", "repos"]);

        assert_eq!(params[0].ty, DEFAULT_PARAMETER_TYPE);
        assert_eq!(params[2].ty, "string");
        assert!(params[2].is_array);
        assert_eq!(params[2].description.as_deref(), Some("Allowed registries"));
        assert_eq!(params[2].schema(), value["repos"]);
    }

    #[test]
    fn test_array_requires_item_type() {
        let err = from_structured(&json!({ "repos": { "type": "array" } })).unwrap_err();
        assert!(matches!(err, AnnotationError::MissingKey { ref key } if key == "parameters.repos.items.type"));
    }

    #[test]
    fn test_type_must_be_string() {
        let err = from_structured(&json!({ "max": { "type": 1 } })).unwrap_err();
        assert!(err.to_string().contains("parameters.max.type"));
    }
}
