//! OPA METADATA annotation blocks.
//!
//! A package-scoped block is a `# METADATA` comment followed by contiguous
//! comment lines holding YAML:
//!
//! ```text
//! # METADATA
//! # title: Deny latest tag
//! # description: Images must be pinned.
//! # custom:
//! #   enforcement: dryrun
//! #   matchers:
//! #     kinds:
//! #     - apiGroups: [""]
//! #       kinds: ["Pod"]
//! package container_deny_latest
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::AnnotationError;
use crate::parser::Comment;

/// Marker comment opening a METADATA block.
pub const METADATA_MARKER: &str = "METADATA";

type Result<T> = std::result::Result<T, AnnotationError>;

/// Values read from a METADATA block. Matchers and parameters stay raw until
/// normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredAnnotations {
    /// `title`.
    pub title: Option<String>,
    /// `description`.
    pub description: Option<String>,
    /// `custom.enforcement`.
    pub enforcement: Option<String>,
    /// `custom.skipConstraint`.
    pub skip_constraint: bool,
    /// `custom.skipTemplate`.
    pub skip_template: bool,
    /// `custom.matchers`, unnormalized.
    pub matchers: Option<Value>,
    /// `custom.parameters`, unnormalized.
    pub parameters: Option<Value>,
    /// `custom.annotations`.
    pub annotations: BTreeMap<String, String>,
    /// `custom.labels`.
    pub labels: BTreeMap<String, String>,
}

impl StructuredAnnotations {
    /// Parses the comments of a METADATA block (marker excluded).
    ///
    /// # Errors
    ///
    /// Returns an error for invalid YAML or a reserved key of the wrong type.
    pub fn parse(block: &[Comment]) -> Result<Self> {
        let yaml = block
            .iter()
            .map(|c| c.text.strip_prefix(' ').unwrap_or(&c.text))
            .collect::<Vec<_>>()
            .join("\n");

        Self::from_yaml(&yaml)
    }

    /// Parses METADATA YAML.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid YAML or a reserved key of the wrong type.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let root: Value = if yaml.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            serde_yaml::from_str(yaml)?
        };
        let root = expect_object("METADATA", &root)?;

        let mut annotations = Self {
            title: optional(root, "title", "title", expect_str)?,
            description: optional(root, "description", "description", expect_str)?,
            ..Self::default()
        };

        let Some(custom) = root.get("custom") else {
            return Ok(annotations);
        };
        let custom = expect_object("custom", custom)?;

        annotations.enforcement = optional(custom, "enforcement", "enforcement", expect_str)?;
        annotations.skip_constraint =
            optional(custom, "skipConstraint", "skipConstraint", expect_bool)?.unwrap_or(false);
        annotations.skip_template =
            optional(custom, "skipTemplate", "skipTemplate", expect_bool)?.unwrap_or(false);
        annotations.annotations =
            optional(custom, "annotations", "annotations", expect_str_map)?.unwrap_or_default();
        annotations.labels = optional(custom, "labels", "labels", expect_str_map)?.unwrap_or_default();

        if let Some(matchers) = custom.get("matchers") {
            expect_object("matchers", matchers)?;
            annotations.matchers = Some(matchers.clone());
        }
        if let Some(parameters) = custom.get("parameters") {
            expect_object("parameters", parameters)?;
            annotations.parameters = Some(parameters.clone());
        }

        debug!(title = ?annotations.title, "Parsed METADATA block");
        Ok(annotations)
    }
}

/// Splits header comments into the METADATA block (marker excluded) and the
/// remaining comments.
///
/// The block runs from the marker through every directly following comment
/// line; the first gap in line numbers ends it.
#[must_use]
pub fn split_metadata_block(header: &[Comment]) -> (Option<Vec<Comment>>, Vec<Comment>) {
    let Some(start) = header
        .iter()
        .position(|c| c.text.trim() == METADATA_MARKER)
    else {
        return (None, header.to_vec());
    };

    let mut end = start + 1;
    while end < header.len() && header[end].line == header[end - 1].line + 1 {
        end += 1;
    }

    let block = header[start + 1..end].to_vec();
    let rest = header[..start]
        .iter()
        .chain(&header[end..])
        .cloned()
        .collect();

    (Some(block), rest)
}

/// Returns the JSON type name of a value.
pub(crate) const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn invalid(key: &str, expected: &'static str, value: &Value) -> AnnotationError {
    AnnotationError::InvalidType {
        key: key.to_string(),
        expected,
        actual: type_name(value),
    }
}

/// Reads an optional key with a typed accessor.
pub(crate) fn optional<T>(
    map: &Map<String, Value>,
    field: &str,
    key: &str,
    read: impl Fn(&str, &Value) -> Result<T>,
) -> Result<Option<T>> {
    map.get(field).map(|value| read(key, value)).transpose()
}

/// Reads a required key with a typed accessor.
pub(crate) fn required<T>(
    map: &Map<String, Value>,
    field: &str,
    key: &str,
    read: impl Fn(&str, &Value) -> Result<T>,
) -> Result<T> {
    optional(map, field, key, read)?.ok_or_else(|| AnnotationError::MissingKey {
        key: key.to_string(),
    })
}

pub(crate) fn expect_object<'a>(key: &str, value: &'a Value) -> Result<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| invalid(key, "an object", value))
}

pub(crate) fn expect_array<'a>(key: &str, value: &'a Value) -> Result<&'a Vec<Value>> {
    value.as_array().ok_or_else(|| invalid(key, "an array", value))
}

pub(crate) fn expect_str(key: &str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(key, "a string", value))
}

pub(crate) fn expect_bool(key: &str, value: &Value) -> Result<bool> {
    value.as_bool().ok_or_else(|| invalid(key, "a bool", value))
}

pub(crate) fn expect_str_list(key: &str, value: &Value) -> Result<Vec<String>> {
    expect_array(key, value)?
        .iter()
        .enumerate()
        .map(|(i, item)| expect_str(&format!("{key}[{i}]"), item))
        .collect()
}

pub(crate) fn expect_str_map(key: &str, value: &Value) -> Result<BTreeMap<String, String>> {
    expect_object(key, value)?
        .iter()
        .map(|(k, v)| Ok((k.clone(), expect_str(&format!("{key}.{k}"), v)?)))
        .collect()
}
