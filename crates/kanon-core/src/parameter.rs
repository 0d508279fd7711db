//! Constraint parameters.
//!
//! A [`Parameter`] is a value a Constraint can pass into its template. Every
//! `input.parameters.<name>` reference in a policy must be backed by one.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A declared constraint parameter.
///
/// # Examples
///
/// ```rust
/// use kanon_core::Parameter;
///
/// let param = Parameter::new("labels", "string")
///     .array()
///     .with_description("Labels that must be present");
///
/// assert!(param.is_array);
/// assert_eq!(param.schema()["items"]["type"], "string");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    /// Parameter name as referenced under `input.parameters`.
    pub name: String,

    /// Primitive type name (item type for arrays).
    #[serde(rename = "type")]
    pub ty: String,

    /// Whether the parameter is a list of `ty`.
    #[serde(default)]
    pub is_array: bool,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Raw schema fragment, kept verbatim when declared through METADATA.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl Parameter {
    /// Creates a scalar parameter.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            is_array: false,
            description: None,
            schema: None,
        }
    }

    /// Marks the parameter as an array of its type.
    #[must_use]
    pub const fn array(mut self) -> Self {
        self.is_array = true;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attaches the raw schema fragment it was declared with.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Returns the OpenAPI v3 schema for this parameter.
    ///
    /// A raw schema takes precedence; otherwise one is synthesized from the
    /// type, array flag and description.
    #[must_use]
    pub fn schema(&self) -> Value {
        if let Some(schema) = &self.schema {
            return schema.clone();
        }

        let mut props = Map::new();
        if self.is_array {
            props.insert("type".to_string(), json!("array"));
            props.insert("items".to_string(), json!({ "type": self.ty }));
        } else {
            props.insert("type".to_string(), json!(self.ty));
        }
        if let Some(description) = &self.description {
            props.insert("description".to_string(), json!(description));
        }

        Value::Object(props)
    }
}
