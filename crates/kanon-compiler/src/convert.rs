//! Conversion of legacy header tags into a METADATA block.

use serde_json::{json, Map, Value};
use tracing::debug;

use kanon_core::policy::DEFAULT_ENFORCEMENT;

use crate::annotations::{HeaderAnnotations, LegacyAnnotations};
use crate::error::{AnnotationError, CompilerError, Result};
use crate::matchers;
use crate::parser::RegoModule;

/// Rewrites a module's legacy header as a METADATA block.
///
/// Returns `None` when the module already has a METADATA block or its
/// header carries nothing to convert. The header comments are dropped and
/// replaced by the block; the rest of the source is kept as is.
///
/// # Errors
///
/// Returns an error if the legacy tags are malformed.
pub fn convert_module(module: &RegoModule) -> Result<Option<String>> {
    let file = module.file_name();
    let header = module.header_comments();

    let legacy = match HeaderAnnotations::extract(&header)
        .map_err(|e| CompilerError::annotation(&file, e))?
    {
        HeaderAnnotations::Structured { .. } => {
            debug!(path = %file, "Already has METADATA, skipping");
            return Ok(None);
        }
        HeaderAnnotations::Legacy(legacy) => legacy,
    };

    if !legacy.has_tags() && legacy.description.is_empty() {
        return Ok(None);
    }

    let mut out = String::from("# METADATA\n");
    if let Some(title) = &legacy.title {
        append_commented_yaml(&mut out, &json!({ "title": title }))?;
    }
    if !legacy.description.is_empty() {
        append_commented_yaml(&mut out, &json!({ "description": legacy.description }))?;
    }
    let custom = custom_section(&legacy).map_err(|e| CompilerError::annotation(&file, e))?;
    if !custom.is_empty() {
        append_commented_yaml(&mut out, &json!({ "custom": custom }))?;
    }

    let body: Vec<&str> = module
        .source
        .lines()
        .skip(module.package_line.saturating_sub(1))
        .collect();
    out.push_str(&body.join("\n"));
    out.push('\n');

    debug!(path = %file, "Converted legacy annotations");
    Ok(Some(out))
}

fn custom_section(
    legacy: &LegacyAnnotations,
) -> std::result::Result<Map<String, Value>, AnnotationError> {
    let mut custom = Map::new();

    if let Some(enforcement) = &legacy.enforcement {
        if enforcement != DEFAULT_ENFORCEMENT {
            custom.insert("enforcement".to_string(), json!(enforcement));
        }
    }
    if legacy.skip_constraint {
        custom.insert("skipConstraint".to_string(), json!(true));
    }

    let (matchers, _) = matchers::merge(matchers::from_legacy(&legacy.matcher_tags)?, None);
    if let Some(spec) = matchers.to_spec() {
        custom.insert("matchers".to_string(), spec);
    }

    if !legacy.parameters.is_empty() {
        let parameters: Map<String, Value> = legacy
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.schema()))
            .collect();
        custom.insert("parameters".to_string(), Value::Object(parameters));
    }

    Ok(custom)
}

fn append_commented_yaml(out: &mut String, value: &Value) -> Result<()> {
    let yaml = serde_yaml::to_string(value)?;
    for line in yaml.lines() {
        if line.is_empty() {
            out.push_str("#\n");
        } else {
            out.push_str("# ");
            out.push_str(line);
            out.push('\n');
        }
    }
    Ok(())
}
