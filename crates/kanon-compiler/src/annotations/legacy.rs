//! Legacy `@tag` header annotations.
//!
//! ```text
//! # @title Required labels
//! # Every namespace needs an owner.
//! # @enforcement dryrun
//! # @kinds core/Namespace
//! # @parameter labels array string -- labels that must be set
//! # -- on every namespace
//! package required_labels
//! ```
//!
//! Untagged comments form the description. Lines inside a fenced code block
//! are kept verbatim, other free text is trimmed.

use kanon_core::Parameter;

use crate::error::AnnotationError;
use crate::matchers::{strip_tag, LegacyMatcherTags};
use crate::parser::Comment;

/// `@title <text>`.
pub const TITLE_TAG: &str = "@title";
/// `@description <text>`, same as free text.
pub const DESCRIPTION_TAG: &str = "@description";
/// `@enforcement <action>`.
pub const ENFORCEMENT_TAG: &str = "@enforcement";
/// `@skip-constraint`.
pub const SKIP_CONSTRAINT_TAG: &str = "@skip-constraint";
/// `@parameter <name> [array] <type> [-- description]`.
pub const PARAMETER_TAG: &str = "@parameter";

const CODE_FENCE: &str = "```";
const CONTINUATION: &str = "--";

/// Annotations read from legacy tags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyAnnotations {
    /// `@title`.
    pub title: Option<String>,
    /// Free text and `@description` lines.
    pub description: String,
    /// `@enforcement`.
    pub enforcement: Option<String>,
    /// `@skip-constraint`.
    pub skip_constraint: bool,
    /// Matcher tag lines, unparsed.
    pub matcher_tags: LegacyMatcherTags,
    /// `@parameter` declarations in order.
    pub parameters: Vec<Parameter>,
}

impl LegacyAnnotations {
    /// Parses header comments top to bottom.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotationError::InvalidParameter`] for a malformed
    /// `@parameter` line.
    pub fn parse(comments: &[Comment]) -> Result<Self, AnnotationError> {
        let mut annotations = Self::default();
        let mut description: Vec<String> = Vec::new();
        let mut in_code_block = false;
        let mut continues: Option<usize> = None;

        for comment in comments {
            let text = comment.text.as_str();
            let trimmed = text.trim();

            if trimmed.starts_with(CODE_FENCE) {
                in_code_block = !in_code_block;
                continues = None;
                description.push(verbatim(text).to_string());
                continue;
            }
            if in_code_block {
                description.push(verbatim(text).to_string());
                continue;
            }

            if let Some(idx) = continues {
                if let Some(rest) = trimmed.strip_prefix(CONTINUATION) {
                    append_description(&mut annotations.parameters[idx], rest.trim());
                    continue;
                }
                continues = None;
            }

            if let Some(rest) = strip_tag(trimmed, TITLE_TAG) {
                annotations.title = Some(rest.trim().to_string());
            } else if let Some(rest) = strip_tag(trimmed, ENFORCEMENT_TAG) {
                annotations.enforcement = Some(rest.trim().to_string());
            } else if strip_tag(trimmed, SKIP_CONSTRAINT_TAG).is_some() {
                annotations.skip_constraint = true;
            } else if let Some(rest) = strip_tag(trimmed, PARAMETER_TAG) {
                annotations.parameters.push(parse_parameter(rest, trimmed)?);
                continues = Some(annotations.parameters.len() - 1);
            } else if let Some(rest) = strip_tag(trimmed, DESCRIPTION_TAG) {
                description.push(rest.trim().to_string());
            } else if !annotations.matcher_tags.push(trimmed) {
                description.push(trimmed.to_string());
            }
        }

        annotations.description = description.join("\n").trim().to_string();
        Ok(annotations)
    }

    /// Returns true if any tag was used. Free text alone does not count.
    #[must_use]
    pub fn has_tags(&self) -> bool {
        self.title.is_some()
            || self.enforcement.is_some()
            || self.skip_constraint
            || !self.matcher_tags.is_empty()
            || !self.parameters.is_empty()
    }
}

/// Drops the single space conventionally written after `#`.
fn verbatim(text: &str) -> &str {
    text.strip_prefix(' ').unwrap_or(text)
}

fn append_description(parameter: &mut Parameter, text: &str) {
    if text.is_empty() {
        return;
    }
    match &mut parameter.description {
        Some(existing) if !existing.is_empty() => {
            existing.push(' ');
            existing.push_str(text);
        }
        _ => parameter.description = Some(text.to_string()),
    }
}

fn parse_parameter(rest: &str, comment: &str) -> Result<Parameter, AnnotationError> {
    let (spec, description) = match rest.split_once(CONTINUATION) {
        Some((spec, description)) => (spec, description.trim()),
        None => (rest, ""),
    };

    let tokens: Vec<&str> = spec.split_whitespace().collect();
    let parameter = match tokens.as_slice() {
        [name, "array", ty] => Parameter::new(*name, *ty).array(),
        [name, ty] if *ty != "array" => Parameter::new(*name, *ty),
        _ => {
            return Err(AnnotationError::InvalidParameter {
                comment: comment.to_string(),
            })
        }
    };

    Ok(if description.is_empty() {
        parameter
    } else {
        parameter.with_description(description)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(lines: &[&str]) -> LegacyAnnotations {
        let comments: Vec<_> = lines
            .iter()
            .enumerate()
            .map(|(i, text)| Comment {
                line: i + 1,
                text: (*text).to_string(),
            })
            .collect();
        LegacyAnnotations::parse(&comments).unwrap()
    }

    #[test]
    fn test_title_enforcement_and_skip() {
        let annotations = parse(&[
            " @title  Images must be pinned ",
            " @enforcement dryrun",
            " @skip-constraint",
        ]);

        assert_eq!(annotations.title.as_deref(), Some("Images must be pinned"));
        assert_eq!(annotations.enforcement.as_deref(), Some("dryrun"));
        assert!(annotations.skip_constraint);
        assert!(annotations.has_tags());
    }

    #[test]
    fn test_free_text_becomes_description() {
        let annotations = parse(&[
            " @title X",
            "   First line.  ",
            " @description Second line.",
            " @kinds core/Pod",
        ]);

        assert_eq!(annotations.description, "First line.\nSecond line.");
        assert_eq!(annotations.matcher_tags.kinds, vec!["@kinds core/Pod"]);
    }

    #[test]
    fn test_code_block_is_verbatim() {
        let annotations = parse(&[
            " Example:",
            " ```yaml",
            " spec:",
            "   replicas: 1",
            " ```",
            " @kinds core/Pod",
        ]);

        assert_eq!(
            annotations.description,
            "Example:\n```yaml\nspec:\n  replicas: 1\n```"
        );
    }

    #[test]
    fn test_tags_inside_code_block_are_text() {
        let annotations = parse(&[" ```", " @title not a title", " ```"]);
        assert!(annotations.title.is_none());
        assert!(annotations.description.contains("@title not a title"));
    }

    #[test]
    fn test_parameter_with_continuation() {
        let annotations = parse(&[
            " @parameter labels array string -- labels that",
            " -- must be set",
            " --   on namespaces",
            " trailing text",
        ]);

        let param = &annotations.parameters[0];
        assert_eq!(param.name, "labels");
        assert_eq!(param.ty, "string");
        assert!(param.is_array);
        assert_eq!(
            param.description.as_deref(),
            Some("labels that must be set on namespaces")
        );
        assert_eq!(annotations.description, "trailing text");
    }

    #[test]
    fn test_continuation_starts_description() {
        let annotations = parse(&[" @parameter max integer", " -- upper bound"]);
        assert_eq!(annotations.parameters[0].description.as_deref(), Some("upper bound"));
        assert!(!annotations.parameters[0].is_array);
    }

    #[test]
    fn test_invalid_parameter() {
        for line in [" @parameter", " @parameter name", " @parameter a array", " @parameter a b c d"] {
            let comments = vec![Comment {
                line: 1,
                text: line.to_string(),
            }];
            assert!(
                matches!(
                    LegacyAnnotations::parse(&comments),
                    Err(AnnotationError::InvalidParameter { .. })
                ),
                "{line}"
            );
        }
    }

    #[test]
    fn test_description_only_has_no_tags() {
        let annotations = parse(&[" Just a comment"]);
        assert!(!annotations.has_tags());
        assert_eq!(annotations.description, "Just a comment");
    }
}
