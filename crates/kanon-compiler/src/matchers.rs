//! Matcher normalization.
//!
//! Legacy `@kinds`, `@matchlabels`, `@matchExpression`, `@namespaces` and
//! `@excludedNamespaces` tags and the METADATA `custom.matchers` object both
//! reduce to [`DeclaredMatchers`]. [`merge`] then resolves each category
//! independently into the canonical [`Matchers`], preferring METADATA.

use serde_json::Value;
use tracing::debug;

use kanon_core::{
    Advisory, AdvisoryKind, KindMatchers, MatchExpressionMatcher, MatchLabelsMatcher, Matchers,
};

use crate::annotations::structured::{
    expect_array, expect_object, expect_str, expect_str_list, expect_str_map, optional, required,
};
use crate::error::AnnotationError;

type Result<T> = std::result::Result<T, AnnotationError>;

/// Legacy tag: kind matchers.
pub const KINDS_TAG: &str = "@kinds";
/// Legacy tag: label equality matchers.
pub const MATCH_LABELS_TAG: &str = "@matchlabels";
/// Legacy tag: one label expression.
pub const MATCH_EXPRESSION_TAG: &str = "@matchExpression";
/// Legacy tag: namespace list.
pub const NAMESPACES_TAG: &str = "@namespaces";
/// Legacy tag: excluded namespace list.
pub const EXCLUDED_NAMESPACES_TAG: &str = "@excludedNamespaces";

/// Raw legacy matcher comment lines, trimmed, grouped by tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyMatcherTags {
    /// `@kinds` lines.
    pub kinds: Vec<String>,
    /// `@matchlabels` lines.
    pub match_labels: Vec<String>,
    /// `@matchExpression` lines.
    pub match_expressions: Vec<String>,
    /// `@namespaces` lines.
    pub namespaces: Vec<String>,
    /// `@excludedNamespaces` lines.
    pub excluded_namespaces: Vec<String>,
}

impl LegacyMatcherTags {
    /// Returns true if no matcher tag was seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
            && self.match_labels.is_empty()
            && self.match_expressions.is_empty()
            && self.namespaces.is_empty()
            && self.excluded_namespaces.is_empty()
    }

    /// Records a trimmed comment if it carries a matcher tag.
    ///
    /// Returns false when the comment is not a matcher tag.
    pub fn push(&mut self, comment: &str) -> bool {
        let slot = if has_tag(comment, KINDS_TAG) {
            &mut self.kinds
        } else if has_tag(comment, MATCH_LABELS_TAG) {
            &mut self.match_labels
        } else if has_tag(comment, MATCH_EXPRESSION_TAG) {
            &mut self.match_expressions
        } else if has_tag(comment, NAMESPACES_TAG) {
            &mut self.namespaces
        } else if has_tag(comment, EXCLUDED_NAMESPACES_TAG) {
            &mut self.excluded_namespaces
        } else {
            return false;
        };
        slot.push(comment.to_string());
        true
    }
}

/// Matchers from one annotation format. `None` means the category was not
/// declared at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredMatchers {
    /// Kind matchers.
    pub kinds: Option<KindMatchers>,
    /// Label equality matchers.
    pub match_labels: Option<MatchLabelsMatcher>,
    /// Label expressions.
    pub match_expressions: Option<Vec<MatchExpressionMatcher>>,
    /// Namespaces.
    pub namespaces: Option<Vec<String>>,
    /// Excluded namespaces.
    pub excluded_namespaces: Option<Vec<String>>,
}

/// Returns true if `comment` is `tag` alone or `tag` followed by whitespace.
pub(crate) fn has_tag(comment: &str, tag: &str) -> bool {
    strip_tag(comment, tag).is_some()
}

/// Returns the text after `tag`, if the comment starts with it.
pub(crate) fn strip_tag<'a>(comment: &'a str, tag: &str) -> Option<&'a str> {
    comment
        .strip_prefix(tag)
        .filter(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

/// Parses a `@kinds` comment into `(apiGroup, kind)` pairs.
///
/// # Errors
///
/// Returns [`AnnotationError::InvalidKind`] for a token that is not exactly
/// `<apiGroup>/<kind>`.
pub fn parse_kinds(comment: &str) -> Result<Vec<(String, String)>> {
    let rest = strip_tag(comment, KINDS_TAG).unwrap_or(comment);

    rest.split_whitespace()
        .map(|token| match token.split('/').collect::<Vec<_>>().as_slice() {
            [group, kind] if !kind.is_empty() => Ok(((*group).to_string(), (*kind).to_string())),
            _ => Err(AnnotationError::InvalidKind {
                token: token.to_string(),
            }),
        })
        .collect()
}

/// Parses a `@matchlabels` comment.
///
/// # Errors
///
/// Returns [`AnnotationError::InvalidMatchLabel`] for a token without exactly
/// one `=`.
pub fn parse_match_labels(comment: &str) -> Result<MatchLabelsMatcher> {
    let rest = strip_tag(comment, MATCH_LABELS_TAG).unwrap_or(comment);

    rest.split_whitespace()
        .map(|token| match token.split_once('=') {
            Some((key, value)) if !value.contains('=') => Ok((key.to_string(), value.to_string())),
            _ => Err(AnnotationError::InvalidMatchLabel {
                token: token.to_string(),
            }),
        })
        .collect()
}

/// Parses a `@matchExpression <key> <operator> [v1,v2,...]` comment.
///
/// # Errors
///
/// Returns [`AnnotationError::InvalidMatchExpression`] unless there are two
/// or three segments.
pub fn parse_match_expression(comment: &str) -> Result<MatchExpressionMatcher> {
    let rest = strip_tag(comment, MATCH_EXPRESSION_TAG).unwrap_or(comment);
    let segments: Vec<&str> = rest.split_whitespace().collect();

    match segments.as_slice() {
        [key, operator] => Ok(MatchExpressionMatcher {
            key: (*key).to_string(),
            operator: (*operator).to_string(),
            values: Vec::new(),
        }),
        [key, operator, values] => Ok(MatchExpressionMatcher {
            key: (*key).to_string(),
            operator: (*operator).to_string(),
            values: values
                .split(',')
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect(),
        }),
        _ => Err(AnnotationError::InvalidMatchExpression {
            segments: segments.len(),
            comment: comment.to_string(),
        }),
    }
}

/// Parses a whitespace-separated list after `tag`.
///
/// # Errors
///
/// Returns [`AnnotationError::EmptyList`] when no value follows the tag.
pub fn parse_string_list(tag: &str, comment: &str) -> Result<Vec<String>> {
    let rest = strip_tag(comment, tag).unwrap_or(comment);
    let values: Vec<String> = rest.split_whitespace().map(str::to_string).collect();

    if values.is_empty() {
        return Err(AnnotationError::EmptyList {
            tag: tag.to_string(),
        });
    }
    Ok(values)
}

/// Normalizes legacy matcher tags.
///
/// Repeated tags accumulate; a category is declared if its tag appears at
/// least once.
///
/// # Errors
///
/// Returns the first malformed tag.
pub fn from_legacy(tags: &LegacyMatcherTags) -> Result<DeclaredMatchers> {
    let kinds = if tags.kinds.is_empty() {
        None
    } else {
        let mut pairs = Vec::new();
        for comment in &tags.kinds {
            pairs.extend(parse_kinds(comment)?);
        }
        Some(KindMatchers::from_pairs(pairs))
    };

    let match_labels = if tags.match_labels.is_empty() {
        None
    } else {
        let mut labels = MatchLabelsMatcher::new();
        for comment in &tags.match_labels {
            labels.extend(parse_match_labels(comment)?);
        }
        Some(labels)
    };

    let match_expressions = if tags.match_expressions.is_empty() {
        None
    } else {
        Some(
            tags.match_expressions
                .iter()
                .map(|c| parse_match_expression(c))
                .collect::<Result<Vec<_>>>()?,
        )
    };

    Ok(DeclaredMatchers {
        kinds,
        match_labels,
        match_expressions,
        namespaces: list_tags(NAMESPACES_TAG, &tags.namespaces)?,
        excluded_namespaces: list_tags(EXCLUDED_NAMESPACES_TAG, &tags.excluded_namespaces)?,
    })
}

fn list_tags(tag: &str, comments: &[String]) -> Result<Option<Vec<String>>> {
    if comments.is_empty() {
        return Ok(None);
    }
    let mut values = Vec::new();
    for comment in comments {
        values.extend(parse_string_list(tag, comment)?);
    }
    Ok(Some(values))
}

/// Normalizes a METADATA `custom.matchers` object.
///
/// Unknown keys are ignored and reported as advisories.
///
/// # Errors
///
/// Returns an error for a key of the wrong type or a missing required key.
pub fn from_structured(value: &Value) -> Result<(DeclaredMatchers, Vec<Advisory>)> {
    let map = expect_object("matchers", value)?;
    let mut declared = DeclaredMatchers::default();
    let mut advisories = Vec::new();

    for (key, value) in map {
        match key.as_str() {
            "kinds" => declared.kinds = Some(structured_kinds(value)?),
            "labelSelector" => {
                let selector = expect_object("matchers.labelSelector", value)?;
                for (key, value) in selector {
                    match key.as_str() {
                        "matchLabels" => {
                            declared.match_labels = Some(expect_str_map(
                                "matchers.labelSelector.matchLabels",
                                value,
                            )?);
                        }
                        "matchExpressions" => {
                            declared.match_expressions = Some(structured_expressions(value)?);
                        }
                        other => advisories.push(unsupported(&format!("labelSelector.{other}"))),
                    }
                }
            }
            "namespaces" => {
                declared.namespaces = Some(expect_str_list("matchers.namespaces", value)?);
            }
            "excludedNamespaces" => {
                declared.excluded_namespaces =
                    Some(expect_str_list("matchers.excludedNamespaces", value)?);
            }
            other => advisories.push(unsupported(other)),
        }
    }

    Ok((declared, advisories))
}

fn unsupported(key: &str) -> Advisory {
    Advisory::new(
        AdvisoryKind::UnsupportedKey,
        format!("Ignoring unsupported matcher `{key}` in OPA Metadata."),
    )
}

fn structured_kinds(value: &Value) -> Result<KindMatchers> {
    let mut pairs = Vec::new();

    for (i, entry) in expect_array("matchers.kinds", value)?.iter().enumerate() {
        let prefix = format!("matchers.kinds[{i}]");
        let entry = expect_object(&prefix, entry)?;
        let groups = required(entry, "apiGroups", &format!("{prefix}.apiGroups"), expect_str_list)?;
        let kinds = required(entry, "kinds", &format!("{prefix}.kinds"), expect_str_list)?;

        for group in &groups {
            for kind in &kinds {
                pairs.push((group.clone(), kind.clone()));
            }
        }
    }

    Ok(KindMatchers::from_pairs(pairs))
}

fn structured_expressions(value: &Value) -> Result<Vec<MatchExpressionMatcher>> {
    expect_array("matchers.labelSelector.matchExpressions", value)?
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let prefix = format!("matchers.labelSelector.matchExpressions[{i}]");
            let entry = expect_object(&prefix, entry)?;
            Ok(MatchExpressionMatcher {
                key: required(entry, "key", &format!("{prefix}.key"), expect_str)?,
                operator: required(entry, "operator", &format!("{prefix}.operator"), expect_str)?,
                values: optional(entry, "values", &format!("{prefix}.values"), expect_str_list)?
                    .unwrap_or_default(),
            })
        })
        .collect()
}

/// Resolves each matcher category, preferring METADATA over legacy tags.
///
/// A category declared both ways yields a precedence advisory; one declared
/// only through legacy tags yields a migration advisory.
#[must_use]
pub fn merge(
    legacy: DeclaredMatchers,
    structured: Option<DeclaredMatchers>,
) -> (Matchers, Vec<Advisory>) {
    let structured = structured.unwrap_or_default();
    let mut advisories = Vec::new();

    let matchers = Matchers {
        kind_matchers: pick("Kind", legacy.kinds, structured.kinds, &mut advisories),
        match_labels: pick(
            "Match labels",
            legacy.match_labels,
            structured.match_labels,
            &mut advisories,
        ),
        match_expressions: pick(
            "Match expressions",
            legacy.match_expressions,
            structured.match_expressions,
            &mut advisories,
        ),
        namespaces: pick(
            "Namespace",
            legacy.namespaces,
            structured.namespaces,
            &mut advisories,
        ),
        excluded_namespaces: pick(
            "Excluded namespace",
            legacy.excluded_namespaces,
            structured.excluded_namespaces,
            &mut advisories,
        ),
    };

    debug!(advisories = advisories.len(), "Merged matchers");
    (matchers, advisories)
}

fn pick<T: Default>(
    category: &str,
    legacy: Option<T>,
    structured: Option<T>,
    advisories: &mut Vec<Advisory>,
) -> T {
    match (legacy, structured) {
        (Some(_), Some(structured)) => {
            advisories.push(Advisory::new(
                AdvisoryKind::PrecedenceConflict,
                format!(
                    "{category} matchers set with legacy annotations are overridden by OPA Metadata."
                ),
            ));
            structured
        }
        (None, Some(structured)) => structured,
        (Some(legacy), None) => {
            advisories.push(legacy_advisory(&format!("{category} matchers")));
            legacy
        }
        (None, None) => T::default(),
    }
}

/// Builds the deprecation advisory for a legacy annotation.
pub(crate) fn legacy_advisory(what: &str) -> Advisory {
    Advisory::new(
        AdvisoryKind::LegacyAnnotation,
        format!(
            "{what} are set with legacy annotations, this functionality will be removed in a future release. Please migrate to OPA Metadata annotations."
        ),
    )
}
