//! Canonical constraint matchers.
//!
//! Both annotation formats normalize into [`Matchers`]. Kind matchers are
//! grouped by API group and sorted so generated manifests are stable across
//! runs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// API group name used in annotations for the Kubernetes core group.
pub const CORE_API_GROUP: &str = "core";

/// Kinds selected within a single API group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindMatcher {
    /// API group, with the core group represented as the empty string.
    pub api_group: String,
    /// Kinds in this group, sorted.
    pub kinds: Vec<String>,
}

/// Kind matchers grouped by API group.
///
/// # Examples
///
/// ```rust
/// use kanon_core::KindMatchers;
///
/// let kinds = KindMatchers::from_pairs([
///     ("apps", "StatefulSet"),
///     ("core", "Pod"),
///     ("apps", "Deployment"),
/// ]);
///
/// let groups: Vec<_> = kinds.iter().map(|m| m.api_group.as_str()).collect();
/// assert_eq!(groups, vec!["", "apps"]);
/// assert_eq!(kinds.iter().nth(1).unwrap().kinds, vec!["Deployment", "StatefulSet"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KindMatchers(Vec<KindMatcher>);

impl KindMatchers {
    /// Groups `(apiGroup, kind)` pairs.
    ///
    /// `core` becomes the empty group, kinds are deduplicated
    /// case-insensitively (first spelling wins), groups and kinds are sorted
    /// lexicographically.
    pub fn from_pairs<I, G, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (G, K)>,
        G: Into<String>,
        K: Into<String>,
    {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (group, kind) in pairs {
            let mut group = group.into();
            if group == CORE_API_GROUP {
                group.clear();
            }
            let kind = kind.into();

            let kinds = groups.entry(group).or_default();
            if !kinds.iter().any(|k| k.eq_ignore_ascii_case(&kind)) {
                kinds.push(kind);
            }
        }

        Self(
            groups
                .into_iter()
                .map(|(api_group, mut kinds)| {
                    kinds.sort();
                    KindMatcher { api_group, kinds }
                })
                .collect(),
        )
    }

    /// Returns true if no kinds are selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the groups in order.
    pub fn iter(&self) -> impl Iterator<Item = &KindMatcher> {
        self.0.iter()
    }

    /// Returns the Gatekeeper `spec.match.kinds` representation.
    #[must_use]
    pub fn to_spec(&self) -> Value {
        Value::Array(
            self.0
                .iter()
                .map(|m| json!({ "apiGroups": [m.api_group], "kinds": m.kinds }))
                .collect(),
        )
    }
}

impl fmt::Display for KindMatchers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for matcher in &self.0 {
            let group = if matcher.api_group.is_empty() {
                CORE_API_GROUP
            } else {
                matcher.api_group.as_str()
            };
            for kind in &matcher.kinds {
                if !first {
                    f.write_str(" ")?;
                }
                write!(f, "{group}/{kind}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Label equality selector (`labelSelector.matchLabels`).
pub type MatchLabelsMatcher = BTreeMap<String, String>;

/// A single `labelSelector.matchExpressions` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchExpressionMatcher {
    /// Label key.
    pub key: String,
    /// Selector operator (`In`, `NotIn`, `Exists`, `DoesNotExist`).
    pub operator: String,
    /// Values for set-based operators.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// All matchers that scope a constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Matchers {
    /// Kinds the constraint applies to.
    #[serde(default, skip_serializing_if = "KindMatchers::is_empty")]
    pub kind_matchers: KindMatchers,

    /// Label equality selector.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: MatchLabelsMatcher,

    /// Set-based label selector.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<MatchExpressionMatcher>,

    /// Namespaces the constraint is limited to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,

    /// Namespaces the constraint ignores.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_namespaces: Vec<String>,
}

impl Matchers {
    /// Returns true if no matcher category is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kind_matchers.is_empty()
            && self.match_labels.is_empty()
            && self.match_expressions.is_empty()
            && self.namespaces.is_empty()
            && self.excluded_namespaces.is_empty()
    }

    /// Returns the Gatekeeper `spec.match` object, or `None` when empty.
    #[must_use]
    pub fn to_spec(&self) -> Option<Value> {
        if self.is_empty() {
            return None;
        }

        let mut spec = Map::new();
        if !self.kind_matchers.is_empty() {
            spec.insert("kinds".to_string(), self.kind_matchers.to_spec());
        }

        let mut selector = Map::new();
        if !self.match_labels.is_empty() {
            selector.insert("matchLabels".to_string(), json!(self.match_labels));
        }
        if !self.match_expressions.is_empty() {
            selector.insert(
                "matchExpressions".to_string(),
                json!(self.match_expressions),
            );
        }
        if !selector.is_empty() {
            spec.insert("labelSelector".to_string(), Value::Object(selector));
        }

        if !self.namespaces.is_empty() {
            spec.insert("namespaces".to_string(), json!(self.namespaces));
        }
        if !self.excluded_namespaces.is_empty() {
            spec.insert(
                "excludedNamespaces".to_string(),
                json!(self.excluded_namespaces),
            );
        }

        Some(Value::Object(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_grouping_is_sorted() {
        let kinds = KindMatchers::from_pairs([
            ("core", "Pod"),
            ("apps", "StatefulSet"),
            ("apps", "Deployment"),
        ]);

        assert_eq!(
            kinds,
            KindMatchers(vec![
                KindMatcher {
                    api_group: String::new(),
                    kinds: vec!["Pod".to_string()],
                },
                KindMatcher {
                    api_group: "apps".to_string(),
                    kinds: vec!["Deployment".to_string(), "StatefulSet".to_string()],
                },
            ])
        );
    }

    #[test]
    fn test_kind_dedup_is_case_insensitive() {
        let kinds = KindMatchers::from_pairs([("apps", "Deployment"), ("apps", "deployment")]);
        assert_eq!(kinds.iter().next().unwrap().kinds, vec!["Deployment"]);
    }

    #[test]
    fn test_empty_group_and_core_merge() {
        let kinds = KindMatchers::from_pairs([("", "Service"), ("core", "Pod")]);
        let groups: Vec<_> = kinds.iter().collect();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].kinds, vec!["Pod", "Service"]);
    }

    #[test]
    fn test_kind_display() {
        let kinds = KindMatchers::from_pairs([("core", "Pod"), ("apps", "Deployment")]);
        assert_eq!(kinds.to_string(), "core/Pod apps/Deployment");
    }

    #[test]
    fn test_empty_matchers_have_no_spec() {
        assert!(Matchers::default().to_spec().is_none());
    }

    #[test]
    fn test_matchers_spec() {
        let matchers = Matchers {
            kind_matchers: KindMatchers::from_pairs([("core", "Pod")]),
            match_labels: BTreeMap::from([("team".to_string(), "a".to_string())]),
            match_expressions: vec![MatchExpressionMatcher {
                key: "env".to_string(),
                operator: "Exists".to_string(),
                values: Vec::new(),
            }],
            namespaces: Vec::new(),
            excluded_namespaces: vec!["kube-system".to_string()],
        };

        let spec = matchers.to_spec().unwrap();
        assert_eq!(
            spec,
            json!({
                "kinds": [{ "apiGroups": [""], "kinds": ["Pod"] }],
                "labelSelector": {
                    "matchLabels": { "team": "a" },
                    "matchExpressions": [{ "key": "env", "operator": "Exists" }]
                },
                "excludedNamespaces": ["kube-system"]
            })
        );
    }
}
