//! Property-based tests for kanon-core types.
//!
//! These tests use proptest to verify invariants across many randomly generated inputs.

use proptest::prelude::*;

use crate::{KindMatchers, Parameter};

/// Strategy for generating API groups, including the core alias.
fn api_group_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("core".to_string()),
        Just(String::new()),
        Just("apps".to_string()),
        Just("batch".to_string()),
        Just("networking.k8s.io".to_string()),
        Just("policy".to_string()),
    ]
}

/// Strategy for generating kinds.
fn kind_strategy() -> impl Strategy<Value = String> {
    "(Pod|Deployment|StatefulSet|DaemonSet|Job|CronJob|Ingress|Service)"
}

fn pairs_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec((api_group_strategy(), kind_strategy()), 0..20)
}

proptest! {
    /// Groups and kinds come out sorted regardless of input order.
    #[test]
    fn kind_matchers_are_sorted(pairs in pairs_strategy()) {
        let kinds = KindMatchers::from_pairs(pairs);
        let groups: Vec<_> = kinds.iter().map(|m| m.api_group.clone()).collect();

        let mut sorted = groups.clone();
        sorted.sort();
        prop_assert_eq!(&groups, &sorted);

        for matcher in kinds.iter() {
            let mut sorted_kinds = matcher.kinds.clone();
            sorted_kinds.sort();
            prop_assert_eq!(&matcher.kinds, &sorted_kinds);
        }
    }

    /// The core alias never survives normalization.
    #[test]
    fn core_group_is_normalized(pairs in pairs_strategy()) {
        let kinds = KindMatchers::from_pairs(pairs);
        prop_assert!(kinds.iter().all(|m| m.api_group != "core"));
    }

    /// Grouping is insensitive to input order.
    #[test]
    fn kind_grouping_is_order_independent(pairs in pairs_strategy()) {
        let forward = KindMatchers::from_pairs(pairs.clone());
        let backward = KindMatchers::from_pairs(pairs.into_iter().rev());
        prop_assert_eq!(forward, backward);
    }

    /// No kind appears twice within a group.
    #[test]
    fn kinds_are_unique_per_group(pairs in pairs_strategy()) {
        let kinds = KindMatchers::from_pairs(pairs);
        for matcher in kinds.iter() {
            let mut deduped = matcher.kinds.clone();
            deduped.dedup();
            prop_assert_eq!(deduped.len(), matcher.kinds.len());
        }
    }

    /// Parameter JSON survives a round trip.
    #[test]
    fn parameter_serialization_roundtrip(
        name in "[a-z][a-zA-Z0-9_]{0,20}",
        ty in "(string|integer|boolean|number)",
        is_array in any::<bool>(),
    ) {
        let mut param = Parameter::new(name, ty);
        if is_array {
            param = param.array();
        }

        let json = serde_json::to_string(&param).unwrap();
        let back: Parameter = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(param, back);
    }
}
