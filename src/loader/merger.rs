// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Policy merger.
//!
//! Inputs are applied from least to most strict, where strictness is the
//! highest rule priority in a policy (a policy without rules is weakest).
//! A stricter policy's rule replaces a laxer one with the same id; ties keep
//! input order, so the later input wins. `defaults`, `metadata` and
//! `environments` are merged shallowly in the same order. `cacheConfig` comes
//! from the least strict input only.

use serde_json::Map;
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::engine_core::errors::PolicyError;
use crate::engine_core::models::{Policy, Rule};

pub fn merge<P: Borrow<Policy>>(policies: &[P]) -> Result<Policy, PolicyError> {
    let mut ordered: Vec<&Policy> = policies.iter().map(Borrow::borrow).collect();
    // Stable: equal strictness keeps input order
    ordered.sort_by_key(|p| p.strictness());

    let (Some(least_strict), Some(most_strict)) = (ordered.first(), ordered.last()) else {
        return Err(PolicyError::NothingToMerge);
    };
    if ordered.len() == 1 {
        let mut single = (*least_strict).clone();
        single.sort_rules();
        return Ok(single);
    }

    let mut rules: Vec<Rule> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut defaults = Map::new();
    let mut metadata: Option<Map<String, _>> = None;
    let mut environments = BTreeMap::new();

    for policy in &ordered {
        for rule in &policy.rules {
            match slots.get(&rule.id) {
                Some(&slot) => {
                    debug!(rule_id = %rule.id, priority = rule.priority, "Rule overridden by stricter policy");
                    rules[slot] = rule.clone();
                }
                None => {
                    slots.insert(rule.id.clone(), rules.len());
                    rules.push(rule.clone());
                }
            }
        }
        defaults.extend(policy.defaults.clone());
        if let Some(meta) = &policy.metadata {
            metadata.get_or_insert_with(Map::new).extend(meta.clone());
        }
        environments.extend(policy.environments.clone());
    }

    let mut merged = Policy {
        version: most_strict.version.clone(),
        metadata,
        defaults,
        rules,
        environments,
        cache: least_strict.cache.clone(),
    };
    merged.sort_rules();
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_core::models::{ActionValue, CacheConfig};
    use serde_json::json;

    fn ids(policy: &Policy) -> Vec<&str> {
        policy.rules.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let none: Vec<Policy> = Vec::new();
        assert!(matches!(merge(&none), Err(PolicyError::NothingToMerge)));
    }

    #[test]
    fn test_single_input_is_resorted_passthrough() {
        let mut policy = Policy::new("1")
            .with_rule(Rule::new("low", 1))
            .with_rule(Rule::new("high", 10));
        let merged = merge(&[policy.clone()]).unwrap();
        policy.sort_rules();
        assert_eq!(merged, policy);
    }

    #[test]
    fn test_stricter_policy_wins_regardless_of_input_order() {
        let strict = Policy::new("2").with_rule(
            Rule::new("shared", 100).with_action("block", ActionValue::Bool(true)),
        );
        let lax = Policy::new("1")
            .with_rule(Rule::new("shared", 5).with_action("block", ActionValue::Bool(false)))
            .with_rule(Rule::new("lax-only", 1));

        for inputs in [vec![strict.clone(), lax.clone()], vec![lax.clone(), strict.clone()]] {
            let merged = merge(&inputs).unwrap();
            assert_eq!(ids(&merged), vec!["shared", "lax-only"]);
            assert!(merged.rule("shared").unwrap().blocks());
            assert_eq!(merged.version, "2");
        }
    }

    #[test]
    fn test_equal_strictness_later_input_wins() {
        let a = Policy::new("1").with_rule(Rule::new("r", 7).with_category("a"));
        let b = Policy::new("1").with_rule(Rule::new("r", 7).with_category("b"));
        let merged = merge(&[a, b]).unwrap();
        assert_eq!(merged.rules.len(), 1);
        assert_eq!(merged.rules[0].category.as_deref(), Some("b"));
    }

    #[test]
    fn test_defaults_shallow_merge_and_cache_from_least_strict() {
        let mut lax = Policy::new("1").with_rule(Rule::new("a", 1));
        lax.defaults.insert("limits".into(), json!({"cpu": 1, "memory": 2}));
        lax.defaults.insert("team".into(), json!("platform"));
        lax.cache = Some(CacheConfig {
            ttl_seconds: Some(10),
        });
        let mut strict = Policy::new("1").with_rule(Rule::new("b", 50));
        strict.defaults.insert("limits".into(), json!({"cpu": 4}));
        strict.cache = Some(CacheConfig {
            ttl_seconds: Some(999),
        });

        let merged = merge(&[strict, lax]).unwrap();
        // replaced whole, never deep-merged
        assert_eq!(merged.defaults["limits"], json!({"cpu": 4}));
        assert_eq!(merged.defaults["team"], json!("platform"));
        assert_eq!(merged.cache.unwrap().ttl_seconds, Some(10));
    }

    #[test]
    fn test_policy_without_rules_is_least_strict() {
        let mut empty = Policy::new("1");
        empty.defaults.insert("mode".into(), json!("empty"));
        let mut negative = Policy::new("1").with_rule(Rule::new("n", -50));
        negative.defaults.insert("mode".into(), json!("negative"));
        let merged = merge(&[negative, empty]).unwrap();
        assert_eq!(merged.defaults["mode"], json!("negative"));
    }
}
