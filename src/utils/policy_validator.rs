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

// Structural policy validation - raw document in, typed policy out, all problems reported at once

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

use crate::engine_core::constants::{actions, policy as policy_consts};
use crate::engine_core::errors::{ValidationError, ValidationIssue};
use crate::engine_core::models::{
    ActionValue, Actions, CacheConfig, Condition, EnforcementMode, EnvironmentConfig,
    EnvironmentOverride, PatternCondition, Policy, Predicate, PredicateCondition, Rule,
};

/// Validate a raw policy document and parse it into a `Policy`.
pub fn validate(raw: &Value) -> Result<Policy, ValidationError> {
    PolicyValidator::validate(raw)
}

/// Validates policy documents for structural correctness
pub struct PolicyValidator;

impl PolicyValidator {
    /// Parse conditions into their tagged form so evaluation never inspects
    /// raw shape again. Every issue found is reported, not just the first.
    pub fn validate(raw: &Value) -> Result<Policy, ValidationError> {
        let mut issues = Issues::default();
        let Some(root) = raw.as_object() else {
            return Err(ValidationError::single("", "policy must be a mapping"));
        };

        let version = match field(root, &["version"]) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(_) => {
                issues.push("version", "must be a string or number");
                String::new()
            }
            None => {
                issues.push("version", "missing required field");
                String::new()
            }
        };

        let metadata = match field(root, &["metadata"]) {
            None => None,
            Some(Value::Object(map)) => Some(map.clone()),
            Some(_) => {
                issues.push("metadata", "must be a mapping");
                None
            }
        };

        let defaults = match field(root, &["defaults"]) {
            None => Map::new(),
            Some(Value::Object(map)) => {
                Self::check_defaults(map, "defaults", &mut issues);
                map.clone()
            }
            Some(_) => {
                issues.push("defaults", "must be a mapping");
                Map::new()
            }
        };

        let rules = match field(root, &["rules"]) {
            Some(Value::Array(items)) => Self::parse_rules(items, &mut issues),
            Some(_) => {
                issues.push("rules", "must be a list");
                Vec::new()
            }
            None => {
                issues.push("rules", "missing required field");
                Vec::new()
            }
        };

        let environments = match field(root, &["environments"]) {
            None => BTreeMap::new(),
            Some(Value::Object(envs)) => envs
                .iter()
                .filter_map(|(name, env)| {
                    Self::parse_environment(env, &format!("environments.{}", name), &mut issues)
                        .map(|config| (name.clone(), config))
                })
                .collect(),
            Some(_) => {
                issues.push("environments", "must be a mapping");
                BTreeMap::new()
            }
        };

        let cache = match field(root, &["cache", "cacheConfig", "cache_config"]) {
            None => None,
            Some(Value::Object(map)) => {
                let ttl_seconds = match field(map, &["ttlSeconds", "ttl_seconds"]) {
                    None => None,
                    Some(v) => {
                        let ttl = v.as_u64();
                        if ttl.is_none() {
                            issues.push("cacheConfig.ttlSeconds", "must be a non-negative integer");
                        }
                        ttl
                    }
                };
                Some(CacheConfig { ttl_seconds })
            }
            Some(_) => {
                issues.push("cacheConfig", "must be a mapping");
                None
            }
        };

        issues.finish(Policy {
            version,
            metadata,
            defaults,
            rules,
            environments,
            cache,
        })
    }

    fn check_defaults(map: &Map<String, Value>, path: &str, issues: &mut Issues) {
        if let Some(ttl) = map.get(policy_consts::DEFAULTS_CACHE_TTL) {
            if ttl.as_u64().is_none() {
                issues.push(
                    format!("{}.{}", path, policy_consts::DEFAULTS_CACHE_TTL),
                    "must be a non-negative integer",
                );
            }
        }
        if let Some(mode) = map.get(policy_consts::DEFAULTS_ENFORCEMENT_MODE) {
            if mode.as_str().and_then(EnforcementMode::parse).is_none() {
                issues.push(
                    format!("{}.{}", path, policy_consts::DEFAULTS_ENFORCEMENT_MODE),
                    "must be 'strict' or 'advisory'",
                );
            }
        }
    }

    fn parse_rules(items: &[Value], issues: &mut Issues) -> Vec<Rule> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let path = format!("rules[{}]", idx);
            if let Some(rule) = Self::parse_rule(item, &path, issues) {
                if !seen.insert(rule.id.clone()) {
                    issues.push(format!("{}.id", path), format!("duplicate rule id '{}'", rule.id));
                    continue;
                }
                rules.push(rule);
            }
        }
        rules
    }

    fn parse_rule(raw: &Value, path: &str, issues: &mut Issues) -> Option<Rule> {
        let Some(obj) = raw.as_object() else {
            issues.push(path, "rule must be a mapping");
            return None;
        };
        let before = issues.len();

        let id = match field(obj, &["id"]) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(_) => {
                issues.push(format!("{}.id", path), "must be a non-empty string");
                String::new()
            }
            None => {
                issues.push(format!("{}.id", path), "missing required field");
                String::new()
            }
        };

        let priority = match field(obj, &["priority"]) {
            Some(v) => v.as_i64().unwrap_or_else(|| {
                issues.push(format!("{}.priority", path), "must be an integer");
                0
            }),
            None => {
                issues.push(format!("{}.priority", path), "missing required field");
                0
            }
        };

        let category = optional_string(obj, &["category"], path, issues);
        let description = optional_string(obj, &["description"], path, issues);

        let conditions = match field(obj, &["conditions"]) {
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .filter_map(|(i, c)| {
                    Self::parse_condition(c, &format!("{}.conditions[{}]", path, i), issues)
                })
                .collect(),
            Some(_) => {
                issues.push(format!("{}.conditions", path), "must be a list");
                Vec::new()
            }
            None => {
                issues.push(format!("{}.conditions", path), "missing required field");
                Vec::new()
            }
        };

        let actions = match field(obj, &["actions"]) {
            Some(v) => Self::parse_actions(v, &format!("{}.actions", path), issues),
            None => {
                issues.push(format!("{}.actions", path), "missing required field");
                Actions::new()
            }
        };

        (issues.len() == before).then_some(Rule {
            id,
            category,
            priority,
            conditions,
            actions,
            description,
        })
    }

    fn parse_condition(raw: &Value, path: &str, issues: &mut Issues) -> Option<Condition> {
        let Some(obj) = raw.as_object() else {
            issues.push(path, "condition must be a mapping");
            return None;
        };
        let kind = match field(obj, &["kind", "type"]) {
            Some(Value::String(k)) => k.as_str(),
            Some(_) => {
                issues.push(format!("{}.kind", path), "must be a string");
                return None;
            }
            None => {
                issues.push(format!("{}.kind", path), "missing required field");
                return None;
            }
        };

        match kind {
            "pattern" => {
                let pattern = match field(obj, &["pattern"]) {
                    Some(Value::String(p)) => p.clone(),
                    Some(_) => {
                        issues.push(format!("{}.pattern", path), "must be a string");
                        return None;
                    }
                    None => {
                        issues.push(
                            format!("{}.pattern", path),
                            "pattern condition requires 'pattern'",
                        );
                        return None;
                    }
                };
                let flags = optional_string(obj, &["flags"], path, issues);
                let count_threshold = match field(obj, &["countThreshold", "count_threshold"]) {
                    None => None,
                    Some(v) => match v.as_u64().and_then(|n| u32::try_from(n).ok()) {
                        Some(n) if n >= 1 => Some(n),
                        _ => {
                            issues.push(
                                format!("{}.countThreshold", path),
                                "must be a positive integer",
                            );
                            return None;
                        }
                    },
                };
                match PatternCondition::compile(pattern, flags, count_threshold) {
                    Ok(condition) => Some(Condition::Pattern(condition)),
                    Err(reason) => {
                        issues.push(format!("{}.pattern", path), reason);
                        None
                    }
                }
            }
            "predicate" => {
                let name = match field(obj, &["name"]) {
                    Some(Value::String(n)) if !n.is_empty() => n.clone(),
                    Some(_) => {
                        issues.push(format!("{}.name", path), "must be a non-empty string");
                        return None;
                    }
                    None => {
                        issues.push(
                            format!("{}.name", path),
                            "predicate condition requires 'name'",
                        );
                        return None;
                    }
                };
                let args = match field(obj, &["args"]) {
                    None => Vec::new(),
                    Some(Value::Array(items)) => items.clone(),
                    Some(_) => {
                        issues.push(format!("{}.args", path), "must be a list");
                        return None;
                    }
                };
                match Predicate::parse(&name, &args) {
                    Ok(predicate) => {
                        if predicate == Predicate::Unknown {
                            warn!(predicate = %name, path, "Unknown predicate, condition will never match");
                        }
                        Some(Condition::Predicate(PredicateCondition {
                            name,
                            args,
                            predicate,
                        }))
                    }
                    Err(reason) => {
                        issues.push(format!("{}.args", path), reason);
                        None
                    }
                }
            }
            other => {
                issues.push(
                    format!("{}.kind", path),
                    format!("unknown condition kind '{}' (expected pattern or predicate)", other),
                );
                None
            }
        }
    }

    fn parse_actions(raw: &Value, path: &str, issues: &mut Issues) -> Actions {
        let Some(map) = raw.as_object() else {
            issues.push(path, "must be a mapping");
            return Actions::new();
        };
        for key in [actions::BLOCK, actions::REQUIRE_APPROVAL] {
            if let Some(v) = map.get(key) {
                if !v.is_boolean() && !v.is_null() {
                    issues.push(format!("{}.{}", path, key), "must be a boolean");
                }
            }
        }
        map.iter()
            .filter_map(|(k, v)| ActionValue::from_json(v).map(|v| (k.clone(), v)))
            .collect()
    }

    fn parse_environment(raw: &Value, path: &str, issues: &mut Issues) -> Option<EnvironmentConfig> {
        let Some(obj) = raw.as_object() else {
            issues.push(path, "environment must be a mapping");
            return None;
        };
        let defaults = match field(obj, &["defaults"]) {
            None => Map::new(),
            Some(Value::Object(map)) => {
                Self::check_defaults(map, &format!("{}.defaults", path), issues);
                map.clone()
            }
            Some(_) => {
                issues.push(format!("{}.defaults", path), "must be a mapping");
                Map::new()
            }
        };
        let overrides = match field(obj, &["rules", "overrides"]) {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .filter_map(|(i, o)| {
                    Self::parse_override(o, &format!("{}.rules[{}]", path, i), issues)
                })
                .collect(),
            Some(_) => {
                issues.push(format!("{}.rules", path), "must be a list");
                Vec::new()
            }
        };
        Some(EnvironmentConfig { defaults, overrides })
    }

    fn parse_override(raw: &Value, path: &str, issues: &mut Issues) -> Option<EnvironmentOverride> {
        let Some(obj) = raw.as_object() else {
            issues.push(path, "override must be a mapping");
            return None;
        };
        let rule_id = match field(obj, &["ruleId", "rule_id", "id"]) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => {
                issues.push(format!("{}.ruleId", path), "missing required field");
                return None;
            }
        };
        let priority = match field(obj, &["priority"]) {
            None => None,
            Some(v) => match v.as_i64() {
                Some(p) => Some(p),
                None => {
                    issues.push(format!("{}.priority", path), "must be an integer");
                    return None;
                }
            },
        };
        let enabled = match field(obj, &["enabled"]) {
            None => None,
            Some(Value::Bool(b)) => Some(*b),
            Some(_) => {
                issues.push(format!("{}.enabled", path), "must be a boolean");
                return None;
            }
        };
        let actions = field(obj, &["actions"])
            .map(|v| Self::parse_actions(v, &format!("{}.actions", path), issues));
        Some(EnvironmentOverride {
            rule_id,
            priority,
            actions,
            enabled,
        })
    }
}

#[derive(Default)]
struct Issues(Vec<ValidationIssue>);

impl Issues {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(ValidationIssue::new(path, message));
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn finish(self, policy: Policy) -> Result<Policy, ValidationError> {
        if self.0.is_empty() {
            Ok(policy)
        } else {
            Err(ValidationError { issues: self.0 })
        }
    }
}

/// First present key among camelCase/snake_case aliases.
fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k))
}

fn optional_string(
    obj: &Map<String, Value>,
    keys: &[&str],
    path: &str,
    issues: &mut Issues,
) -> Option<String> {
    match field(obj, keys)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        _ => {
            issues.push(format!("{}.{}", path, keys[0]), "must be a string");
            None
        }
    }
}
