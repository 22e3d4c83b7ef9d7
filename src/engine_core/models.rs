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

//! Domain models for tool-warden.
//!
//! This module contains pure data structures representing policies, rules,
//! conditions, invocation requests and audit records. Parsing lives in
//! `utils::policy_validator` and evaluation in `engine`; nothing here does I/O.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::engine_core::constants::{actions, policy as policy_consts};

/// A single action value. Action vocabularies grow per rule category, so
/// actions are an open string-keyed map of these rather than a fixed struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum ActionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<ActionValue>),
    Map(BTreeMap<String, ActionValue>),
}

impl ActionValue {
    /// Convert an untyped JSON value. `null` has no action meaning and yields `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Int(i)),
                None => n.as_f64().map(Self::Float),
            },
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Array(items) => Some(Self::List(
                items.iter().filter_map(Self::from_json).collect(),
            )),
            Value::Object(map) => Some(Self::Map(
                map.iter()
                    .filter_map(|(k, v)| Self::from_json(v).map(|v| (k.clone(), v)))
                    .collect(),
            )),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Open action map attached to a rule.
pub type Actions = BTreeMap<String, ActionValue>;

/// A compiled regular-expression condition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternCondition {
    pub pattern: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,
    /// When set, the pattern must match at least this many times
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count_threshold: Option<u32>,
    #[serde(skip)]
    pub(crate) regex: Regex,
}

impl PatternCondition {
    pub fn regex(&self) -> &Regex {
        &self.regex
    }
}

impl PartialEq for PatternCondition {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
            && self.flags == other.flags
            && self.count_threshold == other.count_threshold
    }
}

/// Argument of a path predicate: either a literal path or a reference to a
/// field of the evaluated record (written `$params.path` in policy files).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathArg {
    Literal(String),
    Field(String),
}

/// Closed set of named predicates.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum Predicate {
    /// Sub-pattern match over the whole record or one field
    ContentMatches {
        #[serde(skip)]
        regex: Regex,
        field: Option<String>,
    },
    /// Candidate path exists under the base directory (never outside it)
    FileExists { candidate: PathArg, base: PathArg },
    /// Numeric field is strictly greater than the threshold
    FieldExceeds { field: String, threshold: f64 },
    /// Any listed severity is present in the `vulnerabilities` array
    HasVulnerabilities { severities: Vec<String> },
    /// Invoked tool is one of the listed names
    ToolIn { tools: Vec<String> },
    /// Unrecognised name; always evaluates to false
    Unknown,
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::ContentMatches { regex: a, field: fa },
                Self::ContentMatches { regex: b, field: fb },
            ) => a.as_str() == b.as_str() && fa == fb,
            (
                Self::FileExists { candidate: ca, base: ba },
                Self::FileExists { candidate: cb, base: bb },
            ) => ca == cb && ba == bb,
            (
                Self::FieldExceeds { field: fa, threshold: ta },
                Self::FieldExceeds { field: fb, threshold: tb },
            ) => fa == fb && ta == tb,
            (
                Self::HasVulnerabilities { severities: a },
                Self::HasVulnerabilities { severities: b },
            ) => a == b,
            (Self::ToolIn { tools: a }, Self::ToolIn { tools: b }) => a == b,
            (Self::Unknown, Self::Unknown) => true,
            _ => false,
        }
    }
}

/// A named predicate condition with its raw arguments kept for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredicateCondition {
    pub name: String,
    pub args: Vec<Value>,
    #[serde(skip)]
    pub predicate: Predicate,
}

/// A single boolean test over an invocation context. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Pattern(PatternCondition),
    Predicate(PredicateCondition),
}

/// A named, prioritized constraint: AND-combined conditions plus actions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Higher = stricter precedence
    pub priority: i64,
    /// AND-combined; an empty list never matches
    pub conditions: Vec<Condition>,
    pub actions: Actions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Rule {
    pub fn new(id: impl Into<String>, priority: i64) -> Self {
        Self {
            id: id.into(),
            category: None,
            priority,
            conditions: Vec::new(),
            actions: Actions::new(),
            description: None,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_action(mut self, key: impl Into<String>, value: ActionValue) -> Self {
        self.actions.insert(key.into(), value);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// `actions.block == true` is a hard stop.
    pub fn blocks(&self) -> bool {
        self.actions
            .get(actions::BLOCK)
            .and_then(ActionValue::as_bool)
            .unwrap_or(false)
    }

    pub fn requires_approval(&self) -> bool {
        self.actions
            .get(actions::REQUIRE_APPROVAL)
            .and_then(ActionValue::as_bool)
            .unwrap_or(false)
    }

    pub fn message(&self) -> Option<&str> {
        self.actions
            .get(actions::MESSAGE)
            .and_then(ActionValue::as_str)
            .or(self.description.as_deref())
    }
}

/// Per-rule replacement applied when a policy is resolved for an environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentOverride {
    pub rule_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<Actions>,
    /// `Some(false)` deletes the referenced rule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Environment-specific adjustments declared inside a policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnvironmentConfig {
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub defaults: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<EnvironmentOverride>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
}

/// How blocking rules are enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Matching `block` rules stop execution
    #[default]
    Strict,
    /// Matching `block` rules are reported but execution proceeds
    Advisory,
}

impl EnforcementMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "strict" | "enforce" | "block" => Some(Self::Strict),
            "advisory" | "audit" | "audit_only" | "warn" => Some(Self::Advisory),
            _ => None,
        }
    }
}

/// A resolved rule set.
///
/// Invariants after loading or merging: rule ids are unique and `rules` is
/// sorted by descending priority (stable for equal priorities).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub defaults: Map<String, Value>,
    pub rules: Vec<Rule>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environments: BTreeMap<String, EnvironmentConfig>,
    #[serde(rename = "cacheConfig", skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,
}

impl Policy {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            metadata: None,
            defaults: Map::new(),
            rules: Vec::new(),
            environments: BTreeMap::new(),
            cache: None,
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Maximum rule priority, `None` (least strict) for a policy without rules.
    pub fn strictness(&self) -> Option<i64> {
        self.rules.iter().map(|r| r.priority).max()
    }

    /// Stable sort by descending priority.
    pub fn sort_rules(&mut self) {
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn enforcement_mode(&self) -> EnforcementMode {
        self.defaults
            .get(policy_consts::DEFAULTS_ENFORCEMENT_MODE)
            .and_then(Value::as_str)
            .and_then(EnforcementMode::parse)
            .unwrap_or_default()
    }

    /// `cache.ttlSeconds`, then `defaults.cacheTtlSeconds`, then 300 seconds.
    pub fn cache_ttl(&self) -> Duration {
        let secs = self
            .cache
            .as_ref()
            .and_then(|c| c.ttl_seconds)
            .or_else(|| {
                self.defaults
                    .get(policy_consts::DEFAULTS_CACHE_TTL)
                    .and_then(Value::as_u64)
            })
            .unwrap_or(policy_consts::DEFAULT_CACHE_TTL_SECS);
        Duration::from_secs(secs)
    }

    /// SHA-256 over the canonical JSON rendering of the policy.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&canonical))
    }
}

/// Progress notification emitted by a tool handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Channel through which a handler reports progress to the host transport.
#[derive(Debug, Clone)]
pub struct ProgressSink(mpsc::UnboundedSender<ProgressUpdate>);

impl ProgressSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    /// Best effort: a dropped receiver is not an error for the handler.
    pub fn report(&self, progress: f64, total: Option<f64>, message: Option<String>) {
        let _ = self.0.send(ProgressUpdate {
            progress,
            total,
            message,
        });
    }
}

/// Optional request metadata supplied by the calling transport.
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    /// Extra structured fields attached to the execution span
    pub logger_context: Map<String, Value>,
    pub progress: Option<ProgressSink>,
    /// Cooperative cancellation; observed by handlers, never enforced by the pipeline
    pub cancellation: Option<CancellationToken>,
    pub extra: Map<String, Value>,
}

/// A single tool invocation request. Ephemeral; never persisted.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub tool_name: String,
    pub params: Value,
    pub metadata: RequestMetadata,
}

impl ExecuteRequest {
    pub fn new(tool_name: impl Into<String>, params: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            params,
            metadata: RequestMetadata::default(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.metadata.cancellation = Some(token);
        self
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.metadata.progress = Some(sink);
        self
    }
}

/// Pipeline states of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Received,
    Validated,
    PolicyChecked,
    Executing,
    Succeeded,
    Blocked,
    Failed,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Blocked | Self::Failed)
    }
}

/// Append-only audit record, one per invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLogEntry {
    pub execution_id: Uuid,
    pub tool_name: String,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub state: ExecutionState,
    pub duration_ms: u64,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}
