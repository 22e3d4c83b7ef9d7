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

//! Policy evaluation engine.
//!
//! This module implements the `PolicyEvaluator` which applies every rule of an
//! effective policy to one tool invocation and reports which rules matched.
//! Deciding what a match means (block, advise) is left to the caller.

use serde::Serialize;
use serde_json::Value;

use crate::engine::matcher::{invocation_record, MatchContext, Matcher};
use crate::engine_core::models::{Policy, Rule};

/// A rule whose conditions all held for an invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMatch {
    pub rule_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub priority: i64,
    pub blocks: bool,
    pub requires_approval: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RuleMatch {
    fn from_rule(rule: &Rule) -> Self {
        Self {
            rule_id: rule.id.clone(),
            category: rule.category.clone(),
            priority: rule.priority,
            blocks: rule.blocks(),
            requires_approval: rule.requires_approval(),
            message: rule.message().map(String::from),
        }
    }
}

/// Outcome of evaluating a policy, in policy rule order (descending priority).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEvaluation {
    pub matched: Vec<RuleMatch>,
}

impl PolicyEvaluation {
    pub fn is_blocked(&self) -> bool {
        self.matched.iter().any(|m| m.blocks)
    }

    pub fn blocking_rule_ids(&self) -> Vec<String> {
        self.matched
            .iter()
            .filter(|m| m.blocks)
            .map(|m| m.rule_id.clone())
            .collect()
    }

    /// Matches that carry no `block` action.
    pub fn advisories(&self) -> impl Iterator<Item = &RuleMatch> {
        self.matched.iter().filter(|m| !m.blocks)
    }
}

pub struct PolicyEvaluator;

impl PolicyEvaluator {
    /// Evaluate every rule against `{toolName, params}`.
    pub fn evaluate(policy: &Policy, tool_name: &str, params: &Value) -> PolicyEvaluation {
        let record = invocation_record(tool_name, params);
        let ctx = MatchContext::record(&record);
        let matched = policy
            .rules
            .iter()
            .filter(|rule| Self::rule_matches(rule, &ctx))
            .map(RuleMatch::from_rule)
            .collect();
        PolicyEvaluation { matched }
    }

    /// AND of all conditions. A rule without conditions never matches.
    pub fn rule_matches(rule: &Rule, ctx: &MatchContext<'_>) -> bool {
        !rule.conditions.is_empty()
            && rule
                .conditions
                .iter()
                .all(|condition| Matcher::evaluate(condition, ctx))
    }
}
