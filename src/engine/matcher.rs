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

//! Matcher evaluator.
//!
//! Evaluates one condition against an invocation context. A context is either
//! raw text or a structured record; pattern conditions always see the text
//! view, which for a record is every object key and every scalar value on its
//! own line with strings kept verbatim (so `^USER root` with the `m` flag hits
//! a Dockerfile body, and `privileged` hits a parameter of that name).

use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::borrow::Cow;

use crate::engine_core::constants::{context, limits};
use crate::engine_core::models::{Condition, PatternCondition};

/// Context a condition is evaluated against.
#[derive(Debug, Clone)]
pub struct MatchContext<'a> {
    text: Cow<'a, str>,
    record: Option<&'a Value>,
}

impl<'a> MatchContext<'a> {
    pub fn text(text: &'a str) -> Self {
        Self {
            text: Cow::Borrowed(text),
            record: None,
        }
    }

    /// Structured context; the text view is rendered once up front.
    pub fn record(record: &'a Value) -> Self {
        Self {
            text: Cow::Owned(render_record(record)),
            record: Some(record),
        }
    }

    pub fn as_text(&self) -> &str {
        &self.text
    }

    pub fn as_record(&self) -> Option<&'a Value> {
        self.record
    }

    /// Tool name of an invocation record, if present.
    pub fn tool_name(&self) -> Option<&'a str> {
        self.record
            .and_then(|r| r.get(context::TOOL_NAME))
            .and_then(Value::as_str)
    }

    /// Resolve a dotted field path (`params.image.tag`, `items.0`) against the
    /// record root, falling back to the invocation parameters.
    pub fn field(&self, path: &str) -> Option<&'a Value> {
        let record = self.record?;
        lookup_path(record, path).or_else(|| {
            record
                .get(context::PARAMS)
                .and_then(|params| lookup_path(params, path))
        })
    }
}

/// Builds the structured record policy conditions are evaluated against.
pub fn invocation_record(tool_name: &str, params: &Value) -> Value {
    let mut record = serde_json::Map::new();
    record.insert(context::TOOL_NAME.to_string(), Value::String(tool_name.to_string()));
    record.insert(context::PARAMS.to_string(), params.clone());
    Value::Object(record)
}

pub struct Matcher;

impl Matcher {
    /// Evaluate a single condition. Never fails: anything that cannot be
    /// evaluated (unknown predicate, missing field) is `false`.
    pub fn evaluate(condition: &Condition, ctx: &MatchContext<'_>) -> bool {
        match condition {
            Condition::Pattern(pattern) => Self::evaluate_pattern(pattern, ctx.as_text()),
            Condition::Predicate(predicate) => predicate.predicate.evaluate(ctx),
        }
    }

    /// Any match, or at least `count_threshold` non-overlapping matches.
    pub fn evaluate_pattern(condition: &PatternCondition, text: &str) -> bool {
        match condition.count_threshold {
            Some(threshold) => {
                // Stop counting once the threshold is reached
                condition
                    .regex
                    .find_iter(text)
                    .take(threshold as usize)
                    .count()
                    >= threshold as usize
            }
            None => condition.regex.is_match(text),
        }
    }
}

impl PatternCondition {
    /// Compile a pattern condition. Errors are human-readable reasons.
    pub fn compile(
        pattern: impl Into<String>,
        flags: Option<String>,
        count_threshold: Option<u32>,
    ) -> Result<Self, String> {
        let pattern = pattern.into();
        let regex = compile_regex(&pattern, flags.as_deref())?;
        Ok(Self {
            pattern,
            flags,
            count_threshold,
            regex,
        })
    }
}

/// Compile with JavaScript-style flag letters.
pub(crate) fn compile_regex(pattern: &str, flags: Option<&str>) -> Result<Regex, String> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.unwrap_or_default().chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            // unicode is always on; global has no meaning for a boolean test
            'u' | 'g' => {}
            other => return Err(format!("unsupported pattern flag '{}'", other)),
        }
    }
    builder
        .build()
        .map_err(|e| format!("invalid pattern '{}': {}", pattern, e))
}

fn lookup_path<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = root;
    for (depth, segment) in path.split('.').enumerate() {
        if depth >= limits::MAX_FIELD_PATH_DEPTH || segment.is_empty() {
            return None;
        }
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Text view of a value: keys and scalar leaves one per line, strings verbatim.
pub fn render_text(value: &Value) -> String {
    let mut out = String::new();
    render_into(value, &mut out, 0);
    out
}

/// Text view of an invocation record. The envelope keys are left out so a
/// pattern naming them does not hit every call.
fn render_record(record: &Value) -> String {
    let Value::Object(map) = record else {
        return render_text(record);
    };
    let mut out = String::new();
    for (key, value) in map {
        if key != context::TOOL_NAME && key != context::PARAMS {
            push_line(&mut out, key);
        }
        render_into(value, &mut out, 1);
    }
    out
}

fn render_into(value: &Value, out: &mut String, depth: usize) {
    if depth > limits::MAX_RENDER_DEPTH {
        return;
    }
    match value {
        Value::Null => {}
        Value::Bool(b) => push_line(out, &b.to_string()),
        Value::Number(n) => push_line(out, &n.to_string()),
        Value::String(s) => push_line(out, s),
        Value::Array(items) => {
            for item in items {
                render_into(item, out, depth + 1);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                push_line(out, key);
                render_into(item, out, depth + 1);
            }
        }
    }
}

fn push_line(out: &mut String, line: &str) {
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(line);
}
