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

//! Tool input contracts.
//!
//! A contract is a JSON Schema document compiled once with `jsonschema`.
//! Violations are reported as itemised `ValidationIssue`s with dotted field
//! paths (`target.namespace`, `tags[1]`). Property `default`s are filled in
//! before validation so handlers see complete parameters.

use jsonschema::error::ValidationErrorKind;
use jsonschema::Validator;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::engine_core::errors::{ValidationError, ValidationIssue};

const MAX_DEFAULT_DEPTH: usize = 32;

/// Declared parameter shape of a tool.
#[derive(Clone, Serialize)]
#[serde(transparent)]
pub struct InputContract {
    schema: Value,
    /// `None` accepts any parameters
    #[serde(skip)]
    validator: Option<Arc<Validator>>,
}

impl std::fmt::Debug for InputContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputContract")
            .field("schema", &self.schema)
            .finish()
    }
}

impl PartialEq for InputContract {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema
    }
}

impl Default for InputContract {
    fn default() -> Self {
        Self::any()
    }
}

impl InputContract {
    /// Compile `schema`. A schema that is not valid JSON Schema is rejected here,
    /// not at call time.
    pub fn new(schema: Value) -> Result<Self, ValidationError> {
        let validator = jsonschema::options()
            .build(&schema)
            .map_err(|e| ValidationError::single("", format!("invalid input contract: {}", e)))?;
        Ok(Self {
            schema,
            validator: Some(Arc::new(validator)),
        })
    }

    /// Accepts any parameters.
    pub fn any() -> Self {
        Self {
            schema: Value::Object(Map::new()),
            validator: None,
        }
    }

    /// Derive the contract from a `schemars` type.
    #[cfg(feature = "schema")]
    pub fn from_schema<T: schemars::JsonSchema>() -> Result<Self, ValidationError> {
        let root = schemars::schema_for!(T);
        let schema = serde_json::to_value(root)
            .map_err(|e| ValidationError::single("", format!("invalid input contract: {}", e)))?;
        Self::new(schema)
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Check `params` and return them with schema defaults filled in.
    /// Every violation is reported with its field path.
    pub fn validate(&self, params: &Value) -> Result<Value, Vec<ValidationIssue>> {
        let Some(validator) = &self.validator else {
            return Ok(params.clone());
        };
        let mut validated = params.clone();
        fill_defaults(&self.schema, &self.schema, &mut validated, 0);

        let mut issues = Vec::new();
        for error in validator.iter_errors(&validated) {
            let path = dotted_path(&validated, &error.instance_path.to_string());
            match &error.kind {
                ValidationErrorKind::Required { property } => {
                    let name = property
                        .as_str()
                        .map(String::from)
                        .unwrap_or_else(|| property.to_string());
                    issues.push(ValidationIssue::new(join(&path, &name), "missing required field"));
                }
                ValidationErrorKind::AdditionalProperties { unexpected } => {
                    issues.extend(
                        unexpected
                            .iter()
                            .map(|name| ValidationIssue::new(join(&path, name), "unknown field")),
                    );
                }
                _ => issues.push(ValidationIssue::new(path, error.to_string())),
            }
        }
        if issues.is_empty() {
            Ok(validated)
        } else {
            Err(issues)
        }
    }
}

/// Insert `default`s of absent properties, descending into nested objects.
fn fill_defaults(root: &Value, schema: &Value, value: &mut Value, depth: usize) {
    if depth > MAX_DEFAULT_DEPTH {
        return;
    }
    let Some(schema) = resolve_ref(root, schema) else {
        return;
    };
    let (Some(properties), Value::Object(map)) =
        (schema.get("properties").and_then(Value::as_object), value)
    else {
        return;
    };
    for (name, prop_schema) in properties {
        match map.get_mut(name) {
            Some(field) => fill_defaults(root, prop_schema, field, depth + 1),
            None => {
                if let Some(default) = resolve_ref(root, prop_schema).and_then(|s| s.get("default"))
                {
                    map.insert(name.clone(), default.clone());
                }
            }
        }
    }
}

/// Follow local `#/...` references; remote references are left to the validator.
fn resolve_ref<'a>(root: &'a Value, schema: &'a Value) -> Option<&'a Value> {
    let mut current = schema;
    for _ in 0..MAX_DEFAULT_DEPTH {
        let Some(reference) = current.get("$ref").and_then(Value::as_str) else {
            return Some(current);
        };
        current = root.pointer(reference.strip_prefix('#')?)?;
    }
    None
}

/// JSON pointer (`/tags/1`) to dotted form (`tags[1]`), using the instance to
/// tell array indices from object keys.
fn dotted_path(instance: &Value, pointer: &str) -> String {
    let mut out = String::new();
    let mut current = Some(instance);
    for raw in pointer.split('/').skip(1) {
        let segment = raw.replace("~1", "/").replace("~0", "~");
        match current {
            Some(Value::Array(items)) => {
                out.push_str(&format!("[{}]", segment));
                current = segment.parse::<usize>().ok().and_then(|i| items.get(i));
            }
            other => {
                current = other.and_then(|v| v.get(&segment));
                out = join(&out, &segment);
            }
        }
    }
    out
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}
