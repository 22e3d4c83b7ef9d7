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

//! Named predicates.
//!
//! The predicate set is closed: names are resolved to a `Predicate` variant
//! when the policy is validated. Names that are not recognised become
//! `Predicate::Unknown`, which always evaluates to `false`.

use serde_json::Value;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::engine::matcher::{compile_regex, render_text, MatchContext};
use crate::engine_core::constants::context;
use crate::engine_core::models::{PathArg, Predicate};

impl Predicate {
    /// Resolve a predicate name and its raw arguments.
    pub fn parse(name: &str, args: &[Value]) -> Result<Self, String> {
        match name {
            "content_matches" | "contentMatches" => {
                let pattern = string_arg(args, 0, "pattern")?;
                let regex = compile_regex(pattern, None)?;
                let field = optional_string_arg(args, 1, "field")?.map(String::from);
                Ok(Self::ContentMatches { regex, field })
            }
            "file_exists" | "fileExists" => {
                let candidate = path_arg(string_arg(args, 0, "candidate path")?);
                let base = path_arg(string_arg(args, 1, "base path")?);
                Ok(Self::FileExists { candidate, base })
            }
            "field_exceeds" | "fieldExceeds" => {
                let field = string_arg(args, 0, "field")?.to_string();
                let threshold = args
                    .get(1)
                    .and_then(Value::as_f64)
                    .ok_or_else(|| "argument 1 (threshold) must be a number".to_string())?;
                Ok(Self::FieldExceeds { field, threshold })
            }
            "has_vulnerabilities" | "hasVulnerabilities" => {
                let severities = string_list(args, "severity")?
                    .into_iter()
                    .map(|s| s.to_lowercase())
                    .collect();
                Ok(Self::HasVulnerabilities { severities })
            }
            "tool_in" | "toolIn" => Ok(Self::ToolIn {
                tools: string_list(args, "tool name")?,
            }),
            _ => Ok(Self::Unknown),
        }
    }

    pub fn evaluate(&self, ctx: &MatchContext<'_>) -> bool {
        match self {
            Self::ContentMatches { regex, field } => match field {
                None => regex.is_match(ctx.as_text()),
                Some(path) => match ctx.field(path) {
                    Some(Value::String(s)) => regex.is_match(s),
                    Some(other) => regex.is_match(&render_text(other)),
                    None => false,
                },
            },
            Self::FileExists { candidate, base } => {
                match (resolve_path_arg(candidate, ctx), resolve_path_arg(base, ctx)) {
                    (Some(candidate), Some(base)) => {
                        file_exists_within(Path::new(&base), Path::new(&candidate))
                    }
                    _ => false,
                }
            }
            Self::FieldExceeds { field, threshold } => ctx
                .field(field)
                .and_then(as_number)
                .is_some_and(|value| value > *threshold),
            Self::HasVulnerabilities { severities } => ctx
                .field(context::VULNERABILITIES)
                .and_then(Value::as_array)
                .is_some_and(|vulns| {
                    vulns.iter().any(|v| {
                        let severity = match v {
                            Value::String(s) => Some(s.as_str()),
                            Value::Object(map) => map.get("severity").and_then(Value::as_str),
                            _ => None,
                        };
                        severity.is_some_and(|s| severities.contains(&s.to_lowercase()))
                    })
                }),
            Self::ToolIn { tools } => ctx
                .tool_name()
                .is_some_and(|name| tools.iter().any(|t| t == name)),
            Self::Unknown => false,
        }
    }
}

/// Resolve `candidate` against `base`, refusing anything that lands outside
/// `base` lexically. Candidates must be relative. `None` means the candidate
/// escapes.
pub fn resolve_within(base: &Path, candidate: &Path) -> Option<PathBuf> {
    if candidate.as_os_str().is_empty() || candidate.is_absolute() || candidate.has_root() {
        return None;
    }
    let base = normalize(base)?;
    let joined = normalize(&base.join(candidate))?;
    joined.starts_with(&base).then_some(joined)
}

/// True only if `candidate` exists under `base`, after resolving symlinks.
pub fn file_exists_within(base: &Path, candidate: &Path) -> bool {
    let Some(resolved) = resolve_within(base, candidate) else {
        return false;
    };
    match (fs::canonicalize(base), fs::canonicalize(&resolved)) {
        (Ok(real_base), Ok(real_target)) => real_target.starts_with(real_base),
        _ => false,
    }
}

/// Lexical normalisation; `None` if `..` climbs above the path's own start.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                _ => return None,
            },
            Component::Normal(part) => out.push(part),
        }
    }
    Some(out)
}

fn path_arg(raw: &str) -> PathArg {
    match raw.strip_prefix(context::FIELD_REF_PREFIX) {
        Some(field) => PathArg::Field(field.to_string()),
        None => PathArg::Literal(raw.to_string()),
    }
}

fn resolve_path_arg(arg: &PathArg, ctx: &MatchContext<'_>) -> Option<String> {
    match arg {
        PathArg::Literal(s) => Some(s.clone()),
        PathArg::Field(path) => ctx.field(path).and_then(Value::as_str).map(String::from),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_arg<'a>(args: &'a [Value], idx: usize, what: &str) -> Result<&'a str, String> {
    args.get(idx)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("argument {} ({}) must be a string", idx, what))
}

fn optional_string_arg<'a>(
    args: &'a [Value],
    idx: usize,
    what: &str,
) -> Result<Option<&'a str>, String> {
    match args.get(idx) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(format!("argument {} ({}) must be a string", idx, what)),
    }
}

/// Accepts `["a", "b"]` or `[["a", "b"]]`.
fn string_list(args: &[Value], what: &str) -> Result<Vec<String>, String> {
    let items = match args {
        [Value::Array(inner)] => inner.as_slice(),
        other => other,
    };
    if items.is_empty() {
        return Err(format!("expected at least one {}", what));
    }
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(String::from)
                .ok_or_else(|| format!("every {} must be a string", what))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::matcher::invocation_record;
    use serde_json::json;
    use std::fs;

    fn eval(name: &str, args: Value, tool: &str, params: Value) -> bool {
        let args = args.as_array().cloned().unwrap_or_default();
        let predicate = Predicate::parse(name, &args).unwrap();
        let record = invocation_record(tool, &params);
        predicate.evaluate(&MatchContext::record(&record))
    }

    #[test]
    fn test_unknown_predicate_is_false() {
        let predicate = Predicate::parse("always_true", &[]).unwrap();
        assert_eq!(predicate, Predicate::Unknown);
        assert!(!eval("always_true", json!([]), "t", json!({})));
    }

    #[test]
    fn test_content_matches_field() {
        let params = json!({"dockerfile": "FROM node:latest", "tag": "v1"});
        assert!(eval("content_matches", json!([":latest"]), "t", params.clone()));
        assert!(eval("content_matches", json!([":latest", "dockerfile"]), "t", params.clone()));
        assert!(!eval("content_matches", json!([":latest", "tag"]), "t", params.clone()));
        assert!(!eval("content_matches", json!([":latest", "missing"]), "t", params));
    }

    #[test]
    fn test_field_exceeds() {
        let params = json!({"replicas": 12, "memory": "512"});
        assert!(eval("field_exceeds", json!(["replicas", 10]), "t", params.clone()));
        assert!(!eval("field_exceeds", json!(["replicas", 12]), "t", params.clone()));
        assert!(eval("field_exceeds", json!(["memory", 256]), "t", params.clone()));
        assert!(!eval("field_exceeds", json!(["cpu", 0]), "t", params));
    }

    #[test]
    fn test_field_exceeds_requires_numeric_threshold() {
        let err = Predicate::parse("field_exceeds", &[json!("replicas"), json!("ten")]).unwrap_err();
        assert!(err.contains("threshold"));
    }

    #[test]
    fn test_has_vulnerabilities_is_case_insensitive() {
        let params = json!({"vulnerabilities": [
            {"id": "CVE-1", "severity": "LOW"},
            {"id": "CVE-2", "severity": "Critical"}
        ]});
        assert!(eval("has_vulnerabilities", json!(["critical"]), "scan", params.clone()));
        assert!(eval("has_vulnerabilities", json!([["HIGH", "critical"]]), "scan", params.clone()));
        assert!(!eval("has_vulnerabilities", json!(["high"]), "scan", params));
        assert!(!eval("has_vulnerabilities", json!(["high"]), "scan", json!({})));
    }

    #[test]
    fn test_tool_in() {
        assert!(eval("tool_in", json!(["build_image", "push_image"]), "push_image", json!({})));
        assert!(!eval("tool_in", json!(["build_image"]), "scan_image", json!({})));
        assert!(Predicate::parse("tool_in", &[]).is_err());
    }

    #[test]
    fn test_file_exists_within_base() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch").unwrap();
        let base = dir.path().to_string_lossy().to_string();

        assert!(eval("file_exists", json!(["Dockerfile", base]), "t", json!({})));
        assert!(!eval("file_exists", json!(["Missing", base]), "t", json!({})));
        assert!(eval(
            "file_exists",
            json!(["$dockerfile", "$repo"]),
            "t",
            json!({"dockerfile": "Dockerfile", "repo": base})
        ));
    }

    #[test]
    fn test_file_exists_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("repo");
        fs::create_dir(&inner).unwrap();
        fs::write(dir.path().join("secret"), "x").unwrap();
        let base = inner.to_string_lossy().to_string();

        assert!(!eval("file_exists", json!(["../secret", base]), "t", json!({})));
        assert!(!eval("file_exists", json!(["../../etc/passwd", base]), "t", json!({})));
        assert!(!eval("file_exists", json!(["/etc/passwd", base]), "t", json!({})));
    }

    #[test]
    fn test_resolve_within() {
        let base = Path::new("/work/repo");
        assert_eq!(
            resolve_within(base, Path::new("src/../Dockerfile")),
            Some(PathBuf::from("/work/repo/Dockerfile"))
        );
        assert_eq!(resolve_within(base, Path::new("../repo2/x")), None);
        assert_eq!(resolve_within(Path::new("."), Path::new("../x")), None);
        assert_eq!(resolve_within(base, Path::new("")), None);
    }

    #[test]
    fn test_absolute_candidate_is_refused() {
        assert_eq!(resolve_within(Path::new("."), Path::new("/etc/passwd")), None);
        assert_eq!(resolve_within(Path::new(""), Path::new("/etc/passwd")), None);
        assert_eq!(
            resolve_within(Path::new("/work/repo"), Path::new("/work/repo/Dockerfile")),
            None
        );
        assert_eq!(
            resolve_within(Path::new("."), Path::new("Dockerfile")),
            Some(PathBuf::from("Dockerfile"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_file_exists_rejects_symlink_escape() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("repo");
        fs::create_dir(&inner).unwrap();
        fs::write(dir.path().join("secret"), "x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("secret"), inner.join("link")).unwrap();

        assert!(!file_exists_within(&inner, Path::new("link")));
    }
}
