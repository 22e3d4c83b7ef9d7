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

// Policy loading - read, validate, resolve for an environment, sort, cache

use serde_json::Value;
use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::engine_core::constants::policy::RECOGNIZED_EXTENSIONS;
use crate::engine_core::errors::PolicyError;
use crate::engine_core::models::Policy;
use crate::loader::merger;
use crate::loader::policy_cache::PolicyCache;
use crate::utils::policy_validator;

/// Outcome of loading several sources. Failures are per source.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<(PathBuf, Arc<Policy>)>,
    pub failures: Vec<PolicyError>,
}

impl LoadReport {
    pub fn policies(&self) -> Vec<Arc<Policy>> {
        self.loaded.iter().map(|(_, p)| Arc::clone(p)).collect()
    }
}

/// Policy loader - the only writer to its cache
#[derive(Debug, Clone, Default)]
pub struct PolicyLoader {
    cache: PolicyCache,
}

impl PolicyLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing cache, e.g. across orchestrator rebuilds.
    pub fn with_cache(cache: PolicyCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &PolicyCache {
        &self.cache
    }

    /// Load one source, resolved for `environment`.
    ///
    /// A cache hit never touches disk. Read, parse or validation problems are
    /// returned as errors; there is no fallback to an empty policy.
    pub fn load(
        &self,
        path: impl AsRef<Path>,
        environment: Option<&str>,
    ) -> Result<Arc<Policy>, PolicyError> {
        let path = path.as_ref();
        if let Some(cached) = self.cache.get(path, environment) {
            debug!(path = %path.display(), environment, "Policy cache hit");
            return Ok(cached);
        }

        let raw = read_raw(path)?;
        let mut policy = policy_validator::validate(&raw).map_err(|source| PolicyError::Invalid {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(environment) = environment {
            apply_environment(&mut policy, environment);
        }
        policy.sort_rules();

        let ttl = policy.cache_ttl();
        let policy = Arc::new(policy);
        self.cache.set(path, environment, Arc::clone(&policy), ttl);
        info!(
            path = %path.display(),
            environment,
            rules = policy.rules.len(),
            ttl_secs = ttl.as_secs(),
            "Policy loaded"
        );
        Ok(policy)
    }

    /// Load every source independently.
    pub fn load_all(&self, paths: &[PathBuf], environment: Option<&str>) -> LoadReport {
        let mut report = LoadReport::default();
        for path in paths {
            match self.load(path, environment) {
                Ok(policy) => report.loaded.push((path.clone(), policy)),
                Err(e) => report.failures.push(e),
            }
        }
        report
    }

    /// Load and merge all sources into the effective policy.
    ///
    /// Failed sources are logged and skipped. `None` when nothing loaded, in
    /// which case tool execution proceeds unenforced.
    pub fn load_effective(&self, paths: &[PathBuf], environment: Option<&str>) -> Option<Policy> {
        let report = self.load_all(paths, environment);
        for failure in &report.failures {
            warn!(error = %failure, "Skipping policy source that failed to load");
        }
        let policies = report.policies();
        if policies.is_empty() {
            warn!(sources = paths.len(), "No policy loaded, tool execution is unenforced");
            return None;
        }
        match merger::merge(&policies) {
            Ok(policy) => Some(policy),
            Err(e) => {
                warn!(error = %e, "Policy merge failed, tool execution is unenforced");
                None
            }
        }
    }
}

/// Explicit sources when given, otherwise every recognised file in `dir`.
pub fn resolve_sources(explicit: &[PathBuf], dir: &Path) -> Result<Vec<PathBuf>, PolicyError> {
    if explicit.is_empty() {
        discover_policy_files(dir)
    } else {
        Ok(explicit.to_vec())
    }
}

/// Recognised policy files in `dir`, in numeric-aware name order. A missing
/// directory yields no files.
pub fn discover_policy_files(dir: &Path) -> Result<Vec<PathBuf>, PolicyError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "Policy directory does not exist");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(PolicyError::Discovery {
                dir: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| PolicyError::Discovery {
                dir: dir.to_path_buf(),
                source,
            })?
            .path();
        if path.is_file() && is_recognized(&path) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));
    Ok(files)
}

/// Apply the overrides `policy` declares for `environment`, then drop the
/// environment table since the result is resolved.
pub fn apply_environment(policy: &mut Policy, environment: &str) {
    let Some(env) = policy.environments.remove(environment) else {
        policy.environments.clear();
        return;
    };
    policy.environments.clear();

    policy.defaults.extend(env.defaults);

    for ov in env.overrides {
        if ov.enabled == Some(false) {
            let before = policy.rules.len();
            policy.rules.retain(|r| r.id != ov.rule_id);
            if policy.rules.len() == before {
                warn!(rule_id = %ov.rule_id, environment, "Override disables unknown rule");
            } else {
                debug!(rule_id = %ov.rule_id, environment, "Rule disabled for environment");
            }
            continue;
        }
        let Some(rule) = policy.rules.iter_mut().find(|r| r.id == ov.rule_id) else {
            // overrides never introduce rules
            warn!(rule_id = %ov.rule_id, environment, "Override references unknown rule, ignoring");
            continue;
        };
        if let Some(priority) = ov.priority {
            rule.priority = priority;
        }
        if let Some(actions) = ov.actions {
            rule.actions = actions;
        }
    }
}

fn read_raw(path: &Path) -> Result<Value, PolicyError> {
    let format = extension(path)
        .filter(|ext| RECOGNIZED_EXTENSIONS.contains(&ext.as_str()))
        .ok_or_else(|| PolicyError::UnsupportedFormat {
            path: path.to_path_buf(),
        })?;

    let content = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            PolicyError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            PolicyError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let parsed = if format == "json" {
        serde_json::from_str::<Value>(&content).map_err(|e| e.to_string())
    } else {
        serde_yaml_ng::from_str::<Value>(&content).map_err(|e| e.to_string())
    };
    parsed.map_err(|message| PolicyError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

fn is_recognized(path: &Path) -> bool {
    extension(path).is_some_and(|ext| RECOGNIZED_EXTENSIONS.contains(&ext.as_str()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Compare names so that digit runs order by value: `2-a` < `10-a`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut a_rest, mut b_rest) = (a, b);
    loop {
        match (a_rest.chars().next(), b_rest.chars().next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let (a_num, a_tail) = split_digits(a_rest);
                let (b_num, b_tail) = split_digits(b_rest);
                let a_trim = a_num.trim_start_matches('0');
                let b_trim = b_num.trim_start_matches('0');
                let ord = a_trim
                    .len()
                    .cmp(&b_trim.len())
                    .then_with(|| a_trim.cmp(b_trim));
                if ord != Ordering::Equal {
                    return ord;
                }
                a_rest = a_tail;
                b_rest = b_tail;
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a_rest = &a_rest[x.len_utf8()..];
                b_rest = &b_rest[y.len_utf8()..];
            }
        }
    }
}

fn split_digits(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}
