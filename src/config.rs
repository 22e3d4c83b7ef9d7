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

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::engine_core::constants::config as env_keys;
use crate::engine_core::constants::decoration::DEFAULT_MAX_AUDIT_OUTPUT_CHARS;
use crate::engine_core::constants::policy::DEFAULT_POLICY_DIR;
use crate::engine_core::errors::{ConfigError, PolicyError};
use crate::loader::policy_loader::resolve_sources;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Explicit policy sources; when empty, `policy_dir` is scanned
    pub policy_paths: Vec<PathBuf>,
    pub policy_dir: PathBuf,
    /// Environment whose overrides are applied at load time
    pub environment: Option<String>,
    pub chain_hints: bool,
    /// JSON-lines audit file; audit goes to tracing when unset
    pub audit_log: Option<PathBuf>,
    pub audit_max_output_chars: usize,
    pub log_level: String,
    pub log_format: String, // "json" or "text"
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            policy_paths: lookup(env_keys::ENV_POLICY_PATH)
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(PathBuf::from)
                        .collect()
                })
                .unwrap_or_default(),
            policy_dir: lookup(env_keys::ENV_POLICY_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.policy_dir),
            environment: lookup(env_keys::ENV_ENVIRONMENT).filter(|s| !s.trim().is_empty()),
            chain_hints: match lookup(env_keys::ENV_CHAIN_HINTS) {
                Some(v) => parse_bool(env_keys::ENV_CHAIN_HINTS, &v)?,
                None => defaults.chain_hints,
            },
            audit_log: lookup(env_keys::ENV_AUDIT_LOG)
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            audit_max_output_chars: match lookup(env_keys::ENV_AUDIT_MAX_OUTPUT) {
                Some(v) => v.trim().parse().map_err(|_| ConfigError {
                    var: env_keys::ENV_AUDIT_MAX_OUTPUT.to_string(),
                    value: v.clone(),
                    reason: "expected a non-negative integer".to_string(),
                })?,
                None => defaults.audit_max_output_chars,
            },
            log_level: lookup(env_keys::ENV_LOG_LEVEL).unwrap_or(defaults.log_level),
            log_format: lookup(env_keys::ENV_LOG_FORMAT).unwrap_or(defaults.log_format),
        })
    }

    /// Policy files to load, in load order.
    pub fn policy_sources(&self) -> Result<Vec<PathBuf>, PolicyError> {
        resolve_sources(&self.policy_paths, &self.policy_dir)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policy_paths: Vec::new(),
            policy_dir: PathBuf::from(DEFAULT_POLICY_DIR),
            environment: None,
            chain_hints: true,
            audit_log: None,
            audit_max_output_chars: DEFAULT_MAX_AUDIT_OUTPUT_CHARS,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError {
            var: var.to_string(),
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(config(&[]).unwrap(), Config::default());
    }

    #[test]
    fn test_reads_all_variables() {
        let cfg = config(&[
            ("TOOL_WARDEN_POLICY_PATH", "a.yaml, b.json,"),
            ("TOOL_WARDEN_POLICY_DIR", "/etc/warden"),
            ("TOOL_WARDEN_ENV", "prod"),
            ("TOOL_WARDEN_CHAIN_HINTS", "off"),
            ("TOOL_WARDEN_AUDIT_LOG", "/var/log/warden.jsonl"),
            ("TOOL_WARDEN_AUDIT_MAX_OUTPUT", "512"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(cfg.policy_paths, vec![PathBuf::from("a.yaml"), PathBuf::from("b.json")]);
        assert_eq!(cfg.policy_dir, PathBuf::from("/etc/warden"));
        assert_eq!(cfg.environment.as_deref(), Some("prod"));
        assert!(!cfg.chain_hints);
        assert_eq!(cfg.audit_max_output_chars, 512);
        assert_eq!(cfg.log_format, "json");
    }

    #[test]
    fn test_rejects_malformed_values() {
        let err = config(&[("TOOL_WARDEN_AUDIT_MAX_OUTPUT", "lots")]).unwrap_err();
        assert_eq!(err.var, "TOOL_WARDEN_AUDIT_MAX_OUTPUT");
        assert!(config(&[("TOOL_WARDEN_CHAIN_HINTS", "maybe")]).is_err());
    }

    #[test]
    fn test_explicit_paths_skip_discovery() {
        let cfg = Config {
            policy_paths: vec![PathBuf::from("only.yaml")],
            policy_dir: PathBuf::from("/nonexistent"),
            ..Config::default()
        };
        assert_eq!(cfg.policy_sources().unwrap(), vec![PathBuf::from("only.yaml")]);
    }
}
