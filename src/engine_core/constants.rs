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

//! tool-warden Constants - Single source of truth for all configuration values.
//!
//! This module centralizes magic strings, defaults, and environment variable
//! names so the loader, evaluator and orchestrator agree on them.

/// Well-known rule action keys
pub mod actions {
    /// Hard stop: a matching rule with `block: true` prevents execution
    pub const BLOCK: &str = "block";
    /// Advisory: the invocation should be confirmed by a human
    pub const REQUIRE_APPROVAL: &str = "require_approval";
    /// Optional human-readable message attached to a rule's outcome
    pub const MESSAGE: &str = "message";
}

/// Policy defaults and cache settings
pub mod policy {
    /// Cache TTL used when neither `cache.ttlSeconds` nor `defaults.cacheTtlSeconds` is set
    pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
    /// Upper bound on cached (source, environment) entries
    pub const CACHE_MAX_CAPACITY: u64 = 256;
    /// Defaults key for the cache TTL
    pub const DEFAULTS_CACHE_TTL: &str = "cacheTtlSeconds";
    /// Defaults key for the enforcement mode
    pub const DEFAULTS_ENFORCEMENT_MODE: &str = "enforcementMode";
    /// File extensions recognised during directory discovery
    pub const RECOGNIZED_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];
    /// Default discovery directory
    pub const DEFAULT_POLICY_DIR: &str = "policies";
}

/// Keys of the structured record policy conditions are evaluated against
pub mod context {
    pub const TOOL_NAME: &str = "toolName";
    pub const PARAMS: &str = "params";
    /// Array inspected by the `has_vulnerabilities` predicate
    pub const VULNERABILITIES: &str = "vulnerabilities";
    /// Prefix marking a predicate argument as a field reference (`$params.path`)
    pub const FIELD_REF_PREFIX: char = '$';
}

/// Result decoration
pub mod decoration {
    /// Key under which chain hints are attached to object results
    pub const NEXT_STEPS: &str = "nextSteps";
    /// Marker appended to truncated audit output
    pub const TRUNCATION_MARKER: &str = "...[truncated]";
    /// Default maximum number of characters of tool output kept in audit entries
    pub const DEFAULT_MAX_AUDIT_OUTPUT_CHARS: usize = 2000;
}

/// Configuration Environment Variables
pub mod config {
    pub const ENV_POLICY_PATH: &str = "TOOL_WARDEN_POLICY_PATH";
    pub const ENV_POLICY_DIR: &str = "TOOL_WARDEN_POLICY_DIR";
    pub const ENV_ENVIRONMENT: &str = "TOOL_WARDEN_ENV";
    pub const ENV_CHAIN_HINTS: &str = "TOOL_WARDEN_CHAIN_HINTS";
    pub const ENV_AUDIT_LOG: &str = "TOOL_WARDEN_AUDIT_LOG";
    pub const ENV_AUDIT_MAX_OUTPUT: &str = "TOOL_WARDEN_AUDIT_MAX_OUTPUT";
    pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
    pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
}

/// Evaluation limits
pub mod limits {
    /// Maximum dotted-path depth resolved by field predicates
    pub const MAX_FIELD_PATH_DEPTH: usize = 32;
    /// Maximum nesting depth walked when rendering a record to text
    pub const MAX_RENDER_DEPTH: usize = 64;
}
