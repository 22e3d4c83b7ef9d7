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

// Domain error types - every failure crosses the orchestrator boundary as a value

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// One structural problem found in a policy document or tool parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Dotted location, e.g. `rules[2].conditions[0].pattern`
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Itemised validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", join_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            issues: vec![ValidationIssue::new(path, message)],
        }
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Policy loading and merging errors (the LoadFailed family).
///
/// Reported per source; callers decide whether to proceed with fewer sources.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Policy source not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read policy source {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse policy source {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid policy {}: {source}", .path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: ValidationError,
    },

    #[error("Unsupported policy format for {} (expected .yaml, .yml or .json)", .path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("Failed to scan policy directory {}: {source}", .dir.display())]
    Discovery {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Merging zero policies is a programming error, not an empty result
    #[error("Cannot merge an empty list of policies")]
    NothingToMerge,
}

/// Malformed process configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid value '{value}' for {var}: {reason}")]
pub struct ConfigError {
    pub var: String,
    pub value: String,
    pub reason: String,
}

/// Coarse classification of an execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    ValidationFailed,
    PolicyBlocked,
    HandlerFailure,
    HandlerReportedFailure,
    Closed,
}

/// Structured guidance a tool may attach to its own failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureGuidance {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remediation: Vec<String>,
    /// Failure-specific follow-up attached by the orchestrator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// A failure reported by a tool handler itself.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{message}")]
pub struct ToolFailure {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance: Option<FailureGuidance>,
}

impl ToolFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            guidance: None,
        }
    }

    pub fn with_guidance(mut self, guidance: FailureGuidance) -> Self {
        self.guidance = Some(guidance);
        self
    }
}

impl From<anyhow::Error> for ToolFailure {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{:#}", err))
    }
}

/// Every way `Orchestrator::execute` can fail. None of these escape as a panic.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ExecuteError {
    #[error("Tool not found: {tool_name}")]
    NotFound { tool_name: String },

    #[error("Invalid parameters for '{tool_name}': {}", join_issues(.issues))]
    ValidationFailed {
        tool_name: String,
        issues: Vec<ValidationIssue>,
    },

    #[error("Blocked by policy rule(s): {}", .rule_ids.join(", "))]
    PolicyBlocked {
        tool_name: String,
        rule_ids: Vec<String>,
    },

    /// The handler panicked
    #[error("Tool '{tool_name}' failed: {message}")]
    HandlerFailure { tool_name: String, message: String },

    #[error("Tool '{tool_name}' reported failure: {failure}")]
    HandlerReportedFailure {
        tool_name: String,
        failure: ToolFailure,
    },

    #[error("Orchestrator is closed")]
    Closed,
}

impl ExecuteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            Self::PolicyBlocked { .. } => ErrorKind::PolicyBlocked,
            Self::HandlerFailure { .. } => ErrorKind::HandlerFailure,
            Self::HandlerReportedFailure { .. } => ErrorKind::HandlerReportedFailure,
            Self::Closed => ErrorKind::Closed,
        }
    }

    /// Guidance carried by a tool-reported failure, if any.
    pub fn guidance(&self) -> Option<&FailureGuidance> {
        match self {
            Self::HandlerReportedFailure { failure, .. } => failure.guidance.as_ref(),
            _ => None,
        }
    }

    /// Message suitable for the calling agent.
    pub fn user_message(&self) -> String {
        match self {
            Self::HandlerFailure { tool_name, .. } => {
                format!("Tool '{}' failed unexpectedly", tool_name)
            }
            other => other.to_string(),
        }
    }
}
