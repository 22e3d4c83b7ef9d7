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

//! Chain hints.
//!
//! A static `tool -> {success, failure}` table telling the calling agent what
//! to do next. Purely decorative: a missing entry changes nothing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ChainHint {
    pub fn new(success: impl Into<String>, failure: impl Into<String>) -> Self {
        Self {
            success: Some(success.into()),
            failure: Some(failure.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHints {
    enabled: bool,
    table: HashMap<String, ChainHint>,
}

impl Default for ChainHints {
    fn default() -> Self {
        Self::workflow()
    }
}

impl ChainHints {
    pub fn new(table: HashMap<String, ChainHint>) -> Self {
        Self {
            enabled: true,
            table,
        }
    }

    /// Decoration switched off; lookups always miss.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            table: HashMap::new(),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Add or replace the hint for one tool.
    pub fn insert(&mut self, tool: impl Into<String>, hint: ChainHint) {
        self.table.insert(tool.into(), hint);
    }

    pub fn on_success(&self, tool: &str) -> Option<&str> {
        self.lookup(tool)?.success.as_deref()
    }

    pub fn on_failure(&self, tool: &str) -> Option<&str> {
        self.lookup(tool)?.failure.as_deref()
    }

    fn lookup(&self, tool: &str) -> Option<&ChainHint> {
        if self.enabled {
            self.table.get(tool)
        } else {
            None
        }
    }

    /// Built-in table for the containerisation workflow.
    pub fn workflow() -> Self {
        let entries = [
            (
                "analyze_repository",
                "Repository analyzed. Call generate_dockerfile with the detected language and framework.",
                "Check the repository path and that it is readable, then retry analyze_repository.",
            ),
            (
                "generate_dockerfile",
                "Dockerfile generated. Call validate_dockerfile before building.",
                "Re-run analyze_repository to refresh the detected stack, then retry generate_dockerfile.",
            ),
            (
                "validate_dockerfile",
                "Dockerfile is valid. Call build_image.",
                "Fix the reported Dockerfile issues and call validate_dockerfile again.",
            ),
            (
                "build_image",
                "Image built. Call scan_image to check it for vulnerabilities.",
                "Inspect the build output, fix the Dockerfile and call build_image again.",
            ),
            (
                "scan_image",
                "Scan complete. If no blocking vulnerabilities were found, call tag_image.",
                "Make sure the image exists locally and the scanner is installed, then retry scan_image.",
            ),
            (
                "tag_image",
                "Image tagged. Call push_image to publish it.",
                "Check that the source image exists and the tag is valid.",
            ),
            (
                "push_image",
                "Image pushed. Call generate_k8s_manifests.",
                "Check registry credentials and network access, then retry push_image.",
            ),
            (
                "generate_k8s_manifests",
                "Manifests generated. Call validate_k8s_manifests.",
                "Verify the image reference and application settings, then retry generate_k8s_manifests.",
            ),
            (
                "validate_k8s_manifests",
                "Manifests are valid. Call deploy_application.",
                "Fix the reported manifest issues and call validate_k8s_manifests again.",
            ),
            (
                "deploy_application",
                "Application deployed. Call verify_deployment.",
                "Check cluster connectivity and namespace permissions, then retry deploy_application.",
            ),
            (
                "verify_deployment",
                "Deployment verified. The workflow is complete.",
                "Inspect pod events and logs, fix the manifests and redeploy.",
            ),
        ];
        Self::new(
            entries
                .into_iter()
                .map(|(tool, success, failure)| (tool.to_string(), ChainHint::new(success, failure)))
                .collect(),
        )
    }
}
