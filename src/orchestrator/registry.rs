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

// Tool registry - maps tool names to handlers and their input contracts

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

use crate::engine_core::errors::ToolFailure;
use crate::engine_core::traits::Tool;
use crate::orchestrator::context::ToolContext;
use crate::utils::contract_validator::InputContract;

/// Name -> tool lookup supplied to the orchestrator at construction.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) -> &mut Self {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "Tool registered twice, keeping the latest");
        }
        self
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// A tool backed by an async closure.
pub struct FnTool<F> {
    name: String,
    description: String,
    contract: InputContract,
    handler: F,
}

impl<F, Fut> FnTool<F>
where
    F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolFailure>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, contract: InputContract, handler: F) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            contract,
            handler,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolFailure>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_contract(&self) -> &InputContract {
        &self.contract
    }

    async fn call(&self, params: Value, ctx: ToolContext) -> Result<Value, ToolFailure> {
        (self.handler)(params, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo(name: &str) -> impl Tool {
        FnTool::new(name, InputContract::any(), |params, _ctx| async move { Ok(params) })
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ToolRegistry::new()
            .with_tool(echo("scan_image"))
            .with_tool(echo("build_image"));
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("build_image"));
        assert!(registry.get("deploy").is_none());
        assert_eq!(registry.names(), vec!["build_image", "scan_image"]);
    }

    #[test]
    fn test_duplicate_name_replaces() {
        let mut registry = ToolRegistry::new();
        registry.register(echo("t"));
        registry.register(
            FnTool::new("t", InputContract::any(), |_p, _c| async { Ok(json!(2)) })
                .with_description("second"),
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("t").unwrap().description(), "second");
    }
}
