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

//! Collaborator traits.
//!
//! Defines the seams between the execution pipeline and the host: the tools
//! it dispatches to and the factory that builds their execution context.

use async_trait::async_trait;
use serde_json::Value;
use tracing::Span;
use uuid::Uuid;

use crate::engine_core::errors::ToolFailure;
use crate::engine_core::models::ExecuteRequest;
use crate::orchestrator::context::ToolContext;
use crate::utils::contract_validator::InputContract;

/// A named operation the orchestrator can execute.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registry key; unique per orchestrator.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Parameters are checked against this before any policy work.
    fn input_contract(&self) -> &InputContract;

    /// Run the tool with validated parameters. Cancellation is cooperative:
    /// long-running handlers should watch `ctx.cancellation`.
    async fn call(&self, params: Value, ctx: ToolContext) -> Result<Value, ToolFailure>;
}

/// Builds the per-invocation context handed to a tool.
pub trait ContextFactory: Send + Sync {
    fn build(
        &self,
        tool_name: &str,
        execution_id: Uuid,
        request: &ExecuteRequest,
        span: &Span,
    ) -> ToolContext;
}
