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

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::Span;
use uuid::Uuid;

use crate::engine_core::models::{ExecuteRequest, ProgressSink};
use crate::engine_core::traits::ContextFactory;

/// Capabilities handed to a tool for one invocation.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub tool_name: String,
    pub execution_id: Uuid,
    /// Span of the execution; handlers may `.in_scope` or instrument with it
    pub span: Span,
    pub cancellation: CancellationToken,
    pub progress: Option<ProgressSink>,
    pub logger_context: Map<String, Value>,
    /// Host-specific extras passed through untouched
    pub extra: Map<String, Value>,
}

impl ToolContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// No-op when the host did not supply a progress sink.
    pub fn report_progress(&self, progress: f64, total: Option<f64>, message: impl Into<String>) {
        if let Some(sink) = &self.progress {
            sink.report(progress, total, Some(message.into()));
        }
    }
}

/// Builds contexts from request metadata alone. A request without a
/// cancellation token gets a fresh one that is never cancelled.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultContextFactory;

impl ContextFactory for DefaultContextFactory {
    fn build(
        &self,
        tool_name: &str,
        execution_id: Uuid,
        request: &ExecuteRequest,
        span: &Span,
    ) -> ToolContext {
        let metadata = &request.metadata;
        ToolContext {
            tool_name: tool_name.to_string(),
            execution_id,
            span: span.clone(),
            cancellation: metadata
                .cancellation
                .clone()
                .unwrap_or_else(CancellationToken::new),
            progress: metadata.progress.clone(),
            logger_context: metadata.logger_context.clone(),
            extra: metadata.extra.clone(),
        }
    }
}
