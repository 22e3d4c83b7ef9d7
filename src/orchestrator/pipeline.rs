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

//! Execution pipeline.
//!
//! Each request moves through
//! `Received -> Validated -> PolicyChecked -> Executing -> {Succeeded | Blocked | Failed}`.
//! Unknown tools and invalid parameters fail before any policy work; a
//! matching `block` rule fails before the handler runs. Whatever happens,
//! exactly one audit entry is emitted and the caller gets a value, never a
//! panic.

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::evaluator::{PolicyEvaluator, RuleMatch};
use crate::engine_core::audit::{truncate_output, AuditSink, JsonlAuditSink, TracingAuditSink};
use crate::engine_core::constants::decoration::{DEFAULT_MAX_AUDIT_OUTPUT_CHARS, NEXT_STEPS};
use crate::engine_core::errors::ExecuteError;
use crate::engine_core::models::{
    EnforcementMode, ExecuteRequest, ExecutionLogEntry, ExecutionState, Policy,
};
use crate::engine_core::traits::ContextFactory;
use crate::loader::policy_loader::PolicyLoader;
use crate::orchestrator::context::DefaultContextFactory;
use crate::orchestrator::hints::ChainHints;
use crate::orchestrator::registry::ToolRegistry;

/// Successful outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub execution_id: Uuid,
    /// The tool's result, unmodified
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_steps: Option<String>,
    /// Matched rules that did not stop execution
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub advisories: Vec<RuleMatch>,
    pub duration_ms: u64,
}

impl Execution {
    /// The result value with `nextSteps` attached when it is an object that
    /// does not already carry that key.
    pub fn into_json(self) -> Value {
        let mut value = self.value;
        if let (Some(hint), Value::Object(map)) = (self.next_steps, &mut value) {
            map.entry(NEXT_STEPS).or_insert(Value::String(hint));
        }
        value
    }
}

pub struct OrchestratorBuilder {
    registry: ToolRegistry,
    policy: Option<Policy>,
    context_factory: Arc<dyn ContextFactory>,
    audit: Arc<dyn AuditSink>,
    hints: ChainHints,
    max_audit_output_chars: usize,
}

impl OrchestratorBuilder {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            policy: None,
            context_factory: Arc::new(DefaultContextFactory),
            audit: Arc::new(TracingAuditSink),
            hints: ChainHints::workflow(),
            max_audit_output_chars: DEFAULT_MAX_AUDIT_OUTPUT_CHARS,
        }
    }

    /// Wire up from process configuration. Policies come through `loader`,
    /// so orchestrators rebuilt from the same loader reuse cached policies.
    pub fn from_config(config: &Config, registry: ToolRegistry, loader: &PolicyLoader) -> Self {
        let policy = match config.policy_sources() {
            Ok(paths) => loader.load_effective(&paths, config.environment.as_deref()),
            Err(e) => {
                warn!(error = %e, "Policy discovery failed, tool execution is unenforced");
                None
            }
        };
        let audit: Arc<dyn AuditSink> = match &config.audit_log {
            Some(path) => Arc::new(JsonlAuditSink::new(path)),
            None => Arc::new(TracingAuditSink),
        };
        Self::new(registry)
            .policy(policy)
            .audit_sink(audit)
            .chain_hints(ChainHints::workflow().with_enabled(config.chain_hints))
            .max_audit_output_chars(config.audit_max_output_chars)
    }

    /// `None` runs unenforced.
    pub fn policy(mut self, policy: Option<Policy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn context_factory(mut self, factory: Arc<dyn ContextFactory>) -> Self {
        self.context_factory = factory;
        self
    }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    pub fn chain_hints(mut self, hints: ChainHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn max_audit_output_chars(mut self, max: usize) -> Self {
        self.max_audit_output_chars = max;
        self
    }

    pub fn build(self) -> Orchestrator {
        match &self.policy {
            Some(policy) => info!(
                fingerprint = %policy.fingerprint(),
                version = %policy.version,
                rules = policy.rules.len(),
                mode = ?policy.enforcement_mode(),
                "Effective policy adopted"
            ),
            None => warn!("No effective policy, tool execution is unenforced"),
        }
        Orchestrator {
            registry: self.registry,
            policy: self.policy.map(Arc::new),
            context_factory: self.context_factory,
            audit: self.audit,
            hints: self.hints,
            max_audit_output_chars: self.max_audit_output_chars,
            policy_checks: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }
}

/// Policy-governed tool dispatcher.
///
/// Reentrant: concurrent `execute` calls share only the immutable policy and
/// registry.
pub struct Orchestrator {
    registry: ToolRegistry,
    policy: Option<Arc<Policy>>,
    context_factory: Arc<dyn ContextFactory>,
    audit: Arc<dyn AuditSink>,
    hints: ChainHints,
    max_audit_output_chars: usize,
    policy_checks: AtomicU64,
    closed: AtomicBool,
}

impl Orchestrator {
    pub fn builder(registry: ToolRegistry) -> OrchestratorBuilder {
        OrchestratorBuilder::new(registry)
    }

    pub fn policy(&self) -> Option<&Policy> {
        self.policy.as_deref()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Number of policy evaluations performed so far.
    pub fn policy_checks(&self) -> u64 {
        self.policy_checks.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Idempotent. Later `execute` calls fail with `Closed`.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Orchestrator closed");
        }
    }

    pub async fn execute(&self, request: ExecuteRequest) -> Result<Execution, ExecuteError> {
        let execution_id = Uuid::new_v4();
        let span = info_span!(
            "execute",
            tool = %request.tool_name,
            execution_id = %execution_id
        );
        self.run(execution_id, request, span.clone())
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        execution_id: Uuid,
        request: ExecuteRequest,
        span: Span,
    ) -> Result<Execution, ExecuteError> {
        let started = Instant::now();
        let timestamp = Utc::now();
        if !request.metadata.logger_context.is_empty() {
            debug!(context = ?request.metadata.logger_context, "Request received");
        }

        let outcome = self.process(execution_id, &request, &span).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let state = match &outcome {
            Ok(_) => ExecutionState::Succeeded,
            Err(ExecuteError::PolicyBlocked { .. }) => ExecutionState::Blocked,
            Err(_) => ExecutionState::Failed,
        };
        match &outcome {
            Ok(_) => info!(duration_ms, "Tool execution succeeded"),
            Err(e) => warn!(duration_ms, kind = ?e.kind(), error = %e, "Tool execution failed"),
        }

        let entry = ExecutionLogEntry {
            execution_id,
            tool_name: request.tool_name.clone(),
            input: request.params,
            output: outcome
                .as_ref()
                .ok()
                .map(|(value, _)| truncate_output(value, self.max_audit_output_chars)),
            error: outcome.as_ref().err().map(ToString::to_string),
            state,
            duration_ms,
            success: outcome.is_ok(),
            timestamp,
        };
        if let Err(e) = self.audit.log(&entry).await {
            warn!(error = %e, "Audit sink failed, execution result unaffected");
        }

        let (value, advisories) = outcome?;
        Ok(Execution {
            execution_id,
            value,
            next_steps: self.hints.on_success(&request.tool_name).map(String::from),
            advisories,
            duration_ms,
        })
    }

    async fn process(
        &self,
        execution_id: Uuid,
        request: &ExecuteRequest,
        span: &Span,
    ) -> Result<(Value, Vec<RuleMatch>), ExecuteError> {
        let tool_name = request.tool_name.as_str();
        debug!(state = ?ExecutionState::Received);
        if self.is_closed() {
            return Err(ExecuteError::Closed);
        }

        let Some(tool) = self.registry.get(tool_name) else {
            return Err(ExecuteError::NotFound {
                tool_name: tool_name.to_string(),
            });
        };

        let params = tool
            .input_contract()
            .validate(&request.params)
            .map_err(|issues| ExecuteError::ValidationFailed {
                tool_name: tool_name.to_string(),
                issues,
            })?;
        debug!(state = ?ExecutionState::Validated);

        let advisories = match &self.policy {
            Some(policy) => self.check_policy(policy, tool_name, &params)?,
            None => Vec::new(),
        };
        debug!(state = ?ExecutionState::PolicyChecked, advisories = advisories.len());

        let ctx = self
            .context_factory
            .build(tool_name, execution_id, request, span);
        debug!(state = ?ExecutionState::Executing);

        match AssertUnwindSafe(tool.call(params, ctx)).catch_unwind().await {
            Ok(Ok(value)) => Ok((value, advisories)),
            Ok(Err(mut failure)) => {
                if let (Some(guidance), Some(hint)) =
                    (failure.guidance.as_mut(), self.hints.on_failure(tool_name))
                {
                    guidance.hint = Some(hint.to_string());
                }
                Err(ExecuteError::HandlerReportedFailure {
                    tool_name: tool_name.to_string(),
                    failure,
                })
            }
            Err(panic) => Err(ExecuteError::HandlerFailure {
                tool_name: tool_name.to_string(),
                message: panic_message(panic.as_ref()),
            }),
        }
    }

    fn check_policy(
        &self,
        policy: &Policy,
        tool_name: &str,
        params: &Value,
    ) -> Result<Vec<RuleMatch>, ExecuteError> {
        self.policy_checks.fetch_add(1, Ordering::Relaxed);
        let evaluation = PolicyEvaluator::evaluate(policy, tool_name, params);
        let blocking = evaluation.blocking_rule_ids();
        if !blocking.is_empty() {
            match policy.enforcement_mode() {
                EnforcementMode::Strict => {
                    warn!(rules = ?blocking, "Blocked by policy");
                    return Err(ExecuteError::PolicyBlocked {
                        tool_name: tool_name.to_string(),
                        rule_ids: blocking,
                    });
                }
                EnforcementMode::Advisory => {
                    warn!(rules = ?blocking, "Blocking rules matched in advisory mode, proceeding");
                }
            }
        }
        for advisory in evaluation.advisories() {
            if advisory.requires_approval {
                info!(rule_id = %advisory.rule_id, "Rule requests approval for this invocation");
            }
        }
        Ok(evaluation.matched)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_core::audit::MemoryAuditSink;
    use crate::engine_core::models::Rule;
    use crate::orchestrator::registry::FnTool;
    use crate::utils::contract_validator::InputContract;
    use serde_json::json;

    fn registry() -> ToolRegistry {
        ToolRegistry::new().with_tool(FnTool::new(
            "build_image",
            InputContract::any(),
            |_params, _ctx| async { Ok(json!({"imageId": "sha256:abc"})) },
        ))
    }

    #[test]
    fn test_into_json_adds_next_steps_without_overwriting() {
        let exec = Execution {
            execution_id: Uuid::new_v4(),
            value: json!({"imageId": "x"}),
            next_steps: Some("scan it".into()),
            advisories: Vec::new(),
            duration_ms: 1,
        };
        assert_eq!(exec.clone().into_json()["nextSteps"], json!("scan it"));

        let existing = Execution {
            value: json!({"nextSteps": "tool's own"}),
            ..exec.clone()
        };
        assert_eq!(existing.into_json()["nextSteps"], json!("tool's own"));

        let scalar = Execution {
            value: json!("done"),
            ..exec
        };
        assert_eq!(scalar.into_json(), json!("done"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let orchestrator = Orchestrator::builder(registry()).build();
        orchestrator.close();
        orchestrator.close();
        assert!(orchestrator.is_closed());
        let err = orchestrator
            .execute(ExecuteRequest::new("build_image", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecuteError::Closed));
    }

    #[tokio::test]
    async fn test_rejected_after_close_is_audited() {
        let sink = Arc::new(MemoryAuditSink::new());
        let orchestrator = Orchestrator::builder(registry())
            .audit_sink(sink.clone())
            .build();
        orchestrator.close();

        let err = orchestrator
            .execute(ExecuteRequest::new("build_image", json!({"context": "."})))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecuteError::Closed));

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tool_name, "build_image");
        assert_eq!(entries[0].state, ExecutionState::Failed);
        assert!(!entries[0].success);
        assert_eq!(entries[0].error.as_deref(), Some(err.to_string().as_str()));
        assert_eq!(orchestrator.policy_checks(), 0);
    }

    #[tokio::test]
    async fn test_audit_entry_records_state() {
        let sink = Arc::new(MemoryAuditSink::new());
        let policy = Policy::new("1").with_rule(Rule::new("never", 1));
        let orchestrator = Orchestrator::builder(registry())
            .policy(Some(policy))
            .audit_sink(sink.clone())
            .max_audit_output_chars(5)
            .build();

        let exec = orchestrator
            .execute(ExecuteRequest::new("build_image", json!({"context": "."})))
            .await
            .unwrap();
        orchestrator
            .execute(ExecuteRequest::new("missing", json!({})))
            .await
            .unwrap_err();

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].execution_id, exec.execution_id);
        assert_eq!(entries[0].state, ExecutionState::Succeeded);
        assert!(entries[0].output.as_ref().unwrap().as_str().unwrap().ends_with("[truncated]"));
        assert_eq!(entries[1].state, ExecutionState::Failed);
        assert!(!entries[1].success);
        assert_eq!(orchestrator.policy_checks(), 1);
    }

    #[test]
    fn test_panic_message_downcasts() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(payload.as_ref()), "Unknown panic");
    }
}
