//! Integration tests for the policy-governed execution pipeline
//! Covers:
//! - Block / allow scenarios against a loaded policy
//! - No policy work for unknown tools or invalid parameters
//! - Handler panics and tool-reported failures
//! - Decoration, audit and concurrency

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tool_warden::engine_core::audit::{AuditSink, MemoryAuditSink};
use tool_warden::engine_core::errors::{ErrorKind, ExecuteError, FailureGuidance, ToolFailure};
use tool_warden::engine_core::models::{ExecuteRequest, ExecutionLogEntry, ExecutionState};
use tool_warden::orchestrator::{ChainHints, FnTool, Orchestrator, ToolRegistry};
use tool_warden::utils::contract_validator::InputContract;
use tool_warden::utils::policy_validator::validate;
use tool_warden::Policy;
use tokio_util::sync::CancellationToken;

// --- Helpers ---

fn root_policy() -> Policy {
    validate(&json!({
        "version": "1",
        "rules": [{
            "id": "r1",
            "priority": 100,
            "conditions": [{"kind": "pattern", "pattern": "USER root", "flags": "m"}],
            "actions": {"block": true}
        }]
    }))
    .unwrap()
}

fn dockerfile_contract() -> InputContract {
    InputContract::new(json!({
        "type": "object",
        "required": ["dockerfile"],
        "properties": {"dockerfile": {"type": "string", "minLength": 1}}
    }))
    .unwrap()
}

/// Registry with a `build_image` tool that counts its invocations.
fn counting_registry(calls: Arc<AtomicUsize>) -> ToolRegistry {
    ToolRegistry::new().with_tool(FnTool::new(
        "build_image",
        dockerfile_contract(),
        move |_params, _ctx| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"imageId": "sha256:1234"}))
            }
        },
    ))
}

fn orchestrator(policy: Option<Policy>, calls: Arc<AtomicUsize>) -> Orchestrator {
    Orchestrator::builder(counting_registry(calls))
        .policy(policy)
        .build()
}

fn build_request(dockerfile: &str) -> ExecuteRequest {
    ExecuteRequest::new("build_image", json!({"dockerfile": dockerfile}))
}

// --- Tests ---

#[tokio::test]
async fn test_matching_block_rule_stops_execution() {
    let calls = Arc::new(AtomicUsize::new(0));
    let orch = orchestrator(Some(root_policy()), calls.clone());

    let err = orch
        .execute(build_request("FROM alpine\nUSER root\nCMD [\"sh\"]"))
        .await
        .unwrap_err();

    match &err {
        ExecuteError::PolicyBlocked { rule_ids, .. } => assert_eq!(rule_ids, &vec!["r1".to_string()]),
        other => panic!("expected PolicyBlocked, got {:?}", other),
    }
    assert!(err.to_string().contains("r1"));
    assert_eq!(calls.load(Ordering::SeqCst), 0, "handler must not run");
}

#[tokio::test]
async fn test_non_matching_request_executes() {
    let calls = Arc::new(AtomicUsize::new(0));
    let orch = orchestrator(Some(root_policy()), calls.clone());

    let exec = orch
        .execute(build_request("FROM alpine\nUSER app\n"))
        .await
        .unwrap();

    assert_eq!(exec.value["imageId"], "sha256:1234");
    assert!(exec.advisories.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_parameter_name_pattern_blocks() {
    let policy = validate(&json!({
        "version": "1",
        "rules": [{
            "id": "no-privileged",
            "priority": 50,
            "conditions": [{"kind": "pattern", "pattern": "privileged"}],
            "actions": {"block": true}
        }]
    }))
    .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let orch = orchestrator(Some(policy), calls.clone());

    let err = orch
        .execute(ExecuteRequest::new(
            "build_image",
            json!({"dockerfile": "FROM alpine", "privileged": true}),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ExecuteError::PolicyBlocked { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    orch.execute(build_request("FROM alpine")).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_tool_does_no_policy_work() {
    let calls = Arc::new(AtomicUsize::new(0));
    let orch = orchestrator(Some(root_policy()), calls.clone());

    let err = orch
        .execute(ExecuteRequest::new("deploy_everything", json!({})))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(orch.policy_checks(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_params_never_reach_policy_or_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let orch = orchestrator(Some(root_policy()), calls.clone());

    let err = orch
        .execute(ExecuteRequest::new("build_image", json!({"dockerfile": 42})))
        .await
        .unwrap_err();

    let ExecuteError::ValidationFailed { issues, .. } = &err else {
        panic!("expected ValidationFailed, got {:?}", err);
    };
    assert_eq!(issues[0].path, "dockerfile");
    let message = err.to_string();
    assert!(message.contains("dockerfile:"));
    assert!(message.contains("\"string\""));
    assert_eq!(orch.policy_checks(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_without_policy_execution_is_unenforced() {
    let calls = Arc::new(AtomicUsize::new(0));
    let orch = orchestrator(None, calls.clone());

    orch.execute(build_request("USER root")).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(orch.policy_checks(), 0);
}

#[tokio::test]
async fn test_advisory_mode_reports_instead_of_blocking() {
    let mut policy = root_policy();
    policy
        .defaults
        .insert("enforcementMode".into(), json!("advisory"));
    let calls = Arc::new(AtomicUsize::new(0));
    let orch = orchestrator(Some(policy), calls.clone());

    let exec = orch.execute(build_request("USER root")).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(exec.advisories.len(), 1);
    assert_eq!(exec.advisories[0].rule_id, "r1");
    assert!(exec.advisories[0].blocks);
}

#[tokio::test]
async fn test_require_approval_is_advisory() {
    let policy = validate(&json!({
        "version": "1",
        "rules": [{
            "id": "approve-push",
            "priority": 10,
            "conditions": [{"kind": "predicate", "name": "tool_in", "args": ["build_image"]}],
            "actions": {"require_approval": true, "message": "Builds need sign-off"}
        }]
    }))
    .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let orch = orchestrator(Some(policy), calls.clone());

    let exec = orch.execute(build_request("FROM alpine")).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(exec.advisories[0].requires_approval);
    assert_eq!(exec.advisories[0].message.as_deref(), Some("Builds need sign-off"));
}

#[tokio::test]
async fn test_handler_panic_becomes_failure() {
    let registry = ToolRegistry::new().with_tool(FnTool::new(
        "scan_image",
        InputContract::any(),
        |_params, _ctx| async move {
            if true {
                panic!("scanner exploded");
            }
            Ok(Value::Null)
        },
    ));
    let sink = Arc::new(MemoryAuditSink::new());
    let orch = Orchestrator::builder(registry)
        .audit_sink(sink.clone())
        .build();

    let err = orch
        .execute(ExecuteRequest::new("scan_image", json!({})))
        .await
        .unwrap_err();
    let ExecuteError::HandlerFailure { message, .. } = &err else {
        panic!("expected HandlerFailure, got {:?}", err);
    };
    assert_eq!(message, "scanner exploded");
    assert!(!err.user_message().contains("exploded"));

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].state, ExecutionState::Failed);

    // still usable afterwards
    assert!(!orch.is_closed());
    orch.execute(ExecuteRequest::new("scan_image", json!({})))
        .await
        .unwrap_err();
    assert_eq!(sink.entries().len(), 2);
}

#[tokio::test]
async fn test_reported_failure_gets_failure_hint() {
    let registry = ToolRegistry::new()
        .with_tool(FnTool::new(
            "validate_dockerfile",
            InputContract::any(),
            |_params, _ctx| async move {
                Err(ToolFailure::new("3 lint errors").with_guidance(FailureGuidance {
                    remediation: vec!["pin the base image".into()],
                    hint: None,
                }))
            },
        ))
        .with_tool(FnTool::new(
            "build_image",
            InputContract::any(),
            |_params, _ctx| async move { Err(ToolFailure::new("daemon unreachable")) },
        ));
    let orch = Orchestrator::builder(registry).build();

    let err = orch
        .execute(ExecuteRequest::new("validate_dockerfile", json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HandlerReportedFailure);
    let guidance = err.guidance().unwrap();
    assert_eq!(guidance.remediation, vec!["pin the base image".to_string()]);
    assert!(guidance.hint.as_deref().unwrap().contains("validate_dockerfile"));

    // no guidance from the tool, nothing attached
    let err = orch
        .execute(ExecuteRequest::new("build_image", json!({})))
        .await
        .unwrap_err();
    assert!(err.guidance().is_none());
}

#[tokio::test]
async fn test_success_decorated_with_next_steps() {
    let calls = Arc::new(AtomicUsize::new(0));
    let orch = orchestrator(None, calls.clone());
    let exec = orch.execute(build_request("FROM alpine")).await.unwrap();
    assert!(exec.next_steps.as_deref().unwrap().contains("scan_image"));
    let value = exec.into_json();
    assert_eq!(value["imageId"], "sha256:1234");
    assert!(value["nextSteps"].is_string());

    let quiet = Orchestrator::builder(counting_registry(calls))
        .chain_hints(ChainHints::disabled())
        .build();
    let exec = quiet.execute(build_request("FROM alpine")).await.unwrap();
    assert!(exec.next_steps.is_none());
}

struct FailingSink;

#[async_trait]
impl AuditSink for FailingSink {
    async fn log(&self, _entry: &ExecutionLogEntry) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }
}

#[tokio::test]
async fn test_audit_failure_does_not_mask_result() {
    let calls = Arc::new(AtomicUsize::new(0));
    let orch = Orchestrator::builder(counting_registry(calls.clone()))
        .policy(Some(root_policy()))
        .audit_sink(Arc::new(FailingSink))
        .build();

    assert!(orch.execute(build_request("FROM alpine")).await.is_ok());
    assert!(matches!(
        orch.execute(build_request("USER root")).await,
        Err(ExecuteError::PolicyBlocked { .. })
    ));
}

#[tokio::test]
async fn test_blocked_invocation_is_audited_as_blocked() {
    let sink = Arc::new(MemoryAuditSink::new());
    let orch = Orchestrator::builder(counting_registry(Arc::new(AtomicUsize::new(0))))
        .policy(Some(root_policy()))
        .audit_sink(sink.clone())
        .build();

    orch.execute(build_request("USER root")).await.unwrap_err();
    let entries = sink.entries();
    let entry = &entries[0];
    assert_eq!(entry.state, ExecutionState::Blocked);
    assert!(!entry.success);
    assert!(entry.output.is_none());
    assert!(entry.error.as_deref().unwrap().contains("r1"));
    assert_eq!(entry.input, json!({"dockerfile": "USER root"}));
}

#[tokio::test]
async fn test_handlers_observe_cancellation() {
    let registry = ToolRegistry::new().with_tool(FnTool::new(
        "deploy_application",
        InputContract::any(),
        |_params, ctx| async move {
            if ctx.is_cancelled() {
                return Err(ToolFailure::new("cancelled before rollout"));
            }
            Ok(json!({"status": "deployed"}))
        },
    ));
    let orch = Orchestrator::builder(registry).build();

    let token = CancellationToken::new();
    token.cancel();
    let err = orch
        .execute(ExecuteRequest::new("deploy_application", json!({})).with_cancellation(token))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("cancelled before rollout"));
}

#[tokio::test]
async fn test_concurrent_executions() {
    let calls = Arc::new(AtomicUsize::new(0));
    let orch = Arc::new(orchestrator(Some(root_policy()), calls.clone()));

    let mut handles = Vec::new();
    for i in 0..16 {
        let orch = Arc::clone(&orch);
        handles.push(tokio::spawn(async move {
            let dockerfile = if i % 2 == 0 { "USER root" } else { "USER app" };
            orch.execute(build_request(dockerfile)).await
        }));
    }

    let mut blocked = 0;
    for handle in handles {
        if handle.await.unwrap().is_err() {
            blocked += 1;
        }
    }
    assert_eq!(blocked, 8);
    assert_eq!(calls.load(Ordering::SeqCst), 8);
    assert_eq!(orch.policy_checks(), 16);
}
