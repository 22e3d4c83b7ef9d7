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

// Execution audit sinks - one entry per invocation, failures never fatal

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::engine_core::constants::decoration::TRUNCATION_MARKER;
use crate::engine_core::models::ExecutionLogEntry;

/// Receives the audit entry of every execution.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log(&self, entry: &ExecutionLogEntry) -> anyhow::Result<()>;
}

/// Emits entries as structured events on the `audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log(&self, entry: &ExecutionLogEntry) -> anyhow::Result<()> {
        let payload = serde_json::to_string(entry).context("serializing audit entry")?;
        info!(
            target: "audit",
            execution_id = %entry.execution_id,
            tool = %entry.tool_name,
            success = entry.success,
            duration_ms = entry.duration_ms,
            payload = %payload,
            "EXECUTION_AUDIT_LOG"
        );
        Ok(())
    }
}

/// Appends entries to a JSON-lines file.
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    // one writer at a time so lines never interleave
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn log(&self, entry: &ExecutionLogEntry) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(entry).context("serializing audit entry")?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening audit log {}", self.path.display()))?;
        file.write_all(&line)
            .await
            .with_context(|| format!("writing audit log {}", self.path.display()))?;
        file.flush().await?;
        Ok(())
    }
}

/// Keeps entries in memory, for embedding hosts and tests.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<ExecutionLogEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ExecutionLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn log(&self, entry: &ExecutionLogEntry) -> anyhow::Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry.clone());
        Ok(())
    }
}

/// Bound the size of recorded output. Values whose JSON rendering exceeds
/// `max_chars` are replaced by the truncated rendering plus a marker.
pub fn truncate_output(value: &Value, max_chars: usize) -> Value {
    let rendered = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if rendered.chars().count() <= max_chars {
        return value.clone();
    }
    let mut truncated: String = rendered.chars().take(max_chars).collect();
    truncated.push_str(TRUNCATION_MARKER);
    Value::String(truncated)
}
