//! Append-only audit persistence for action events.
//!
//! The permission manager hands every execution record to an [`AuditSink`].
//! Sink failures are reported to the caller of `record`, which logs and
//! swallows them so auditing never breaks execution.

use async_trait::async_trait;
use platform_core::config::{AuditConfig, AuditSinkKind};
use platform_core::error::PlatformError;
use platform_core::events::{ActionEvent, ActionEventKind};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::AsyncWriteExt;

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &ActionEvent) -> Result<(), PlatformError>;
}

/// In-memory audit log, inspectable by tests and the CLI.
#[derive(Default)]
pub struct MemoryAuditLog {
    events: Mutex<Vec<ActionEvent>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ActionEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn events_of(&self, kind: ActionEventKind) -> Vec<ActionEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn record(&self, event: &ActionEvent) -> Result<(), PlatformError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

/// Writes each record as a structured log line on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record(&self, event: &ActionEvent) -> Result<(), PlatformError> {
        tracing::info!(
            target: "audit",
            event = event.event_name(),
            action_id = %event.action_id,
            user_id = event.user_id.as_deref().unwrap_or("-"),
            organization_id = event.organization_id.as_deref().unwrap_or("-"),
            error = event.error.as_deref().unwrap_or(""),
            "audit"
        );
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
pub struct JsonlAuditSink {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, event: &ActionEvent) -> Result<(), PlatformError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        self.append(line.as_bytes())
            .await
            .map_err(|e| PlatformError::Audit(format!("{}: {}", self.path.display(), e)))
    }
}

impl JsonlAuditSink {
    async fn append(&self, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await
    }
}

/// Build the sink selected in configuration.
pub fn sink_from_config(config: &AuditConfig) -> Arc<dyn AuditSink> {
    match config.sink {
        AuditSinkKind::Memory => Arc::new(MemoryAuditLog::new()),
        AuditSinkKind::Log => Arc::new(LogAuditSink),
        AuditSinkKind::Jsonl => Arc::new(JsonlAuditSink::new(config.path.clone())),
    }
}
