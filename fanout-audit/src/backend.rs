//! Audit log storage backends

use crate::AuditEvent;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Audit log storage backend trait
#[async_trait]
pub trait AuditBackend: Send + Sync {
    /// Write an audit event
    async fn write(&self, event: &AuditEvent) -> Result<(), AuditBackendError>;

    /// Flush any pending writes
    async fn flush(&self) -> Result<(), AuditBackendError> {
        Ok(())
    }
}

/// Audit backend errors
#[derive(Debug, thiserror::Error)]
pub enum AuditBackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Other(String),
}

/// Emits each event as an `[AUDIT]` line through `tracing`.
///
/// Lines go to the `audit` target at INFO, so they can be routed with a
/// filter such as `audit=info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBackend;

impl TracingBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditBackend for TracingBackend {
    async fn write(&self, event: &AuditEvent) -> Result<(), AuditBackendError> {
        tracing::info!(
            target: "audit",
            audit_id = %event.id,
            event_type = %event.event_type,
            "{}",
            event.log_line()
        );
        Ok(())
    }
}

/// File-based audit backend
///
/// Appends one JSON object per line. Writes are serialized so concurrent
/// listeners never interleave lines.
pub struct FileBackend {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileBackend {
    /// Create a new file backend
    ///
    /// ```no_run
    /// use fanout_audit::FileBackend;
    ///
    /// let backend = FileBackend::new("audit.log");
    /// ```
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path written to
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl AuditBackend for FileBackend {
    async fn write(&self, event: &AuditEvent) -> Result<(), AuditBackendError> {
        let mut line = event.to_json()?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }
}

/// Memory backend for testing
#[derive(Clone, Default)]
pub struct MemoryBackend {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryBackend {
    /// Create a new memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all events, oldest first
    pub async fn get_events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }

    /// Events recorded for one event type
    pub async fn events_of(&self, event_type: &str) -> Vec<AuditEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Clear all events
    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

#[async_trait]
impl AuditBackend for MemoryBackend {
    async fn write(&self, event: &AuditEvent) -> Result<(), AuditBackendError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_backend() {
        let backend = MemoryBackend::new();
        backend
            .write(&AuditEvent::new("contact.created", json!({ "id": 1 })))
            .await
            .unwrap();
        backend
            .write(&AuditEvent::new("contact.deleted", json!({ "id": 1 })))
            .await
            .unwrap();

        assert_eq!(backend.get_events().await.len(), 2);
        assert_eq!(backend.events_of("contact.deleted").await.len(), 1);

        backend.clear().await;
        assert!(backend.get_events().await.is_empty());
    }

    #[tokio::test]
    async fn test_file_backend_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("audit.log"));

        backend
            .write(&AuditEvent::new("contact.created", json!({ "id": 1 })))
            .await
            .unwrap();
        backend
            .write(&AuditEvent::new("contact.updated", json!({ "id": 1, "changes": {} })))
            .await
            .unwrap();
        backend.flush().await.unwrap();

        let contents = tokio::fs::read_to_string(backend.path()).await.unwrap();
        let events: Vec<AuditEvent> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, "contact.updated");
    }

    #[tokio::test]
    async fn test_file_backend_reports_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("missing").join("audit.log"));

        let err = backend
            .write(&AuditEvent::new("contact.created", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditBackendError::Io(_)));
    }

    #[tokio::test]
    async fn test_tracing_backend_never_fails() {
        TracingBackend::new()
            .write(&AuditEvent::new("contact.deleted", json!({ "id": 2 })))
            .await
            .unwrap();
    }
}
