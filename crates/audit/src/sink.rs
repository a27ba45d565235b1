//! External audit/compliance sink
//!
//! The Emission Worker pushes [`SinkEvent`]s through the [`AuditSink`] trait.
//! Two implementations ship here: [`JsonlSink`], an append-only JSONL file
//! where each line carries a SHA256 digest of its payload, and [`MemorySink`]
//! for tests, with configurable failure injection.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::SinkError;
use crate::event::SinkEvent;

/// Destination for emitted audit events
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Sink name for logging
    fn name(&self) -> &str;

    /// Deliver one event. Must be safe to call again with the same event
    /// after a failure or timeout.
    async fn push(&self, event: &SinkEvent) -> Result<(), SinkError>;
}

/// One line of a [`JsonlSink`] file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkEnvelope {
    /// SHA256 (hex) of the serialized event
    pub digest: String,
    pub event: SinkEvent,
}

/// Append-only JSONL sink
///
/// File writes run on tokio's blocking pool so pushes never stall the
/// emission tasks.
pub struct JsonlSink {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl JsonlSink {
    /// Open (or create) the sink file, creating parent directories if needed
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every envelope written so far
    pub fn read_all(&self) -> Result<Vec<SinkEnvelope>, SinkError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut envelopes = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            envelopes.push(serde_json::from_str(&line)?);
        }

        Ok(envelopes)
    }
}

fn digest(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl AuditSink for JsonlSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn push(&self, event: &SinkEvent) -> Result<(), SinkError> {
        let payload = serde_json::to_string(event)?;
        let envelope = SinkEnvelope {
            digest: digest(&payload),
            event: event.clone(),
        };
        let line = serde_json::to_string(&envelope)?;

        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || -> Result<(), SinkError> {
            let mut file = file
                .lock()
                .map_err(|_| SinkError::Unavailable("sink file lock poisoned".to_string()))?;
            writeln!(file, "{}", line)?;
            file.flush()?;
            Ok(())
        })
        .await
        .map_err(|e| SinkError::Unavailable(format!("sink write task failed: {e}")))?
    }
}

#[derive(Default)]
struct MemorySinkState {
    delivered: Vec<SinkEvent>,
    attempts: HashMap<String, u32>,
    fail_first: u32,
    always_fail: HashSet<String>,
    unavailable: bool,
}

/// In-memory sink for testing
///
/// Failures can be injected per event (`fail_always`), for the first N
/// attempts of every event (`fail_first_attempts`), or globally
/// (`set_unavailable`). A delay can be added to exercise push timeouts.
#[derive(Default)]
pub struct MemorySink {
    state: Mutex<MemorySinkState>,
    delay: Option<Duration>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every push
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the first `n` attempts for every event
    pub fn fail_first_attempts(&self, n: u32) {
        self.lock().fail_first = n;
    }

    /// Always fail pushes of this event id
    pub fn fail_always(&self, event_id: impl Into<String>) {
        self.lock().always_fail.insert(event_id.into());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Events accepted so far, in delivery order
    pub fn delivered(&self) -> Vec<SinkEvent> {
        self.lock().delivered.clone()
    }

    /// Push attempts made for one event id
    pub fn attempts(&self, event_id: &str) -> u32 {
        self.lock().attempts.get(event_id).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemorySinkState> {
        // A poisoned lock only means another test thread panicked mid-push
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn push(&self, event: &SinkEvent) -> Result<(), SinkError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        let attempt = {
            let counter = state.attempts.entry(event.id.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        if state.unavailable {
            return Err(SinkError::Unavailable("sink offline".to_string()));
        }
        if state.always_fail.contains(&event.id) {
            return Err(SinkError::Rejected {
                event_id: event.id.clone(),
                reason: "injected failure".to_string(),
            });
        }
        if attempt <= state.fail_first {
            return Err(SinkError::Unavailable(format!("attempt {attempt} failed")));
        }

        state.delivered.push(event.clone());
        Ok(())
    }
}
