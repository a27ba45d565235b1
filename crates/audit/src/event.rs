//! Audit event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored audit event.
///
/// Immutable once written, except for the emission bookkeeping fields
/// `emitted_at` and `emit_failures`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    /// Dotted event name, e.g. `transfer.approved`
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub actor_user_id: String,
    pub timestamp: DateTime<Utc>,
    /// Sanitized snapshot before the change
    pub before_state: Option<Value>,
    /// Sanitized snapshot after the change
    pub after_state: Option<Value>,
    pub metadata: Option<Value>,
    /// Set once the sink accepted the event
    pub emitted_at: Option<DateTime<Utc>>,
    /// Failed push attempts so far
    pub emit_failures: u32,
}

impl AuditEvent {
    pub fn is_emitted(&self) -> bool {
        self.emitted_at.is_some()
    }

    /// The payload pushed to the external sink
    pub fn to_sink_event(&self) -> SinkEvent {
        SinkEvent {
            id: self.id.clone(),
            event_type: self.event_type.clone(),
            entity_type: self.entity_type.clone(),
            entity_id: self.entity_id.clone(),
            actor_user_id: self.actor_user_id.clone(),
            timestamp: self.timestamp,
            before_state: self.before_state.clone(),
            after_state: self.after_state.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Audit event as seen by the external sink (no local bookkeeping)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkEvent {
    pub id: String,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub actor_user_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_state: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_state: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// An event to append, before the store assigns id and timestamp.
///
/// # Example
/// ```
/// use tranche_audit::AuditRecord;
/// use serde_json::json;
///
/// let record = AuditRecord::new("transfer.rejected", "pending_transfer", "TRF-1", "reviewer-1")
///     .metadata(json!({ "reason": "address mismatch" }));
/// assert_eq!(record.event_type, "transfer.rejected");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub actor_user_id: String,
    pub before_state: Option<Value>,
    pub after_state: Option<Value>,
    pub metadata: Option<Value>,
}

impl AuditRecord {
    pub fn new(
        event_type: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        actor_user_id: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            actor_user_id: actor_user_id.into(),
            before_state: None,
            after_state: None,
            metadata: None,
        }
    }

    pub fn before(mut self, state: Value) -> Self {
        self.before_state = Some(state);
        self
    }

    pub fn after(mut self, state: Value) -> Self {
        self.after_state = Some(state);
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
