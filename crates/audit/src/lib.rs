//! Tranche Audit - Durable, sanitized audit trail
//!
//! Every state-changing action in Tranche is appended here as an
//! [`AuditEvent`] and later pushed to an external compliance sink.
//!
//! ```text
//! Transfer workflow
//!        │ AuditRecord
//!        ▼
//! ┌─────────────────┐
//! │ Sanitizer       │──► deny-listed fields → "[REDACTED]"
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐      ┌──────────────────┐
//! │ AuditStore      │◄────►│ EmissionWorker   │──► AuditSink
//! │ (SQLite)        │      │ (per-event retry)│
//! └────────┬────────┘      └──────────────────┘
//!          ▼
//!   RetentionSweeper (bounded batch deletes)
//! ```
//!
//! ## Key Components
//!
//! - [`sanitize::SanitizerPolicy`] - Maintained PII deny list
//! - [`store::AuditStore`] - Append-only SQLite log with emission bookkeeping
//! - [`sink::AuditSink`] - External compliance sink interface
//! - [`emitter::EmissionWorker`] - Periodic drain of unemitted events
//! - [`retention::RetentionSweeper`] - Periodic trim of expired events

pub mod config;
pub mod emitter;
pub mod error;
pub mod event;
pub mod retention;
pub mod sanitize;
pub mod sink;
pub mod store;

pub use config::{EmissionConfig, RetentionConfig};
pub use emitter::{EmissionReport, EmissionWorker};
pub use error::{AuditError, AuditResult, SinkError};
pub use event::{AuditEvent, AuditRecord, SinkEvent};
pub use retention::{RetentionSweeper, SweepReport};
pub use sanitize::{sanitize, SanitizerPolicy, REDACTED};
pub use sink::{AuditSink, JsonlSink, MemorySink};
pub use store::{AuditStats, AuditStore};
