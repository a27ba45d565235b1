//! Emission Worker - drains unemitted audit events to the external sink
//!
//! Invoked on a fixed interval by an external scheduler. Each run:
//!
//! ```text
//! list_unemitted(batch_limit)
//!        │
//!        ▼
//! ┌──────────────────────────────┐
//! │ JoinSet, ≤ concurrency tasks │
//! │  push (with timeout)         │──► ok   → mark_emitted
//! │                              │──► err  → increment_failure
//! └──────────────────────────────┘
//! ```
//!
//! Each event is handled in its own task, so a failing or hanging push never
//! aborts the rest of the batch. Events stay eligible until emitted; there is
//! no dead-lettering, `emit_failures` only drives the `stuck` report.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::EmissionConfig;
use crate::error::{AuditResult, SinkError};
use crate::event::AuditEvent;
use crate::sink::AuditSink;
use crate::store::AuditStore;

/// Outcome of one worker run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmissionReport {
    /// Events picked up in this run
    pub attempted: usize,
    /// Events the sink accepted
    pub emitted: usize,
    /// Events whose push failed (failure counter incremented)
    pub failed: usize,
    /// Events whose outcome could not be recorded in the store
    pub bookkeeping_errors: usize,
    /// Ids of events that reached the alert threshold in this run
    pub stuck: Vec<String>,
}

enum Outcome {
    Emitted,
    Failed { failures: u32 },
    BookkeepingError,
}

/// Periodic drain of the audit store into an [`AuditSink`]
pub struct EmissionWorker {
    store: AuditStore,
    sink: Arc<dyn AuditSink>,
    config: EmissionConfig,
}

impl EmissionWorker {
    pub fn new(store: AuditStore, sink: Arc<dyn AuditSink>, config: EmissionConfig) -> AuditResult<Self> {
        config.validate()?;
        Ok(Self { store, sink, config })
    }

    pub fn config(&self) -> &EmissionConfig {
        &self.config
    }

    /// Run one drain pass.
    ///
    /// Only a failure to list the batch is returned as an error; per-event
    /// failures are absorbed into the report.
    pub async fn run_once(&self) -> AuditResult<EmissionReport> {
        let batch = self.store.list_unemitted(self.config.batch_limit).await?;
        let mut report = EmissionReport {
            attempted: batch.len(),
            ..Default::default()
        };

        if batch.is_empty() {
            tracing::debug!(sink = self.sink.name(), "No unemitted audit events");
            return Ok(report);
        }

        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks = JoinSet::new();

        for event in batch {
            let permits = Arc::clone(&permits);
            let store = self.store.clone();
            let sink = Arc::clone(&self.sink);
            let config = self.config.clone();

            tasks.spawn(async move {
                // The semaphore is never closed
                let _permit = permits.acquire_owned().await.ok();
                let outcome = emit_one(&store, sink.as_ref(), &config, &event).await;
                (event.id, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Outcome::Emitted)) => report.emitted += 1,
                Ok((id, Outcome::Failed { failures })) => {
                    report.failed += 1;
                    if failures >= self.config.alert_threshold {
                        report.stuck.push(id);
                    }
                }
                Ok((_, Outcome::BookkeepingError)) => report.bookkeeping_errors += 1,
                Err(e) => {
                    tracing::error!(error = %e, "Emission task aborted");
                    report.bookkeeping_errors += 1;
                }
            }
        }

        tracing::info!(
            sink = self.sink.name(),
            attempted = report.attempted,
            emitted = report.emitted,
            failed = report.failed,
            stuck = report.stuck.len(),
            "Emission run finished"
        );

        Ok(report)
    }
}

async fn emit_one(
    store: &AuditStore,
    sink: &dyn AuditSink,
    config: &EmissionConfig,
    event: &AuditEvent,
) -> Outcome {
    let payload = event.to_sink_event();
    let pushed = match tokio::time::timeout(config.push_timeout(), sink.push(&payload)).await {
        Ok(result) => result,
        Err(_) => Err(SinkError::Timeout(config.push_timeout_ms)),
    };

    match pushed {
        Ok(()) => match store.mark_emitted(&event.id).await {
            Ok(_) => Outcome::Emitted,
            Err(e) => {
                tracing::error!(event_id = %event.id, error = %e, "Failed to mark event emitted");
                Outcome::BookkeepingError
            }
        },
        Err(push_error) => {
            let failures = event.emit_failures + 1;
            if failures >= config.alert_threshold {
                tracing::warn!(
                    event_id = %event.id,
                    failures,
                    error = %push_error,
                    "Audit event stuck above failure threshold"
                );
            } else {
                tracing::warn!(event_id = %event.id, failures, error = %push_error, "Audit push failed");
            }

            match store.increment_failure(&event.id).await {
                Ok(_) => Outcome::Failed { failures },
                Err(e) => {
                    tracing::error!(event_id = %event.id, error = %e, "Failed to record push failure");
                    Outcome::BookkeepingError
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AuditRecord;
    use crate::sink::MemorySink;
    use std::time::Duration;

    async fn seed(store: &AuditStore, n: usize) -> Vec<String> {
        let mut ids = Vec::new();
        for i in 0..n {
            let record = AuditRecord::new("transfer.created", "pending_transfer", format!("TRF-{i}"), "maker");
            ids.push(store.append(record).await.unwrap());
        }
        ids
    }

    fn worker(store: &AuditStore, sink: Arc<MemorySink>, config: EmissionConfig) -> EmissionWorker {
        EmissionWorker::new(store.clone(), sink, config).unwrap()
    }

    #[tokio::test]
    async fn test_all_events_emitted() {
        let store = AuditStore::in_memory().await.unwrap();
        let ids = seed(&store, 4).await;
        let sink = Arc::new(MemorySink::new());

        let report = worker(&store, sink.clone(), EmissionConfig::default()).run_once().await.unwrap();

        assert_eq!(report.attempted, 4);
        assert_eq!(report.emitted, 4);
        assert_eq!(report.failed, 0);
        assert_eq!(sink.delivered().len(), 4);
        for id in ids {
            assert!(store.get(&id).await.unwrap().unwrap().is_emitted());
        }
        assert!(store.list_unemitted(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_completeness() {
        let store = AuditStore::in_memory().await.unwrap();
        let ids = seed(&store, 5).await;
        let sink = Arc::new(MemorySink::new());
        sink.fail_first_attempts(1);
        let worker = worker(&store, sink.clone(), EmissionConfig::default());

        let first = worker.run_once().await.unwrap();
        assert_eq!(first.emitted, 0);
        assert_eq!(first.failed, 5);

        let second = worker.run_once().await.unwrap();
        assert_eq!(second.emitted, 5);

        for id in ids {
            let event = store.get(&id).await.unwrap().unwrap();
            assert!(event.emitted_at.is_some());
            assert_eq!(event.emit_failures, 1);
        }
    }

    #[tokio::test]
    async fn test_per_item_isolation() {
        let store = AuditStore::in_memory().await.unwrap();
        let ids = seed(&store, 6).await;
        let bad = ids[2].clone();
        let sink = Arc::new(MemorySink::new());
        sink.fail_always(bad.clone());

        let report = worker(&store, sink.clone(), EmissionConfig::default()).run_once().await.unwrap();

        assert_eq!(report.emitted, 5);
        assert_eq!(report.failed, 1);
        for id in &ids {
            let event = store.get(id).await.unwrap().unwrap();
            if *id == bad {
                assert!(event.emitted_at.is_none());
                assert_eq!(event.emit_failures, 1);
            } else {
                assert!(event.emitted_at.is_some());
                assert_eq!(event.emit_failures, 0);
            }
        }
    }

    #[tokio::test]
    async fn test_batch_limit_bounds_run() {
        let store = AuditStore::in_memory().await.unwrap();
        seed(&store, 7).await;
        let sink = Arc::new(MemorySink::new());
        let config = EmissionConfig {
            batch_limit: 3,
            ..Default::default()
        };
        let worker = worker(&store, sink.clone(), config);

        assert_eq!(worker.run_once().await.unwrap().emitted, 3);
        assert_eq!(worker.run_once().await.unwrap().emitted, 3);
        assert_eq!(worker.run_once().await.unwrap().emitted, 1);
        assert_eq!(worker.run_once().await.unwrap().attempted, 0);
        assert_eq!(sink.delivered().len(), 7);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let store = AuditStore::in_memory().await.unwrap();
        let ids = seed(&store, 2).await;
        let sink = Arc::new(MemorySink::new().with_delay(Duration::from_millis(200)));
        let config = EmissionConfig {
            push_timeout_ms: 20,
            ..Default::default()
        };

        let report = worker(&store, sink, config).run_once().await.unwrap();

        assert_eq!(report.failed, 2);
        for id in ids {
            assert_eq!(store.get(&id).await.unwrap().unwrap().emit_failures, 1);
        }
    }

    #[tokio::test]
    async fn test_stuck_events_reported() {
        let store = AuditStore::in_memory().await.unwrap();
        let ids = seed(&store, 1).await;
        let sink = Arc::new(MemorySink::new());
        sink.set_unavailable(true);
        let config = EmissionConfig {
            alert_threshold: 2,
            ..Default::default()
        };
        let worker = worker(&store, sink, config);

        assert!(worker.run_once().await.unwrap().stuck.is_empty());
        let report = worker.run_once().await.unwrap();
        assert_eq!(report.stuck, vec![ids[0].clone()]);

        // Still eligible: no dead-lettering
        assert_eq!(store.list_unemitted(10).await.unwrap().len(), 1);
        assert_eq!(store.stats(2).await.unwrap().stuck, 1);
    }

    #[tokio::test]
    async fn test_rejects_zero_concurrency() {
        let store = AuditStore::in_memory().await.unwrap();
        let config = EmissionConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(EmissionWorker::new(store, Arc::new(MemorySink::new()), config).is_err());
    }
}
