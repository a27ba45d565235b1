//! Application context - wires everything together

use std::sync::Arc;

use tranche_audit::{AuditStore, EmissionWorker, JsonlSink, RetentionSweeper};
use tranche_ownership::{OwnershipBook, OwnershipTable};
use tranche_transfer::{StaticDirectory, TransferStore, TransferWorkflow};

use crate::config::EngineConfig;

/// Application context - wires together all components
pub struct AppContext {
    pub workflow: TransferWorkflow,
    pub audit: AuditStore,
    pub table: OwnershipTable,
    config: EngineConfig,
}

impl AppContext {
    /// Open the database and build the workflow.
    ///
    /// No network ledger client ships with the CLI, so a `ledger` ownership
    /// source is refused here.
    pub async fn new(config: EngineConfig) -> Result<Self, anyhow::Error> {
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let table = OwnershipTable::open(&config.database_path).await?;
        let transfers = TransferStore::open(&config.database_path).await?;
        let audit = AuditStore::open(&config.database_path).await?;

        let book = OwnershipBook::from_source(
            config.ownership_source,
            table.clone(),
            None,
            config.ledger_timeout(),
        )?;
        let directory = Arc::new(StaticDirectory::new(config.investors.iter().cloned()));
        let workflow = TransferWorkflow::new(transfers, book, audit.clone(), directory);

        tracing::debug!(
            database = %config.database_path.display(),
            source = %config.ownership_source,
            "Context ready"
        );

        Ok(Self {
            workflow,
            audit,
            table,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Emission worker pushing into the configured JSONL sink
    pub fn emission_worker(&self) -> Result<EmissionWorker, anyhow::Error> {
        let sink = Arc::new(JsonlSink::new(&self.config.sink_path)?);
        Ok(EmissionWorker::new(self.audit.clone(), sink, self.config.emission.clone())?)
    }

    pub fn retention_sweeper(&self) -> Result<RetentionSweeper, anyhow::Error> {
        Ok(RetentionSweeper::new(self.audit.clone(), self.config.retention.clone())?)
    }
}
