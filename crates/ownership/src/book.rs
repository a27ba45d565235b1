//! Ownership Book - the single read/write path for current ownership
//!
//! Built over exactly one authoritative store. Callers never see which one
//! beyond [`OwnershipBook::source`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tranche_core::distribution::{self, OwnershipRecord};
use tranche_core::AssetId;

use crate::config::OwnershipSource;
use crate::error::{LedgerError, OwnershipError, OwnershipResult};
use crate::ledger::{validate_legs, LedgerClient, MovementLeg, MovementReceipt};
use crate::table::OwnershipTable;

#[derive(Clone)]
enum Backend {
    Ledger {
        client: Arc<dyn LedgerClient>,
        timeout: Duration,
    },
    Local(OwnershipTable),
}

/// Reads and moves ownership against the configured source of truth
#[derive(Clone)]
pub struct OwnershipBook {
    backend: Backend,
}

impl OwnershipBook {
    /// Local table is authoritative
    pub fn local(table: OwnershipTable) -> Self {
        Self {
            backend: Backend::Local(table),
        }
    }

    /// External ledger is authoritative; every call is bounded by `timeout`
    pub fn ledger(client: Arc<dyn LedgerClient>, timeout: Duration) -> Self {
        Self {
            backend: Backend::Ledger { client, timeout },
        }
    }

    /// Build from configuration. A ledger source needs a client.
    pub fn from_source(
        source: OwnershipSource,
        table: OwnershipTable,
        client: Option<Arc<dyn LedgerClient>>,
        timeout: Duration,
    ) -> OwnershipResult<Self> {
        match (source, client) {
            (OwnershipSource::Local, _) => Ok(Self::local(table)),
            (OwnershipSource::Ledger, Some(client)) => Ok(Self::ledger(client, timeout)),
            (OwnershipSource::Ledger, None) => Err(OwnershipError::Config(
                "ownership source is 'ledger' but no ledger client is configured".to_string(),
            )),
        }
    }

    pub fn source(&self) -> OwnershipSource {
        match self.backend {
            Backend::Ledger { .. } => OwnershipSource::Ledger,
            Backend::Local(_) => OwnershipSource::Local,
        }
    }

    /// The local table, when it is the source of truth
    pub fn local_table(&self) -> Option<&OwnershipTable> {
        match &self.backend {
            Backend::Local(table) => Some(table),
            Backend::Ledger { .. } => None,
        }
    }

    /// Current distribution of an asset, normalized and settled.
    ///
    /// Fails with [`OwnershipError::UnknownAsset`] when the source has no
    /// rows, and with a distribution error when the rows do not sum to 100.
    pub async fn get_ownership_distribution(&self, asset_id: &AssetId) -> OwnershipResult<Vec<OwnershipRecord>> {
        let shares = match &self.backend {
            Backend::Ledger { client, timeout } => {
                let balances = bounded(*timeout, client.get_balances(asset_id)).await.map_err(|e| {
                    tracing::warn!(
                        ledger = client.name(),
                        asset_id = %asset_id,
                        error = %e,
                        "Ledger balance read failed"
                    );
                    e
                })?;
                balances.into_iter().map(|b| (b.owner_id, b.percentage)).collect::<Vec<_>>()
            }
            Backend::Local(table) => table.rows(asset_id).await?,
        };

        let records = distribution::normalize(asset_id, shares)?;
        if records.is_empty() {
            return Err(OwnershipError::UnknownAsset(asset_id.clone()));
        }
        distribution::ensure_settled(asset_id, &records)?;
        Ok(records)
    }

    /// Whether a movement under `idempotency_key` has already been applied
    /// at the source of truth.
    pub async fn is_applied(&self, idempotency_key: &str) -> OwnershipResult<bool> {
        match &self.backend {
            Backend::Local(table) => table.is_applied(idempotency_key).await,
            Backend::Ledger { client, timeout } => {
                let applied = bounded(*timeout, client.movement_applied(idempotency_key))
                    .await
                    .map_err(|e| {
                        tracing::warn!(
                            ledger = client.name(),
                            idempotency_key,
                            error = %e,
                            "Ledger movement lookup failed"
                        );
                        e
                    })?;
                Ok(applied)
            }
        }
    }

    /// Apply a balanced movement keyed by `idempotency_key`.
    ///
    /// `expected_before` is the distribution the caller derived the movement
    /// from. The local table checks it inside its transaction; the ledger
    /// path re-reads balances just before submitting.
    pub async fn apply_movement(
        &self,
        idempotency_key: &str,
        asset_id: &AssetId,
        legs: &[MovementLeg],
        expected_before: &[OwnershipRecord],
    ) -> OwnershipResult<MovementReceipt> {
        validate_legs(asset_id, legs)?;

        let receipt = match &self.backend {
            Backend::Local(table) => {
                table
                    .apply_movement(idempotency_key, asset_id, legs, expected_before)
                    .await?
            }
            Backend::Ledger { client, timeout } => {
                let current = self.get_ownership_distribution(asset_id).await?;
                if current != expected_before {
                    return Err(OwnershipError::Drift(asset_id.clone()));
                }
                bounded(*timeout, client.submit_movement(idempotency_key, legs))
                    .await
                    .map_err(|e| {
                        tracing::warn!(
                            ledger = client.name(),
                            idempotency_key,
                            asset_id = %asset_id,
                            error = %e,
                            "Ledger movement failed"
                        );
                        e
                    })?
            }
        };

        tracing::info!(
            source = %self.source(),
            idempotency_key,
            asset_id = %asset_id,
            applied = receipt.applied,
            "Ownership movement submitted"
        );

        Ok(receipt)
    }
}

async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, LedgerError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::Timeout(timeout.as_millis() as u64)),
    }
}
