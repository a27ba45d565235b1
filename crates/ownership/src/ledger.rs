//! External ledger client interface

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tranche_core::{AssetId, OwnerId, Percentage};

use crate::error::{LedgerError, OwnershipError, OwnershipResult};

/// One owner's balance as reported by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBalance {
    pub owner_id: OwnerId,
    pub percentage: Decimal,
}

/// One side of a movement. Legs of a movement sum to zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementLeg {
    pub asset_id: AssetId,
    pub owner_id: OwnerId,
    /// Signed change in percentage points
    pub delta: Decimal,
}

impl MovementLeg {
    /// The debit/credit pair moving `percentage` from `from` to `to`
    pub fn transfer(asset_id: &AssetId, from: &OwnerId, to: &OwnerId, percentage: Percentage) -> Vec<Self> {
        vec![
            Self {
                asset_id: asset_id.clone(),
                owner_id: from.clone(),
                delta: -percentage.value(),
            },
            Self {
                asset_id: asset_id.clone(),
                owner_id: to.clone(),
                delta: percentage.value(),
            },
        ]
    }
}

/// Check that legs target `asset_id` only and balance to zero
pub fn validate_legs(asset_id: &AssetId, legs: &[MovementLeg]) -> OwnershipResult<()> {
    if legs.is_empty() {
        return Err(OwnershipError::InvalidMovement("movement has no legs".to_string()));
    }
    if let Some(leg) = legs.iter().find(|l| &l.asset_id != asset_id) {
        return Err(OwnershipError::InvalidMovement(format!(
            "leg for asset {} in movement on asset {}",
            leg.asset_id, asset_id
        )));
    }
    let net: Decimal = legs.iter().map(|l| l.delta).sum();
    if !net.is_zero() {
        return Err(OwnershipError::InvalidMovement(format!(
            "legs do not balance (net {net})"
        )));
    }
    Ok(())
}

/// Result of submitting a movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementReceipt {
    pub idempotency_key: String,
    /// `false` when the key had already been applied and this call was a replay
    pub applied: bool,
}

/// External ledger service
///
/// Implementations must honour idempotency keys: submitting the same key
/// twice applies the movement at most once.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Client name for logging
    fn name(&self) -> &str;

    /// Current balances for an asset
    async fn get_balances(&self, asset_id: &AssetId) -> Result<Vec<LedgerBalance>, LedgerError>;

    /// Apply a balanced set of legs, keyed for idempotency
    async fn submit_movement(
        &self,
        idempotency_key: &str,
        legs: &[MovementLeg],
    ) -> Result<MovementReceipt, LedgerError>;

    /// Whether a movement under this key has been applied.
    ///
    /// Lets a caller whose submit timed out find out if the ledger
    /// committed it anyway.
    async fn movement_applied(&self, idempotency_key: &str) -> Result<bool, LedgerError>;
}
