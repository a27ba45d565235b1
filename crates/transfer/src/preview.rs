//! Before/after view of a transfer's effect on ownership

use serde::{Deserialize, Serialize};
use tranche_core::distribution::{self, DistributionError, OwnershipRecord};
use tranche_ownership::MovementLeg;

use crate::error::{TransferError, TransferResult};
use crate::pending::PendingTransfer;

/// The distribution now and after the transfer would be applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipPreview {
    pub transfer: PendingTransfer,
    pub current_ownership: Vec<OwnershipRecord>,
    pub after_ownership: Vec<OwnershipRecord>,
}

impl OwnershipPreview {
    /// Derive the after-distribution from `current`.
    ///
    /// Fails with a drift conflict when the sender no longer holds enough.
    pub fn derive(transfer: PendingTransfer, current: Vec<OwnershipRecord>) -> TransferResult<Self> {
        let after = distribution::move_share(
            &current,
            &transfer.asset_id,
            &transfer.from_owner_id,
            &transfer.to_owner_id,
            transfer.percentage,
        )
        .map_err(|e| match e {
            DistributionError::InsufficientHolding { held, requested, .. } => TransferError::Drift {
                id: transfer.id.clone(),
                asset_id: transfer.asset_id.clone(),
                reason: format!(
                    "{} now holds {held}%, the transfer needs {requested}%",
                    transfer.from_owner_id
                ),
            },
            other => TransferError::Ownership(other.into()),
        })?;

        Ok(Self {
            transfer,
            current_ownership: current,
            after_ownership: after,
        })
    }

    /// Rebuild the view of a transfer whose movement is already reflected
    /// in `after`, by moving the share back.
    pub fn reconstruct(transfer: PendingTransfer, after: Vec<OwnershipRecord>) -> TransferResult<Self> {
        let before = distribution::move_share(
            &after,
            &transfer.asset_id,
            &transfer.to_owner_id,
            &transfer.from_owner_id,
            transfer.percentage,
        )
        .map_err(|e| match e {
            DistributionError::InsufficientHolding { held, .. } => TransferError::Drift {
                id: transfer.id.clone(),
                asset_id: transfer.asset_id.clone(),
                reason: format!(
                    "{} holds {held}% after the movement, less than the {}% it received",
                    transfer.to_owner_id, transfer.percentage
                ),
            },
            other => TransferError::Ownership(other.into()),
        })?;

        Ok(Self {
            transfer,
            current_ownership: before,
            after_ownership: after,
        })
    }

    /// The movement that turns `current_ownership` into `after_ownership`
    pub fn legs(&self) -> Vec<MovementLeg> {
        MovementLeg::transfer(
            &self.transfer.asset_id,
            &self.transfer.from_owner_id,
            &self.transfer.to_owner_id,
            self.transfer.percentage,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tranche_core::{AssetId, ErrorKind, OwnerId, Percentage};

    fn asset() -> AssetId {
        AssetId::new("A1").unwrap()
    }

    fn transfer(from: OwnerId, pct: rust_decimal::Decimal) -> PendingTransfer {
        PendingTransfer::new(
            "deal-1",
            asset(),
            from,
            OwnerId::new("INV-2").unwrap(),
            Percentage::new(pct).unwrap(),
            "maker",
        )
    }

    #[test]
    fn test_preview_creates_receiver_row() {
        let current = vec![OwnershipRecord::pool_owned(asset())];
        let preview = OwnershipPreview::derive(transfer(OwnerId::pool(), dec!(40)), current.clone()).unwrap();

        assert_eq!(preview.current_ownership, current);
        assert_eq!(preview.after_ownership.len(), 2);
        assert_eq!(preview.after_ownership[0].percentage.value(), dec!(60));
        assert_eq!(preview.after_ownership[1].owner_id.as_str(), "INV-2");
        assert!(distribution::is_settled(&preview.after_ownership));
        assert_eq!(preview.legs().len(), 2);
    }

    #[test]
    fn test_preview_drops_emptied_sender() {
        let inv1 = OwnerId::new("INV-1").unwrap();
        let current = distribution::normalize(&asset(), [(OwnerId::pool(), dec!(80)), (inv1.clone(), dec!(20))]).unwrap();
        let preview = OwnershipPreview::derive(transfer(inv1.clone(), dec!(20)), current).unwrap();

        assert!(preview.after_ownership.iter().all(|r| r.owner_id != inv1));
        assert!(distribution::is_settled(&preview.after_ownership));
    }

    #[test]
    fn test_preview_insufficient_is_drift_conflict() {
        let inv1 = OwnerId::new("INV-1").unwrap();
        let current = distribution::normalize(&asset(), [(OwnerId::pool(), dec!(90)), (inv1.clone(), dec!(10))]).unwrap();
        let err = OwnershipPreview::derive(transfer(inv1, dec!(15)), current).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("drifted"));
    }

    #[test]
    fn test_reconstruct_reverses_the_move() {
        let current = vec![OwnershipRecord::pool_owned(asset())];
        let derived = OwnershipPreview::derive(transfer(OwnerId::pool(), dec!(40)), current).unwrap();

        let rebuilt =
            OwnershipPreview::reconstruct(derived.transfer.clone(), derived.after_ownership.clone()).unwrap();
        assert_eq!(rebuilt, derived);

        let err = OwnershipPreview::reconstruct(
            transfer(OwnerId::pool(), dec!(40)),
            vec![OwnershipRecord::pool_owned(asset())],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
