//! Ownership distributions
//!
//! A distribution is the full list of [`OwnershipRecord`]s for one asset.
//! Every function here returns distributions in normalized form:
//! one row per owner, no zero rows, pool first and then owners by id.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::ids::{AssetId, OwnerId};
use crate::percentage::{Percentage, PercentageError};

/// Errors raised while building or changing a distribution
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DistributionError {
    #[error("Ownership of asset {asset_id} sums to {total}%, expected 100%")]
    NotSettled { asset_id: AssetId, total: Decimal },

    #[error(
        "Owner {owner_id} holds {held}% of asset {asset_id}, cannot move {requested}%"
    )]
    InsufficientHolding {
        asset_id: AssetId,
        owner_id: OwnerId,
        held: Decimal,
        requested: Decimal,
    },

    #[error("Owner {owner_id} would hold more than 100% of asset {asset_id}")]
    Overflow { asset_id: AssetId, owner_id: OwnerId },

    #[error("Invalid share for owner {owner_id}: {source}")]
    InvalidShare {
        owner_id: OwnerId,
        #[source]
        source: PercentageError,
    },
}

/// One owner's share of one asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    pub asset_id: AssetId,
    pub owner_id: OwnerId,
    pub percentage: Percentage,
}

impl OwnershipRecord {
    pub fn new(asset_id: AssetId, owner_id: OwnerId, percentage: Percentage) -> Self {
        Self {
            asset_id,
            owner_id,
            percentage,
        }
    }

    /// The whole asset held by the platform pool
    pub fn pool_owned(asset_id: AssetId) -> Self {
        Self::new(asset_id, OwnerId::pool(), Percentage::HUNDRED)
    }
}

/// Build a normalized distribution from raw `(owner, share)` pairs.
///
/// Duplicate owners are merged and zero shares dropped. Fails if any merged
/// share falls outside `0..=100`.
pub fn normalize<I>(asset_id: &AssetId, shares: I) -> Result<Vec<OwnershipRecord>, DistributionError>
where
    I: IntoIterator<Item = (OwnerId, Decimal)>,
{
    let mut merged: BTreeMap<OwnerId, Decimal> = BTreeMap::new();
    for (owner_id, share) in shares {
        *merged.entry(owner_id).or_insert(Decimal::ZERO) += share;
    }

    let mut records = Vec::with_capacity(merged.len());
    for (owner_id, share) in merged {
        if share.is_zero() {
            continue;
        }
        let percentage = Percentage::new(share).map_err(|source| DistributionError::InvalidShare {
            owner_id: owner_id.clone(),
            source,
        })?;
        records.push(OwnershipRecord::new(asset_id.clone(), owner_id, percentage));
    }

    sort(&mut records);
    Ok(records)
}

fn sort(records: &mut [OwnershipRecord]) {
    records.sort_by(|a, b| {
        (!a.owner_id.is_pool(), &a.owner_id).cmp(&(!b.owner_id.is_pool(), &b.owner_id))
    });
}

/// Sum of all shares
pub fn total(records: &[OwnershipRecord]) -> Decimal {
    records.iter().map(|r| r.percentage.value()).sum()
}

/// Whether the shares sum to exactly 100
pub fn is_settled(records: &[OwnershipRecord]) -> bool {
    total(records) == Decimal::ONE_HUNDRED
}

pub fn ensure_settled(asset_id: &AssetId, records: &[OwnershipRecord]) -> Result<(), DistributionError> {
    if is_settled(records) {
        Ok(())
    } else {
        Err(DistributionError::NotSettled {
            asset_id: asset_id.clone(),
            total: total(records),
        })
    }
}

/// Share currently held by `owner_id` (zero if absent)
pub fn holding_of(records: &[OwnershipRecord], owner_id: &OwnerId) -> Percentage {
    records
        .iter()
        .find(|r| &r.owner_id == owner_id)
        .map(|r| r.percentage)
        .unwrap_or(Percentage::ZERO)
}

/// Derive the distribution after moving `percentage` from `from` to `to`.
///
/// Never clamps: if `from` holds less than `percentage` the move fails with
/// [`DistributionError::InsufficientHolding`].
pub fn move_share(
    records: &[OwnershipRecord],
    asset_id: &AssetId,
    from: &OwnerId,
    to: &OwnerId,
    percentage: Percentage,
) -> Result<Vec<OwnershipRecord>, DistributionError> {
    let held = holding_of(records, from);
    let remaining = held
        .checked_sub(&percentage)
        .ok_or_else(|| DistributionError::InsufficientHolding {
            asset_id: asset_id.clone(),
            owner_id: from.clone(),
            held: held.value(),
            requested: percentage.value(),
        })?;
    let received = holding_of(records, to)
        .checked_add(&percentage)
        .ok_or_else(|| DistributionError::Overflow {
            asset_id: asset_id.clone(),
            owner_id: to.clone(),
        })?;

    let shares = records
        .iter()
        .filter(|r| &r.owner_id != from && &r.owner_id != to)
        .map(|r| (r.owner_id.clone(), r.percentage.value()))
        .chain([
            (from.clone(), remaining.value()),
            (to.clone(), received.value()),
        ]);

    normalize(asset_id, shares)
}
