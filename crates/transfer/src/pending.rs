//! Pending transfer data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tranche_core::{timestamp, AssetId, OwnerId, Percentage};

/// Status of a transfer proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransferStatus {
    /// Awaiting a reviewer
    Pending,
    /// Reviewed and applied to the source of truth
    Approved,
    /// Reviewed and refused
    Rejected,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Approved => "approved",
            TransferStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferStatus::Pending)
    }
}

/// One maker-checker proposal to move `percentage` of an asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransfer {
    /// Unique identifier, also the idempotency key of the movement
    pub id: String,

    pub deal_id: String,
    pub asset_id: AssetId,
    pub from_owner_id: OwnerId,

    /// Always an investor, never the pool
    pub to_owner_id: OwnerId,

    pub percentage: Percentage,
    pub status: TransferStatus,

    pub created_at: DateTime<Utc>,

    /// The maker
    pub created_by: String,

    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub review_notes: Option<String>,

    /// Rejections in this proposal's resubmission chain before it
    pub rejection_count: u32,

    /// The rejected transfer this one resubmits
    pub previous_transfer_id: Option<String>,
}

impl PendingTransfer {
    pub fn new(
        deal_id: impl Into<String>,
        asset_id: AssetId,
        from_owner_id: OwnerId,
        to_owner_id: OwnerId,
        percentage: Percentage,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: new_transfer_id(),
            deal_id: deal_id.into(),
            asset_id,
            from_owner_id,
            to_owner_id,
            percentage,
            status: TransferStatus::Pending,
            created_at: timestamp::now(),
            created_by: created_by.into(),
            reviewed_at: None,
            reviewed_by: None,
            review_notes: None,
            rejection_count: 0,
            previous_transfer_id: None,
        }
    }

    /// A fresh pending copy of a rejected transfer
    pub fn resubmission(&self, created_by: impl Into<String>) -> Self {
        Self {
            rejection_count: self.rejection_count + 1,
            previous_transfer_id: Some(self.id.clone()),
            ..Self::new(
                self.deal_id.clone(),
                self.asset_id.clone(),
                self.from_owner_id.clone(),
                self.to_owner_id.clone(),
                self.percentage,
                created_by,
            )
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransferStatus::Pending
    }

    /// Record a review outcome on this copy
    pub fn reviewed(mut self, status: TransferStatus, reviewer: &str, notes: Option<String>, at: DateTime<Utc>) -> Self {
        self.status = status;
        self.reviewed_by = Some(reviewer.to_string());
        self.review_notes = notes;
        self.reviewed_at = Some(at);
        self
    }
}

fn new_transfer_id() -> String {
    format!("TRF-{}", uuid::Uuid::new_v4().simple().to_string().to_uppercase())
}
