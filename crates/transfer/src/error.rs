//! Transfer workflow errors

use rust_decimal::Decimal;
use thiserror::Error;
use tranche_audit::AuditError;
use tranche_core::{AssetId, ErrorKind, OwnerId};
use tranche_ownership::OwnershipError;

use crate::pending::TransferStatus;
use crate::store::StoreError;

/// Errors from the transfer workflow
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ownership(#[from] OwnershipError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("User directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("Invalid transfer: {0}")]
    Invalid(String),

    #[error("Owner {owner_id} holds {available}% of asset {asset_id}, cannot transfer {requested}%")]
    InsufficientBalance {
        asset_id: AssetId,
        owner_id: OwnerId,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Transfer {id} is already {status}")]
    AlreadyReviewed { id: String, status: TransferStatus },

    #[error("Transfer {id} is {status}, only rejected transfers can be resubmitted")]
    NotRejected { id: String, status: TransferStatus },

    #[error("Transfer {id} was already resubmitted as {next_id}")]
    AlreadyResubmitted { id: String, next_id: String },

    #[error("Ownership of asset {asset_id} drifted since transfer {id} was proposed: {reason}")]
    Drift { id: String, asset_id: AssetId, reason: String },
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::Store(StoreError::NotFound(_)) => ErrorKind::NotFound,
            TransferError::Store(StoreError::AlreadyResubmitted(_)) => ErrorKind::Conflict,
            TransferError::Store(_) | TransferError::Audit(_) => ErrorKind::Unknown,
            TransferError::Ownership(e) => e.kind(),
            TransferError::DirectoryUnavailable(_) => ErrorKind::UpstreamUnavailable,
            TransferError::Invalid(_) | TransferError::InsufficientBalance { .. } => ErrorKind::Validation,
            TransferError::AlreadyReviewed { .. }
            | TransferError::NotRejected { .. }
            | TransferError::AlreadyResubmitted { .. }
            | TransferError::Drift { .. } => ErrorKind::Conflict,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Result type for transfer operations
pub type TransferResult<T> = Result<T, TransferError>;
