//! Ownership errors

use thiserror::Error;
use tranche_core::{AssetId, DistributionError, ErrorKind};

/// Errors reported by an external ledger client
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Ledger rejected request (status {status}): {reason}")]
    Rejected { status: u16, reason: String },

    #[error("Ledger call timed out after {0}ms")]
    Timeout(u64),
}

/// Errors from reading or writing ownership
#[derive(Debug, Error)]
pub enum OwnershipError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No ownership recorded for asset {0}")]
    UnknownAsset(AssetId),

    #[error("Asset {0} already has ownership records")]
    AssetExists(AssetId),

    #[error("Inconsistent ownership data: {0}")]
    Distribution(#[from] DistributionError),

    #[error("Ownership of asset {0} changed since it was read")]
    Drift(AssetId),

    #[error("Invalid movement: {0}")]
    InvalidMovement(String),

    #[error("Corrupt ownership row: {0}")]
    CorruptRow(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl OwnershipError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OwnershipError::Ledger(_) => ErrorKind::UpstreamUnavailable,
            OwnershipError::UnknownAsset(_) => ErrorKind::NotFound,
            OwnershipError::AssetExists(_)
            | OwnershipError::Distribution(_)
            | OwnershipError::Drift(_) => ErrorKind::Conflict,
            OwnershipError::InvalidMovement(_) | OwnershipError::Config(_) => ErrorKind::Validation,
            OwnershipError::Database(_)
            | OwnershipError::Serialization(_)
            | OwnershipError::CorruptRow(_) => ErrorKind::Unknown,
        }
    }
}

/// Result type for ownership operations
pub type OwnershipResult<T> = Result<T, OwnershipError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let asset = AssetId::new("A1").unwrap();
        assert_eq!(
            OwnershipError::from(LedgerError::Timeout(100)).kind(),
            ErrorKind::UpstreamUnavailable
        );
        assert_eq!(
            OwnershipError::from(LedgerError::Rejected { status: 503, reason: "busy".into() }).kind(),
            ErrorKind::UpstreamUnavailable
        );
        assert_eq!(OwnershipError::UnknownAsset(asset.clone()).kind(), ErrorKind::NotFound);
        assert_eq!(OwnershipError::Drift(asset).kind(), ErrorKind::Conflict);
    }
}
