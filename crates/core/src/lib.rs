//! Tranche Core - Domain types
//!
//! This crate contains the fundamental types used across Tranche:
//! - `Percentage`: Decimal wrapper bounded to `0..=100`
//! - `AssetId` / `OwnerId`: Identifiers, including the platform pool sentinel
//! - `OwnershipRecord`: One owner's share of one asset, plus distribution helpers
//! - `ErrorKind`: The error taxonomy every crate maps its errors onto
//! - `timestamp`: Fixed-width text encoding for timestamps stored in SQLite

pub mod distribution;
pub mod error;
pub mod ids;
pub mod percentage;
pub mod timestamp;

pub use distribution::{DistributionError, OwnershipRecord};
pub use error::ErrorKind;
pub use ids::{AssetId, IdError, OwnerId, POOL_OWNER};
pub use percentage::{Percentage, PercentageError, PERCENT_SCALE};
