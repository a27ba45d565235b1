//! # Tranche Transfer Module
//!
//! Maker-checker workflow for moving fractional ownership of an asset.
//!
//! ## Lifecycle
//! - `pending` → `approved` (terminal, moves ownership at the source of truth)
//! - `pending` → `rejected` (terminal; a resubmission creates a new record)
//!
//! ## Guarantees
//! - No ownership moves until a reviewer other than the maker approves
//! - Approvals on one asset are serialized and re-derive their preview
//! - Each approval is applied under the transfer id as idempotency key
//! - Every state change is appended to the audit store

mod directory;
mod error;
mod lock;
mod pending;
mod preview;
mod store;
mod workflow;

pub use directory::{Actor, StaticDirectory, UserDirectory};
pub use error::{TransferError, TransferResult};
pub use lock::AssetLocks;
pub use pending::{PendingTransfer, TransferStatus};
pub use preview::OwnershipPreview;
pub use store::{ApprovalSnapshot, StoreError, TransferStore};
pub use workflow::{
    TransferRequest, TransferStats, TransferWorkflow, EVENT_TRANSFER_APPROVED, EVENT_TRANSFER_CREATED,
    EVENT_TRANSFER_REJECTED, EVENT_TRANSFER_RESUBMITTED, TRANSFER_ENTITY,
};
