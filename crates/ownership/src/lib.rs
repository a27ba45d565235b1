//! Tranche Ownership - Who owns what percentage of which asset
//!
//! Two stores can hold the answer: an external ledger service and a local
//! SQLite table. Exactly one of them is the source of truth, chosen when the
//! [`OwnershipBook`] is built and never switched at call time.
//!
//! Reads from the ledger never fall back to the local table: if the ledger is
//! authoritative and unreachable, the read fails.

mod book;
mod config;
mod error;
mod ledger;
mod mock;
mod table;

pub use book::OwnershipBook;
pub use config::OwnershipSource;
pub use error::{LedgerError, OwnershipError, OwnershipResult};
pub use ledger::{LedgerBalance, LedgerClient, MovementLeg, MovementReceipt};
pub use mock::MockLedger;
pub use table::OwnershipTable;
