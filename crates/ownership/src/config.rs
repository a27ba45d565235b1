//! Source-of-truth selection

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Which store is authoritative for current ownership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OwnershipSource {
    /// External ledger service
    Ledger,
    /// Local relational table
    #[default]
    Local,
}
