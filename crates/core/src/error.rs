//! Error taxonomy shared by every Tranche crate

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Coarse classification of a failure, used by callers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input shape or range (out-of-bounds percentage, insufficient balance)
    Validation,
    /// State already terminal, or ownership drifted since the proposal
    Conflict,
    /// Unknown transfer or entity id
    NotFound,
    /// External ledger or sink call failed; safe to retry
    UpstreamUnavailable,
    Unknown,
}

impl ErrorKind {
    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::UpstreamUnavailable)
    }
}
