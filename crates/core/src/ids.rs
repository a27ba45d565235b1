//! Identifiers for assets and owners
//!
//! Owners are either investors (opaque ids handed out by the user directory)
//! or the platform pool, which holds every percentage not yet allocated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Owner id reserved for the platform-held pool.
pub const POOL_OWNER: &str = "POOL";

const MAX_ID_LEN: usize = 128;

/// Errors that can occur when parsing identifiers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("Identifier cannot be empty")]
    Empty,

    #[error("Identifier too long (max {MAX_ID_LEN} chars): {0}")]
    TooLong(String),

    #[error("Identifier contains whitespace: {0:?}")]
    Whitespace(String),
}

fn validate(raw: &str) -> Result<String, IdError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IdError::Empty);
    }
    if trimmed.len() > MAX_ID_LEN {
        return Err(IdError::TooLong(trimmed.to_string()));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(IdError::Whitespace(trimmed.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Identifier of a mortgage asset whose ownership is tracked
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId(String);

impl AssetId {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, IdError> {
        validate(raw.as_ref()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier of an ownership holder.
///
/// # Example
/// ```
/// use tranche_core::OwnerId;
///
/// assert!(OwnerId::pool().is_pool());
/// let investor: OwnerId = "INV-001".parse().unwrap();
/// assert!(!investor.is_pool());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, IdError> {
        validate(raw.as_ref()).map(Self)
    }

    /// The platform pool sentinel
    pub fn pool() -> Self {
        Self(POOL_OWNER.to_string())
    }

    pub fn is_pool(&self) -> bool {
        self.0 == POOL_OWNER
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! impl_string_id {
    ($ty:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $ty {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$ty> for String {
            fn from(id: $ty) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_string_id!(AssetId);
impl_string_id!(OwnerId);
