//! User directory interface and the acting user

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::RwLock;
use tranche_core::OwnerId;

use crate::error::TransferResult;

/// An already-authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: String,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: role.into(),
        }
    }
}

/// Lookup of platform users
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Whether `owner_id` is a registered investor
    async fn is_investor(&self, owner_id: &OwnerId) -> TransferResult<bool>;
}

/// Fixed set of investors held in memory
#[derive(Default)]
pub struct StaticDirectory {
    investors: RwLock<HashSet<OwnerId>>,
}

impl StaticDirectory {
    pub fn new<I>(investors: I) -> Self
    where
        I: IntoIterator<Item = OwnerId>,
    {
        Self {
            investors: RwLock::new(investors.into_iter().collect()),
        }
    }

    pub fn add(&self, owner_id: OwnerId) {
        self.investors
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(owner_id);
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn is_investor(&self, owner_id: &OwnerId) -> TransferResult<bool> {
        if owner_id.is_pool() {
            return Ok(false);
        }
        Ok(self
            .investors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(owner_id))
    }
}
