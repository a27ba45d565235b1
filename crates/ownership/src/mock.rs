//! Mock ledger for testing
//!
//! Keeps balances in memory, honours idempotency keys atomically and can be
//! told to fail reads or writes.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tranche_core::{AssetId, OwnerId};

use crate::error::LedgerError;
use crate::ledger::{LedgerBalance, LedgerClient, MovementLeg, MovementReceipt};

#[derive(Default)]
struct Books {
    balances: HashMap<AssetId, BTreeMap<OwnerId, Decimal>>,
    applied_keys: HashSet<String>,
    applied_movements: u32,
}

/// In-memory ledger
#[derive(Default)]
pub struct MockLedger {
    books: Mutex<Books>,
    fail_reads: AtomicBool,
    fail_next_submits: AtomicU32,
    lose_next_replies: AtomicU32,
    submit_calls: AtomicU32,
    delay: Option<Duration>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set an owner's balance directly
    pub fn set_balance(&self, asset_id: &AssetId, owner_id: &OwnerId, percentage: Decimal) {
        self.lock()
            .balances
            .entry(asset_id.clone())
            .or_default()
            .insert(owner_id.clone(), percentage);
    }

    /// Give the whole asset to the pool
    pub fn seed_pool(&self, asset_id: &AssetId) {
        self.set_balance(asset_id, &OwnerId::pool(), Decimal::ONE_HUNDRED);
    }

    pub fn balance(&self, asset_id: &AssetId, owner_id: &OwnerId) -> Decimal {
        self.lock()
            .balances
            .get(asset_id)
            .and_then(|b| b.get(owner_id))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `n` submissions without applying them
    pub fn fail_next_submits(&self, n: u32) {
        self.fail_next_submits.store(n, Ordering::SeqCst);
    }

    /// Apply the next `n` submissions, then report them as failed
    pub fn lose_next_replies(&self, n: u32) {
        self.lose_next_replies.store(n, Ordering::SeqCst);
    }

    /// Movements actually applied (replays excluded)
    pub fn applied_movements(&self) -> u32 {
        self.lock().applied_movements
    }

    /// Every `submit_movement` call, including failures and replays
    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Books> {
        self.books.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get_balances(&self, asset_id: &AssetId) -> Result<Vec<LedgerBalance>, LedgerError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("injected read failure".to_string()));
        }

        let books = self.lock();
        Ok(books
            .balances
            .get(asset_id)
            .map(|owners| {
                owners
                    .iter()
                    .map(|(owner_id, percentage)| LedgerBalance {
                        owner_id: owner_id.clone(),
                        percentage: *percentage,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn submit_movement(
        &self,
        idempotency_key: &str,
        legs: &[MovementLeg],
    ) -> Result<MovementReceipt, LedgerError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let should_fail = self
            .fail_next_submits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(LedgerError::Unavailable("injected submit failure".to_string()));
        }

        let mut books = self.lock();
        if books.applied_keys.contains(idempotency_key) {
            return Ok(MovementReceipt {
                idempotency_key: idempotency_key.to_string(),
                applied: false,
            });
        }

        for leg in legs {
            let held = books
                .balances
                .get(&leg.asset_id)
                .and_then(|b| b.get(&leg.owner_id))
                .copied()
                .unwrap_or(Decimal::ZERO);
            if held + leg.delta < Decimal::ZERO {
                return Err(LedgerError::Rejected {
                    status: 422,
                    reason: format!("insufficient balance for {}", leg.owner_id),
                });
            }
        }

        for leg in legs {
            let owners = books.balances.entry(leg.asset_id.clone()).or_default();
            let balance = owners.entry(leg.owner_id.clone()).or_insert(Decimal::ZERO);
            *balance += leg.delta;
            if balance.is_zero() {
                owners.remove(&leg.owner_id);
            }
        }
        books.applied_keys.insert(idempotency_key.to_string());
        books.applied_movements += 1;

        let lose_reply = self
            .lose_next_replies
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lose_reply {
            return Err(LedgerError::Unavailable("connection reset after commit".to_string()));
        }

        Ok(MovementReceipt {
            idempotency_key: idempotency_key.to_string(),
            applied: true,
        })
    }

    async fn movement_applied(&self, idempotency_key: &str) -> Result<bool, LedgerError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("injected read failure".to_string()));
        }
        Ok(self.lock().applied_keys.contains(idempotency_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tranche_core::Percentage;

    fn asset() -> AssetId {
        AssetId::new("A1").unwrap()
    }

    fn investor() -> OwnerId {
        OwnerId::new("INV-1").unwrap()
    }

    #[tokio::test]
    async fn test_movement_applied_once_per_key() {
        let ledger = MockLedger::new();
        ledger.seed_pool(&asset());
        let legs = MovementLeg::transfer(&asset(), &OwnerId::pool(), &investor(), Percentage::new(dec!(30)).unwrap());

        let first = ledger.submit_movement("TRF-1", &legs).await.unwrap();
        let replay = ledger.submit_movement("TRF-1", &legs).await.unwrap();

        assert!(first.applied);
        assert!(!replay.applied);
        assert_eq!(ledger.applied_movements(), 1);
        assert_eq!(ledger.submit_calls(), 2);
        assert_eq!(ledger.balance(&asset(), &OwnerId::pool()), dec!(70));
        assert_eq!(ledger.balance(&asset(), &investor()), dec!(30));
    }

    #[tokio::test]
    async fn test_overdraw_rejected() {
        let ledger = MockLedger::new();
        ledger.set_balance(&asset(), &OwnerId::pool(), dec!(20));
        let legs = MovementLeg::transfer(&asset(), &OwnerId::pool(), &investor(), Percentage::new(dec!(30)).unwrap());

        let result = ledger.submit_movement("TRF-1", &legs).await;
        assert!(matches!(result, Err(LedgerError::Rejected { status: 422, .. })));
        assert_eq!(ledger.applied_movements(), 0);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let ledger = MockLedger::new();
        ledger.seed_pool(&asset());
        ledger.set_fail_reads(true);
        assert!(ledger.get_balances(&asset()).await.is_err());
        ledger.set_fail_reads(false);
        assert_eq!(ledger.get_balances(&asset()).await.unwrap().len(), 1);

        ledger.fail_next_submits(1);
        let legs = MovementLeg::transfer(&asset(), &OwnerId::pool(), &investor(), Percentage::HUNDRED);
        assert!(ledger.submit_movement("K", &legs).await.is_err());
        assert!(ledger.submit_movement("K", &legs).await.unwrap().applied);
        assert!(ledger.get_balances(&asset()).await.unwrap().iter().all(|b| b.owner_id == investor()));
    }

    #[tokio::test]
    async fn test_lost_reply_still_commits() {
        let ledger = MockLedger::new();
        ledger.seed_pool(&asset());
        ledger.lose_next_replies(1);
        let legs = MovementLeg::transfer(&asset(), &OwnerId::pool(), &investor(), Percentage::new(dec!(30)).unwrap());

        assert!(ledger.submit_movement("TRF-1", &legs).await.is_err());
        assert!(ledger.movement_applied("TRF-1").await.unwrap());
        assert!(!ledger.movement_applied("TRF-2").await.unwrap());
        assert_eq!(ledger.balance(&asset(), &investor()), dec!(30));

        let replay = ledger.submit_movement("TRF-1", &legs).await.unwrap();
        assert!(!replay.applied);
        assert_eq!(ledger.applied_movements(), 1);
    }
}
