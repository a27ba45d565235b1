//! Transfer workflow logic

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tranche_audit::{AuditRecord, AuditStore};
use tranche_core::distribution;
use tranche_core::{timestamp, AssetId, OwnerId, Percentage};
use tranche_ownership::OwnershipBook;

use crate::directory::{Actor, UserDirectory};
use crate::error::{TransferError, TransferResult};
use crate::lock::AssetLocks;
use crate::pending::{PendingTransfer, TransferStatus};
use crate::preview::OwnershipPreview;
use crate::store::{ApprovalSnapshot, TransferStore};

pub const TRANSFER_ENTITY: &str = "pending_transfer";
pub const EVENT_TRANSFER_CREATED: &str = "transfer.created";
pub const EVENT_TRANSFER_APPROVED: &str = "transfer.approved";
pub const EVENT_TRANSFER_REJECTED: &str = "transfer.rejected";
pub const EVENT_TRANSFER_RESUBMITTED: &str = "transfer.resubmitted";

/// What the maker proposes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub deal_id: String,
    pub asset_id: AssetId,
    pub from_owner_id: OwnerId,
    pub to_owner_id: OwnerId,
    pub percentage: Decimal,
}

/// Counts of transfers by status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferStats {
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
}

/// Maker-checker transfer workflow
pub struct TransferWorkflow {
    store: TransferStore,
    book: OwnershipBook,
    audit: AuditStore,
    directory: Arc<dyn UserDirectory>,
    locks: AssetLocks,
}

impl TransferWorkflow {
    pub fn new(
        store: TransferStore,
        book: OwnershipBook,
        audit: AuditStore,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            store,
            book,
            audit,
            directory,
            locks: AssetLocks::new(),
        }
    }

    pub fn book(&self) -> &OwnershipBook {
        &self.book
    }

    pub fn audit(&self) -> &AuditStore {
        &self.audit
    }

    /// Propose a transfer. Nothing is persisted unless every check passes.
    pub async fn create_transfer(&self, request: TransferRequest, actor: &Actor) -> TransferResult<PendingTransfer> {
        let deal_id = request.deal_id.trim();
        if deal_id.is_empty() {
            return Err(TransferError::Invalid("deal id must not be blank".to_string()));
        }
        let percentage = Percentage::transferable(request.percentage)
            .map_err(|e| TransferError::Invalid(format!("percentage {}: {e}", request.percentage)))?;

        let transfer = PendingTransfer::new(
            deal_id,
            request.asset_id,
            request.from_owner_id,
            request.to_owner_id,
            percentage,
            actor.user_id.as_str(),
        );
        self.validate_proposal(&transfer).await?;

        self.store.save(&transfer).await?;
        self.audit
            .append(
                AuditRecord::new(EVENT_TRANSFER_CREATED, TRANSFER_ENTITY, &transfer.id, &actor.user_id)
                    .after(json!(transfer))
                    .metadata(json!({ "actor_role": actor.role })),
            )
            .await?;

        tracing::info!(
            transfer_id = %transfer.id,
            asset_id = %transfer.asset_id,
            from = %transfer.from_owner_id,
            to = %transfer.to_owner_id,
            percentage = %transfer.percentage,
            maker = %actor.user_id,
            "Transfer proposed"
        );

        Ok(transfer)
    }

    /// Current and after distributions for a transfer, read live
    pub async fn preview(&self, transfer_id: &str) -> TransferResult<OwnershipPreview> {
        let transfer = self.store.get(transfer_id).await?;
        self.derive_preview(transfer).await
    }

    /// Approve a pending transfer and move ownership at the source of truth.
    ///
    /// Holds the asset's lock throughout. If the movement fails the transfer
    /// stays pending and no audit event is written. A retry after the
    /// movement committed but its reply was lost completes the approval from
    /// the snapshot recorded before submitting.
    pub async fn approve(
        &self,
        transfer_id: &str,
        reviewer: &Actor,
        notes: Option<&str>,
    ) -> TransferResult<OwnershipPreview> {
        let transfer = self.store.get(transfer_id).await?;
        ensure_pending(&transfer)?;
        ensure_checker(&transfer, reviewer)?;

        let _guard = self.locks.acquire(&transfer.asset_id).await;

        // Another approval may have finished while we waited
        let transfer = self.store.get(transfer_id).await?;
        ensure_pending(&transfer)?;

        let (preview, movement_applied) = if self.book.is_applied(&transfer.id).await? {
            (self.recover_applied(transfer).await?, false)
        } else {
            let preview = self.derive_preview(transfer).await?;
            self.submit_movement(preview).await?
        };

        let approved = preview.transfer.clone().reviewed(
            TransferStatus::Approved,
            &reviewer.user_id,
            clean_notes(notes),
            timestamp::now(),
        );
        if !self.store.mark_reviewed(&approved).await? {
            let current = self.store.get(transfer_id).await?;
            return Err(TransferError::AlreadyReviewed {
                id: current.id,
                status: current.status,
            });
        }

        self.audit
            .append(
                AuditRecord::new(EVENT_TRANSFER_APPROVED, TRANSFER_ENTITY, &approved.id, &reviewer.user_id)
                    .before(json!(preview.current_ownership))
                    .after(json!(preview.after_ownership))
                    .metadata(json!({
                        "asset_id": approved.asset_id,
                        "deal_id": approved.deal_id,
                        "percentage": approved.percentage,
                        "ownership_source": self.book.source(),
                        "movement_applied": movement_applied,
                        "review_notes": approved.review_notes,
                        "actor_role": reviewer.role,
                    })),
            )
            .await?;

        tracing::info!(
            transfer_id = %approved.id,
            asset_id = %approved.asset_id,
            reviewer = %reviewer.user_id,
            "Transfer approved"
        );

        Ok(OwnershipPreview {
            transfer: approved,
            ..preview
        })
    }

    /// Reject a pending transfer. Ownership is untouched.
    pub async fn reject(&self, transfer_id: &str, reviewer: &Actor, reason: &str) -> TransferResult<PendingTransfer> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(TransferError::Invalid("rejection reason must not be blank".to_string()));
        }

        let transfer = self.store.get(transfer_id).await?;
        ensure_pending(&transfer)?;
        ensure_checker(&transfer, reviewer)?;

        let _guard = self.locks.acquire(&transfer.asset_id).await;

        let rejected = transfer.clone().reviewed(
            TransferStatus::Rejected,
            &reviewer.user_id,
            Some(reason.to_string()),
            timestamp::now(),
        );
        if !self.store.mark_reviewed(&rejected).await? {
            let current = self.store.get(transfer_id).await?;
            return Err(TransferError::AlreadyReviewed {
                id: current.id,
                status: current.status,
            });
        }

        self.audit
            .append(
                AuditRecord::new(EVENT_TRANSFER_REJECTED, TRANSFER_ENTITY, &rejected.id, &reviewer.user_id)
                    .before(json!(transfer))
                    .after(json!(rejected))
                    .metadata(json!({ "reason": reason, "actor_role": reviewer.role })),
            )
            .await?;

        tracing::info!(
            transfer_id = %rejected.id,
            asset_id = %rejected.asset_id,
            reviewer = %reviewer.user_id,
            "Transfer rejected"
        );

        Ok(rejected)
    }

    /// Propose a rejected transfer again as a new pending record.
    ///
    /// Each rejected transfer is resubmitted at most once, so the chain of
    /// `previous_transfer_id` links stays linear.
    pub async fn resubmit(&self, transfer_id: &str, actor: &Actor) -> TransferResult<PendingTransfer> {
        let prior = self.store.get(transfer_id).await?;
        if prior.status != TransferStatus::Rejected {
            return Err(TransferError::NotRejected {
                id: prior.id,
                status: prior.status,
            });
        }

        if let Some(next) = self.store.find_resubmission(&prior.id).await? {
            return Err(TransferError::AlreadyResubmitted {
                id: prior.id,
                next_id: next.id,
            });
        }

        let transfer = prior.resubmission(actor.user_id.as_str());
        self.validate_proposal(&transfer).await?;

        self.store.save(&transfer).await?;
        self.audit
            .append(
                AuditRecord::new(EVENT_TRANSFER_RESUBMITTED, TRANSFER_ENTITY, &transfer.id, &actor.user_id)
                    .after(json!(transfer))
                    .metadata(json!({
                        "previous_transfer_id": prior.id,
                        "rejection_count": transfer.rejection_count,
                        "actor_role": actor.role,
                    })),
            )
            .await?;

        tracing::info!(
            transfer_id = %transfer.id,
            previous_transfer_id = %prior.id,
            rejection_count = transfer.rejection_count,
            "Transfer resubmitted"
        );

        Ok(transfer)
    }

    pub async fn get(&self, transfer_id: &str) -> TransferResult<PendingTransfer> {
        Ok(self.store.get(transfer_id).await?)
    }

    pub async fn list_by_status(&self, status: TransferStatus, limit: u32) -> TransferResult<Vec<PendingTransfer>> {
        Ok(self.store.list_by_status(status, limit).await?)
    }

    pub async fn stats(&self) -> TransferResult<TransferStats> {
        Ok(TransferStats {
            pending: self.store.count_by_status(TransferStatus::Pending).await?,
            approved: self.store.count_by_status(TransferStatus::Approved).await?,
            rejected: self.store.count_by_status(TransferStatus::Rejected).await?,
        })
    }

    /// Record the snapshot, then move ownership under the transfer id
    async fn submit_movement(&self, preview: OwnershipPreview) -> TransferResult<(OwnershipPreview, bool)> {
        let transfer = &preview.transfer;
        self.store
            .record_snapshot(
                &transfer.id,
                &ApprovalSnapshot {
                    before: preview.current_ownership.clone(),
                    after: preview.after_ownership.clone(),
                },
            )
            .await?;

        let receipt = self
            .book
            .apply_movement(&transfer.id, &transfer.asset_id, &preview.legs(), &preview.current_ownership)
            .await
            .map_err(|e| {
                tracing::error!(
                    transfer_id = %transfer.id,
                    asset_id = %transfer.asset_id,
                    error = %e,
                    "Ownership movement failed, transfer left pending"
                );
                match e {
                    tranche_ownership::OwnershipError::Drift(asset_id) => TransferError::Drift {
                        id: transfer.id.clone(),
                        asset_id,
                        reason: "distribution changed during approval".to_string(),
                    },
                    other => TransferError::Ownership(other),
                }
            })?;

        if receipt.applied {
            return Ok((preview, true));
        }

        // Applied by a concurrent attempt between the lookup and the submit
        tracing::warn!(
            transfer_id = %preview.transfer.id,
            "Movement was already applied under this transfer id"
        );
        Ok((self.recover_applied(preview.transfer).await?, false))
    }

    /// Before/after of a transfer whose movement has already been applied
    async fn recover_applied(&self, transfer: PendingTransfer) -> TransferResult<OwnershipPreview> {
        if let Some(snapshot) = self.store.snapshot(&transfer.id).await? {
            tracing::info!(
                transfer_id = %transfer.id,
                asset_id = %transfer.asset_id,
                "Movement already applied, completing approval from recorded snapshot"
            );
            return Ok(OwnershipPreview {
                transfer,
                current_ownership: snapshot.before,
                after_ownership: snapshot.after,
            });
        }

        tracing::warn!(
            transfer_id = %transfer.id,
            asset_id = %transfer.asset_id,
            "Movement already applied with no recorded snapshot, rebuilding from current ownership"
        );
        let current = self.book.get_ownership_distribution(&transfer.asset_id).await?;
        OwnershipPreview::reconstruct(transfer, current)
    }

    async fn derive_preview(&self, transfer: PendingTransfer) -> TransferResult<OwnershipPreview> {
        let current = self.book.get_ownership_distribution(&transfer.asset_id).await?;
        tracing::debug!(
            transfer_id = %transfer.id,
            asset_id = %transfer.asset_id,
            owners = current.len(),
            "Ownership read for preview"
        );
        OwnershipPreview::derive(transfer, current)
    }

    /// Checks shared by create and resubmit
    async fn validate_proposal(&self, transfer: &PendingTransfer) -> TransferResult<()> {
        if transfer.to_owner_id.is_pool() {
            return Err(TransferError::Invalid("transfers cannot target the pool".to_string()));
        }
        if transfer.from_owner_id == transfer.to_owner_id {
            return Err(TransferError::Invalid(format!(
                "sender and receiver are both {}",
                transfer.from_owner_id
            )));
        }
        if !self.directory.is_investor(&transfer.to_owner_id).await? {
            return Err(TransferError::Invalid(format!(
                "{} is not a registered investor",
                transfer.to_owner_id
            )));
        }

        let current = self.book.get_ownership_distribution(&transfer.asset_id).await?;
        let available = distribution::holding_of(&current, &transfer.from_owner_id);
        if available < transfer.percentage {
            return Err(TransferError::InsufficientBalance {
                asset_id: transfer.asset_id.clone(),
                owner_id: transfer.from_owner_id.clone(),
                available: available.value(),
                requested: transfer.percentage.value(),
            });
        }
        Ok(())
    }
}

fn ensure_pending(transfer: &PendingTransfer) -> TransferResult<()> {
    if transfer.is_pending() {
        Ok(())
    } else {
        Err(TransferError::AlreadyReviewed {
            id: transfer.id.clone(),
            status: transfer.status,
        })
    }
}

fn ensure_checker(transfer: &PendingTransfer, reviewer: &Actor) -> TransferResult<()> {
    if transfer.created_by == reviewer.user_id {
        return Err(TransferError::Invalid(format!(
            "{} proposed transfer {} and cannot review it",
            reviewer.user_id, transfer.id
        )));
    }
    Ok(())
}

fn clean_notes(notes: Option<&str>) -> Option<String> {
    notes.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticDirectory;
    use rust_decimal_macros::dec;
    use tranche_core::ErrorKind;
    use tranche_ownership::OwnershipTable;

    fn asset() -> AssetId {
        AssetId::new("A1").unwrap()
    }

    fn investor(n: u32) -> OwnerId {
        OwnerId::new(format!("INV-{n}")).unwrap()
    }

    fn maker() -> Actor {
        Actor::new("maker-1", "operator")
    }

    fn checker() -> Actor {
        Actor::new("checker-1", "admin")
    }

    async fn create_test_workflow() -> TransferWorkflow {
        let table = OwnershipTable::in_memory().await.unwrap();
        table.seed_pool(&asset()).await.unwrap();
        TransferWorkflow::new(
            TransferStore::in_memory().await.unwrap(),
            OwnershipBook::local(table),
            AuditStore::in_memory().await.unwrap(),
            Arc::new(StaticDirectory::new([investor(1), investor(2)])),
        )
    }

    fn request(from: OwnerId, to: OwnerId, pct: Decimal) -> TransferRequest {
        TransferRequest {
            deal_id: "deal-1".to_string(),
            asset_id: asset(),
            from_owner_id: from,
            to_owner_id: to,
            percentage: pct,
        }
    }

    #[tokio::test]
    async fn test_create_transfer() {
        let workflow = create_test_workflow().await;
        let transfer = workflow
            .create_transfer(request(OwnerId::pool(), investor(1), dec!(30)), &maker())
            .await
            .unwrap();

        assert!(transfer.id.starts_with("TRF-"));
        assert_eq!(transfer.status, TransferStatus::Pending);
        assert_eq!(transfer.created_by, "maker-1");

        let events = workflow.audit().list_by_entity(TRANSFER_ENTITY, &transfer.id, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EVENT_TRANSFER_CREATED);
        assert_eq!(events[0].actor_user_id, "maker-1");
    }

    #[tokio::test]
    async fn test_create_validation() {
        let workflow = create_test_workflow().await;

        let cases = [
            request(OwnerId::pool(), investor(1), dec!(0)),
            request(OwnerId::pool(), investor(1), dec!(100.5)),
            request(OwnerId::pool(), investor(1), dec!(-3)),
            request(OwnerId::pool(), OwnerId::pool(), dec!(10)),
            request(OwnerId::pool(), investor(9), dec!(10)),
            request(investor(1), investor(1), dec!(10)),
        ];
        for case in cases {
            let err = workflow.create_transfer(case, &maker()).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{err}");
        }

        let mut blank_deal = request(OwnerId::pool(), investor(1), dec!(10));
        blank_deal.deal_id = "  ".to_string();
        assert_eq!(
            workflow.create_transfer(blank_deal, &maker()).await.unwrap_err().kind(),
            ErrorKind::Validation
        );

        assert_eq!(workflow.stats().await.unwrap().pending, 0);
        assert!(workflow.audit().list_recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_insufficient_names_available_balance() {
        let workflow = create_test_workflow().await;
        let err = workflow
            .create_transfer(request(investor(1), investor(2), dec!(5)), &maker())
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::InsufficientBalance { available, .. } if available.is_zero()));
        assert!(err.to_string().contains("holds 0%"));
    }

    #[tokio::test]
    async fn test_create_unknown_asset() {
        let workflow = create_test_workflow().await;
        let mut req = request(OwnerId::pool(), investor(1), dec!(5));
        req.asset_id = AssetId::new("A404").unwrap();
        let err = workflow.create_transfer(req, &maker()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_preview() {
        let workflow = create_test_workflow().await;
        let transfer = workflow
            .create_transfer(request(OwnerId::pool(), investor(1), dec!(30)), &maker())
            .await
            .unwrap();

        let preview = workflow.preview(&transfer.id).await.unwrap();
        assert_eq!(preview.transfer, transfer);
        assert_eq!(preview.current_ownership.len(), 1);
        assert_eq!(distribution::holding_of(&preview.after_ownership, &investor(1)).value(), dec!(30));
    }

    #[tokio::test]
    async fn test_maker_cannot_review() {
        let workflow = create_test_workflow().await;
        let transfer = workflow
            .create_transfer(request(OwnerId::pool(), investor(1), dec!(30)), &maker())
            .await
            .unwrap();

        let err = workflow.approve(&transfer.id, &maker(), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = workflow.reject(&transfer.id, &maker(), "no").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(workflow.get(&transfer.id).await.unwrap().is_pending());
    }

    #[tokio::test]
    async fn test_reject_requires_reason() {
        let workflow = create_test_workflow().await;
        let transfer = workflow
            .create_transfer(request(OwnerId::pool(), investor(1), dec!(30)), &maker())
            .await
            .unwrap();

        let err = workflow.reject(&transfer.id, &checker(), "   ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let rejected = workflow.reject(&transfer.id, &checker(), " wrong deal ").await.unwrap();
        assert_eq!(rejected.status, TransferStatus::Rejected);
        assert_eq!(rejected.review_notes.as_deref(), Some("wrong deal"));
        assert_eq!(rejected.rejection_count, 0);

        let err = workflow.approve(&transfer.id, &checker(), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_resubmit_only_rejected() {
        let workflow = create_test_workflow().await;
        let transfer = workflow
            .create_transfer(request(OwnerId::pool(), investor(1), dec!(30)), &maker())
            .await
            .unwrap();

        let err = workflow.resubmit(&transfer.id, &maker()).await.unwrap_err();
        assert!(matches!(err, TransferError::NotRejected { .. }));

        workflow.reject(&transfer.id, &checker(), "fix deal").await.unwrap();
        let next = workflow.resubmit(&transfer.id, &maker()).await.unwrap();

        assert_eq!(next.rejection_count, 1);
        assert_eq!(next.previous_transfer_id.as_deref(), Some(transfer.id.as_str()));
        let events = workflow.audit().list_by_type(EVENT_TRANSFER_RESUBMITTED, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].metadata.as_ref().unwrap()["previous_transfer_id"], transfer.id.as_str());

        let stats = workflow.stats().await.unwrap();
        assert_eq!(stats, TransferStats { pending: 1, approved: 0, rejected: 1 });

        let err = workflow.resubmit(&transfer.id, &maker()).await.unwrap_err();
        assert!(matches!(&err, TransferError::AlreadyResubmitted { next_id, .. } if *next_id == next.id));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(workflow.stats().await.unwrap().pending, 1);
        assert_eq!(workflow.audit().list_by_type(EVENT_TRANSFER_RESUBMITTED, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let workflow = create_test_workflow().await;
        assert_eq!(workflow.get("TRF-NOPE").await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            workflow.approve("TRF-NOPE", &checker(), None).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
