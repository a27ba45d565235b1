//! CLI commands

use rust_decimal::Decimal;
use tranche_audit::{AuditEvent, AuditStats, EmissionReport, SweepReport};
use tranche_core::{AssetId, OwnerId, OwnershipRecord};
use tranche_transfer::{Actor, OwnershipPreview, PendingTransfer, TransferRequest, TransferStats, TransferStatus};

use crate::context::AppContext;

/// Which slice of the audit trail to show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryQuery {
    Entity { entity_type: String, entity_id: String },
    EventType(String),
    Recent,
}

/// Register an asset wholly owned by the pool
pub async fn seed(ctx: &AppContext, asset: &str) -> Result<(), anyhow::Error> {
    let asset_id = AssetId::new(asset)?;
    ctx.table.seed_pool(&asset_id).await?;

    println!("✅ Asset {} seeded: {} owns 100%", asset_id, OwnerId::pool());
    Ok(())
}

/// Propose a transfer (maker action)
pub async fn propose(
    ctx: &AppContext,
    actor: &Actor,
    deal_id: &str,
    asset: &str,
    from: &str,
    to: &str,
    percentage: Decimal,
) -> Result<PendingTransfer, anyhow::Error> {
    let request = TransferRequest {
        deal_id: deal_id.to_string(),
        asset_id: AssetId::new(asset)?,
        from_owner_id: OwnerId::new(from)?,
        to_owner_id: OwnerId::new(to)?,
        percentage,
    };
    let transfer = ctx.workflow.create_transfer(request, actor).await?;

    println!(
        "✅ Transfer {} proposed: {}% of {} from {} to {}",
        transfer.id, transfer.percentage, transfer.asset_id, transfer.from_owner_id, transfer.to_owner_id
    );
    Ok(transfer)
}

/// Show the effect a transfer would have
pub async fn preview(ctx: &AppContext, transfer_id: &str) -> Result<OwnershipPreview, anyhow::Error> {
    let preview = ctx.workflow.preview(transfer_id).await?;

    println!("📋 Transfer {} ({})", preview.transfer.id, preview.transfer.status);
    println!("   Current:");
    print_distribution(&preview.current_ownership);
    println!("   After:");
    print_distribution(&preview.after_ownership);
    Ok(preview)
}

/// Approve a pending transfer (checker action)
pub async fn approve(
    ctx: &AppContext,
    actor: &Actor,
    transfer_id: &str,
    notes: Option<&str>,
) -> Result<OwnershipPreview, anyhow::Error> {
    let result = ctx.workflow.approve(transfer_id, actor, notes).await?;

    println!("✅ Transfer {} approved by {}", result.transfer.id, actor.user_id);
    print_distribution(&result.after_ownership);
    Ok(result)
}

/// Reject a pending transfer (checker action)
pub async fn reject(
    ctx: &AppContext,
    actor: &Actor,
    transfer_id: &str,
    reason: &str,
) -> Result<PendingTransfer, anyhow::Error> {
    let transfer = ctx.workflow.reject(transfer_id, actor, reason).await?;

    println!("❌ Transfer {} rejected by {}: {}", transfer.id, actor.user_id, reason.trim());
    Ok(transfer)
}

/// Resubmit a rejected transfer as a new proposal
pub async fn resubmit(ctx: &AppContext, actor: &Actor, transfer_id: &str) -> Result<PendingTransfer, anyhow::Error> {
    let transfer = ctx.workflow.resubmit(transfer_id, actor).await?;

    println!(
        "✅ Transfer {} resubmitted as {} (rejections: {})",
        transfer_id, transfer.id, transfer.rejection_count
    );
    Ok(transfer)
}

/// List transfers by status
pub async fn transfers(ctx: &AppContext, status: TransferStatus, limit: u32) -> Result<Vec<PendingTransfer>, anyhow::Error> {
    let transfers = ctx.workflow.list_by_status(status, limit).await?;

    if transfers.is_empty() {
        println!("No {} transfers", status);
    }
    for t in &transfers {
        println!(
            "{}  {}  {}%  {} → {}  by {}",
            t.id, t.asset_id, t.percentage, t.from_owner_id, t.to_owner_id, t.created_by
        );
    }
    Ok(transfers)
}

/// Current ownership of an asset
pub async fn ownership(ctx: &AppContext, asset: &str) -> Result<Vec<OwnershipRecord>, anyhow::Error> {
    let asset_id = AssetId::new(asset)?;
    let records = ctx.workflow.book().get_ownership_distribution(&asset_id).await?;

    println!("📊 Ownership of {}:", asset_id);
    print_distribution(&records);
    Ok(records)
}

/// Audit trail, newest first
pub async fn history(ctx: &AppContext, query: &HistoryQuery, limit: u32) -> Result<Vec<AuditEvent>, anyhow::Error> {
    let events = match query {
        HistoryQuery::Entity { entity_type, entity_id } => {
            ctx.audit.list_by_entity(entity_type, entity_id, limit).await?
        }
        HistoryQuery::EventType(event_type) => ctx.audit.list_by_type(event_type, limit).await?,
        HistoryQuery::Recent => ctx.audit.list_recent(limit).await?,
    };

    for event in &events {
        let emitted = if event.is_emitted() { "emitted" } else { "pending" };
        println!(
            "{}  {}  {}  {}/{}  by {}  [{}, failures: {}]",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.id,
            event.event_type,
            event.entity_type,
            event.entity_id,
            event.actor_user_id,
            emitted,
            event.emit_failures
        );
    }
    println!("\nTotal: {} events", events.len());
    Ok(events)
}

/// One Emission Worker run into the JSONL sink
pub async fn emit(ctx: &AppContext) -> Result<EmissionReport, anyhow::Error> {
    let report = ctx.emission_worker()?.run_once().await?;

    println!(
        "📤 Emitted {}/{} events ({} failed, {} bookkeeping errors)",
        report.emitted, report.attempted, report.failed, report.bookkeeping_errors
    );
    if !report.stuck.is_empty() {
        println!("⚠️  Stuck events: {}", report.stuck.join(", "));
    }
    Ok(report)
}

/// One Retention Sweeper run
pub async fn sweep(ctx: &AppContext) -> Result<SweepReport, anyhow::Error> {
    let report = ctx.retention_sweeper()?.sweep().await?;

    println!(
        "🗑️  Deleted {} events older than {} ({} batches)",
        report.deleted,
        report.cutoff.format("%Y-%m-%d"),
        report.batches
    );
    Ok(report)
}

/// Transfer and audit counters
pub async fn stats(ctx: &AppContext) -> Result<(TransferStats, AuditStats), anyhow::Error> {
    let transfers = ctx.workflow.stats().await?;
    let audit = ctx.audit.stats(ctx.config().emission.alert_threshold).await?;

    println!("📊 Transfers: {} pending, {} approved, {} rejected", transfers.pending, transfers.approved, transfers.rejected);
    println!("   Audit events: {} total, {} unemitted, {} stuck", audit.total, audit.unemitted, audit.stuck);
    Ok((transfers, audit))
}

fn print_distribution(records: &[OwnershipRecord]) {
    for record in records {
        println!("   {:<20} {:>12}%", record.owner_id.as_str(), record.percentage.to_string());
    }
}
