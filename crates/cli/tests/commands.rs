//! End-to-end runs of the operator commands against a file-backed database

use rust_decimal_macros::dec;
use tempfile::TempDir;
use tranche_cli::commands::{self, HistoryQuery};
use tranche_cli::{AppContext, EngineConfig};
use tranche_core::OwnerId;
use tranche_ownership::OwnershipSource;
use tranche_transfer::{Actor, TransferStatus};

fn config(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        database_path: dir.path().join("data").join("tranche.db"),
        sink_path: dir.path().join("data").join("sink.jsonl"),
        investors: vec![OwnerId::new("INV-1").unwrap(), OwnerId::new("INV-2").unwrap()],
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn test_propose_approve_emit_cycle() {
    let dir = TempDir::new().unwrap();
    let ctx = AppContext::new(config(&dir)).await.unwrap();
    let maker = Actor::new("alice", "operator");
    let checker = Actor::new("bob", "admin");

    commands::seed(&ctx, "A1").await.unwrap();
    assert!(commands::seed(&ctx, "A1").await.is_err());

    let transfer = commands::propose(&ctx, &maker, "deal-1", "A1", "POOL", "INV-1", dec!(30))
        .await
        .unwrap();
    let preview = commands::preview(&ctx, &transfer.id).await.unwrap();
    assert_eq!(preview.after_ownership.len(), 2);

    commands::approve(&ctx, &checker, &transfer.id, Some("ok")).await.unwrap();
    let ownership = commands::ownership(&ctx, "A1").await.unwrap();
    assert_eq!(ownership[0].percentage.value(), dec!(70));
    assert_eq!(ownership[1].percentage.value(), dec!(30));

    let history = commands::history(
        &ctx,
        &HistoryQuery::Entity {
            entity_type: "pending_transfer".to_string(),
            entity_id: transfer.id.clone(),
        },
        10,
    )
    .await
    .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].event_type, "transfer.approved");

    let report = commands::emit(&ctx).await.unwrap();
    assert_eq!(report.emitted, 2);
    assert_eq!(std::fs::read_to_string(&ctx.config().sink_path).unwrap().lines().count(), 2);

    let (transfers, audit) = commands::stats(&ctx).await.unwrap();
    assert_eq!(transfers.approved, 1);
    assert_eq!(audit.total, 2);
    assert_eq!(audit.unemitted, 0);

    // Nothing is old enough to sweep under the default window
    assert_eq!(commands::sweep(&ctx).await.unwrap().deleted, 0);
}

#[tokio::test]
async fn test_reject_and_resubmit() {
    let dir = TempDir::new().unwrap();
    let ctx = AppContext::new(config(&dir)).await.unwrap();
    let maker = Actor::new("alice", "operator");
    let checker = Actor::new("bob", "admin");

    commands::seed(&ctx, "A2").await.unwrap();
    let transfer = commands::propose(&ctx, &maker, "deal-2", "A2", "POOL", "INV-2", dec!(15))
        .await
        .unwrap();
    commands::reject(&ctx, &checker, &transfer.id, "wrong deal").await.unwrap();
    let next = commands::resubmit(&ctx, &maker, &transfer.id).await.unwrap();

    assert_eq!(next.rejection_count, 1);
    let pending = commands::transfers(&ctx, TransferStatus::Pending, 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, next.id);

    let rejected = commands::history(&ctx, &HistoryQuery::EventType("transfer.rejected".into()), 10)
        .await
        .unwrap();
    assert_eq!(rejected.len(), 1);
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let transfer_id = {
        let ctx = AppContext::new(config(&dir)).await.unwrap();
        commands::seed(&ctx, "A3").await.unwrap();
        commands::propose(&ctx, &Actor::new("alice", "operator"), "deal-3", "A3", "POOL", "INV-1", dec!(50))
            .await
            .unwrap()
            .id
    };

    let ctx = AppContext::new(config(&dir)).await.unwrap();
    commands::approve(&ctx, &Actor::new("bob", "admin"), &transfer_id, None).await.unwrap();
    let ownership = commands::ownership(&ctx, "A3").await.unwrap();
    assert_eq!(ownership[1].percentage.value(), dec!(50));
}

#[tokio::test]
async fn test_ledger_source_refused_without_client() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig {
        ownership_source: OwnershipSource::Ledger,
        ..config(&dir)
    };
    assert!(AppContext::new(config).await.is_err());
}
