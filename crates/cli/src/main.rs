//! Tranche CLI - Main entry point

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tranche_cli::commands::{self, HistoryQuery};
use tranche_cli::{AppContext, EngineConfig};
use tranche_transfer::{Actor, TransferStatus};

#[derive(Parser)]
#[command(name = "tranche")]
#[command(about = "Tranche - Ownership Transfer & Audit Engine", long_about = None)]
struct Cli {
    /// JSON config file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Acting user id
    #[arg(long = "as", default_value = "operator", global = true)]
    actor: String,

    /// Acting user's role
    #[arg(long, default_value = "operator", global = true)]
    role: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register an asset owned 100% by the pool
    Seed {
        /// Asset ID
        asset: String,
    },

    /// Propose an ownership transfer
    Propose {
        /// Deal the transfer belongs to
        deal: String,
        /// Asset ID
        asset: String,
        /// Sender (POOL or an investor)
        from: String,
        /// Receiving investor
        to: String,
        /// Percentage of the asset to move
        percentage: Decimal,
    },

    /// Show ownership before and after a transfer
    Preview {
        /// Transfer ID
        id: String,
    },

    /// Approve a pending transfer
    Approve {
        /// Transfer ID
        id: String,
        /// Optional review notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Reject a pending transfer
    Reject {
        /// Transfer ID
        id: String,
        /// Reason for rejection
        #[arg(long)]
        reason: String,
    },

    /// Propose a rejected transfer again
    Resubmit {
        /// Rejected transfer ID
        id: String,
    },

    /// List transfers by status
    Transfers {
        /// pending, approved or rejected
        #[arg(long, default_value = "pending")]
        status: TransferStatus,
        /// Maximum number of transfers to show
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Show current ownership of an asset
    Ownership {
        /// Asset ID
        asset: String,
    },

    /// Show the audit trail
    History {
        /// Filter by entity ID (with --entity-type)
        #[arg(long)]
        entity: Option<String>,
        /// Entity type for --entity
        #[arg(long, default_value = "pending_transfer")]
        entity_type: String,
        /// Filter by event type
        #[arg(long = "type", conflicts_with = "entity")]
        event_type: Option<String>,
        /// Maximum number of events to show
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Push unemitted audit events to the sink (one run)
    Emit,

    /// Delete audit events past the retention window (one run)
    Sweep,

    /// Show transfer and audit counters
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref())?;
    let ctx = AppContext::new(config).await?;
    let actor = Actor::new(cli.actor, cli.role);

    match cli.command {
        Commands::Seed { asset } => {
            commands::seed(&ctx, &asset).await?;
        }

        Commands::Propose {
            deal,
            asset,
            from,
            to,
            percentage,
        } => {
            commands::propose(&ctx, &actor, &deal, &asset, &from, &to, percentage).await?;
        }

        Commands::Preview { id } => {
            commands::preview(&ctx, &id).await?;
        }

        Commands::Approve { id, notes } => {
            commands::approve(&ctx, &actor, &id, notes.as_deref()).await?;
        }

        Commands::Reject { id, reason } => {
            commands::reject(&ctx, &actor, &id, &reason).await?;
        }

        Commands::Resubmit { id } => {
            commands::resubmit(&ctx, &actor, &id).await?;
        }

        Commands::Transfers { status, limit } => {
            commands::transfers(&ctx, status, limit).await?;
        }

        Commands::Ownership { asset } => {
            commands::ownership(&ctx, &asset).await?;
        }

        Commands::History {
            entity,
            entity_type,
            event_type,
            limit,
        } => {
            let query = match (entity, event_type) {
                (Some(entity_id), _) => HistoryQuery::Entity {
                    entity_type,
                    entity_id,
                },
                (None, Some(event_type)) => HistoryQuery::EventType(event_type),
                (None, None) => HistoryQuery::Recent,
            };
            commands::history(&ctx, &query, limit).await?;
        }

        Commands::Emit => {
            commands::emit(&ctx).await?;
        }

        Commands::Sweep => {
            commands::sweep(&ctx).await?;
        }

        Commands::Stats => {
            commands::stats(&ctx).await?;
        }
    }

    Ok(())
}
