//! Tradeflow CLI - Main entry point

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing::Instrument;
use tradeflow_core::{DocumentId, Role, TransactionId, UserId};
use tradeflow_ledger::LedgerAction;
use tradeflow_rpc::commands::{self, Board};
use tradeflow_rpc::{AppConfig, AppContext};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "tradeflow")]
#[command(about = "Tradeflow - Trade document workflow with an audited ledger", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory path (overrides the configuration)
    #[arg(short, long)]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Buyer opens a transaction with a purchase order
    CreatePo {
        /// Acting user ID
        #[arg(long = "as")]
        as_user: UserId,
        /// Seller user ID
        #[arg(long)]
        seller: UserId,
        /// Order amount
        #[arg(long)]
        amount: Decimal,
        /// Currency code
        #[arg(long, default_value = "USD")]
        currency: String,
        /// Purchase order file
        file: PathBuf,
    },

    /// Bank issues a letter of credit against a purchase order
    IssueLoc {
        #[arg(long = "as")]
        as_user: UserId,
        /// Purchase order document ID
        po: DocumentId,
        /// Letter of credit file
        file: PathBuf,
    },

    /// Seller uploads the bill of lading
    UploadBol {
        #[arg(long = "as")]
        as_user: UserId,
        /// Purchase order document ID
        po: DocumentId,
        /// Bill of lading file
        file: PathBuf,
        /// Shipment tracking ID (generated when omitted)
        #[arg(long)]
        tracking_id: Option<String>,
    },

    /// Seller marks the goods shipped
    Ship {
        #[arg(long = "as")]
        as_user: UserId,
        po: DocumentId,
    },

    /// Buyer confirms receipt
    Receive {
        #[arg(long = "as")]
        as_user: UserId,
        po: DocumentId,
    },

    /// Seller issues the invoice
    IssueInvoice {
        #[arg(long = "as")]
        as_user: UserId,
        po: DocumentId,
        /// Invoice file
        file: PathBuf,
    },

    /// Bank pays the invoice (invoice or purchase order ID)
    Pay {
        #[arg(long = "as")]
        as_user: UserId,
        document: DocumentId,
    },

    /// Auditor marks a document verified
    VerifyDoc {
        #[arg(long = "as")]
        as_user: UserId,
        document: DocumentId,
    },

    /// Check a document's stored file against its recorded hash
    VerifyHash {
        #[arg(long = "as")]
        as_user: UserId,
        document: DocumentId,
    },

    /// Replace the file of a compromised document
    Reupload {
        #[arg(long = "as")]
        as_user: UserId,
        document: DocumentId,
        file: PathBuf,
    },

    /// List documents visible to a user
    Documents {
        #[arg(long = "as")]
        as_user: UserId,
    },

    /// Show one document and its history
    Document {
        #[arg(long = "as")]
        as_user: UserId,
        id: DocumentId,
    },

    /// List transactions visible to a user
    Transactions {
        #[arg(long = "as")]
        as_user: UserId,
    },

    /// Show one transaction, its documents and history
    Transaction {
        #[arg(long = "as")]
        as_user: UserId,
        id: TransactionId,
    },

    /// Query the ledger
    Ledger {
        #[arg(long)]
        actor: Option<UserId>,
        #[arg(long)]
        document: Option<DocumentId>,
        #[arg(long)]
        transaction: Option<TransactionId>,
        /// RFC 3339 timestamp
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// e.g. ISSUE_LOC, VERIFY_FAILED
        #[arg(long)]
        action: Option<LedgerAction>,
    },

    /// Audit the ledger (verify hash chain)
    Audit,

    /// Risk score of a user
    Risk { user: UserId },

    /// Top users by risk or volume
    Leaderboard {
        #[arg(long, value_enum, default_value = "risk")]
        by: Board,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Amounts bought and sold by an organisation
    Totals { org: String },

    /// Transaction count per status for an organisation
    Breakdown { org: String },

    /// Transaction rows for an organisation, one JSON object per line
    Export { org: String },

    /// Documents that failed integrity verification
    Alerts,
}

#[derive(Subcommand)]
enum UserCommands {
    /// Register a user
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        org: String,
        /// buyer, seller, bank or auditor
        #[arg(long)]
        role: Role,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(data) = cli.data {
        config.data_dir = data;
    }

    let ctx = AppContext::new(config).await?;

    let request_id = Uuid::new_v4();
    run(&ctx, cli.command)
        .instrument(tracing::info_span!("command", %request_id))
        .await
}

async fn run(ctx: &AppContext, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::User {
            command:
                UserCommands::Add {
                    name,
                    email,
                    org,
                    role,
                },
        } => {
            commands::add_user(ctx, &name, &email, &org, role)?;
        }

        Commands::CreatePo {
            as_user,
            seller,
            amount,
            currency,
            file,
        } => {
            commands::create_po(ctx, as_user, seller, amount, &currency, &file).await?;
        }

        Commands::IssueLoc { as_user, po, file } => {
            commands::issue_loc(ctx, as_user, po, &file).await?;
        }

        Commands::UploadBol {
            as_user,
            po,
            file,
            tracking_id,
        } => {
            commands::upload_bol(ctx, as_user, po, &file, tracking_id).await?;
        }

        Commands::Ship { as_user, po } => {
            commands::ship(ctx, as_user, po).await?;
        }

        Commands::Receive { as_user, po } => {
            commands::receive(ctx, as_user, po).await?;
        }

        Commands::IssueInvoice { as_user, po, file } => {
            commands::issue_invoice(ctx, as_user, po, &file).await?;
        }

        Commands::Pay { as_user, document } => {
            commands::pay(ctx, as_user, document).await?;
        }

        Commands::VerifyDoc { as_user, document } => {
            commands::verify_doc(ctx, as_user, document).await?;
        }

        Commands::VerifyHash { as_user, document } => {
            commands::verify_hash(ctx, as_user, document).await?;
        }

        Commands::Reupload {
            as_user,
            document,
            file,
        } => {
            commands::reupload(ctx, as_user, document, &file).await?;
        }

        Commands::Documents { as_user } => {
            commands::documents(ctx, as_user)?;
        }

        Commands::Document { as_user, id } => {
            commands::document(ctx, as_user, id)?;
        }

        Commands::Transactions { as_user } => {
            commands::transactions(ctx, as_user)?;
        }

        Commands::Transaction { as_user, id } => {
            commands::transaction(ctx, as_user, id)?;
        }

        Commands::Ledger {
            actor,
            document,
            transaction,
            since,
            action,
        } => {
            commands::ledger(ctx, actor, document, transaction, since, action)?;
        }

        Commands::Audit => {
            commands::audit(ctx)?;
        }

        Commands::Risk { user } => {
            commands::risk(ctx, user)?;
        }

        Commands::Leaderboard { by, limit } => {
            commands::leaderboard(ctx, by, limit)?;
        }

        Commands::Totals { org } => {
            commands::totals(ctx, &org)?;
        }

        Commands::Breakdown { org } => {
            commands::breakdown(ctx, &org)?;
        }

        Commands::Export { org } => {
            commands::export(ctx, &org)?;
        }

        Commands::Alerts => {
            commands::alerts(ctx)?;
        }
    }

    Ok(())
}
