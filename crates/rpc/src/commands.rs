//! CLI commands
//!
//! Each command prints its result and returns it, so tests can drive the
//! same code paths as the binary.

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::Path;
use tradeflow_core::{Amount, Currency, Document, DocumentId, NewUser, Role, Transaction, TransactionId, User, UserId};
use tradeflow_integrity::VerificationReport;
use tradeflow_ledger::{LedgerAction, LedgerQuery};
use tradeflow_risk::{ExportRow, OrgTotals, Ranking, RiskScore, StatusCount};
use tradeflow_workflow::{Applied, OrderTerms};

use crate::context::{AppContext, TimelineEntry};

/// Leaderboard ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Board {
    /// Highest risk percent first
    Risk,
    /// Highest total amount first
    Volume,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_applied(verb: &str, applied: &Applied) {
    let doc = &applied.document;
    println!(
        "✅ {} {} ({}, transaction {} {}, ledger entry {})",
        verb, doc.doc_number, doc.status, applied.transaction.id, applied.transaction.status, applied.ledger_entry_id
    );
}

// === Users ===

pub fn add_user(ctx: &AppContext, name: &str, email: &str, org: &str, role: Role) -> anyhow::Result<User> {
    let user = ctx.register(NewUser {
        name: name.to_string(),
        email: email.to_string(),
        org: org.to_string(),
        role,
    })?;
    println!("✅ Added {} {} ({}, {}) as user {}", user.role, user.name, user.email, user.org, user.id);
    Ok(user)
}

// === Workflow actions ===

pub async fn create_po(
    ctx: &AppContext,
    as_user: UserId,
    seller_id: UserId,
    amount: Decimal,
    currency: &str,
    file: &Path,
) -> anyhow::Result<Applied> {
    let actor = ctx.actor(as_user)?;
    let terms = OrderTerms {
        seller_id,
        amount: Amount::new(amount)?,
        currency: currency.parse::<Currency>()?,
    };
    let upload = ctx.upload_file(file).await?;

    let applied = ctx.engine.create_po(&actor, terms, upload).await?;
    print_applied("Created", &applied);
    Ok(applied)
}

pub async fn issue_loc(ctx: &AppContext, as_user: UserId, po_id: DocumentId, file: &Path) -> anyhow::Result<Applied> {
    let actor = ctx.actor(as_user)?;
    let upload = ctx.upload_file(file).await?;

    let applied = ctx.engine.issue_loc(&actor, po_id, upload).await?;
    print_applied("Issued", &applied);
    Ok(applied)
}

pub async fn upload_bol(
    ctx: &AppContext,
    as_user: UserId,
    po_id: DocumentId,
    file: &Path,
    tracking_id: Option<String>,
) -> anyhow::Result<Applied> {
    let actor = ctx.actor(as_user)?;
    let upload = ctx.upload_file(file).await?;

    let applied = ctx.engine.upload_bol(&actor, po_id, upload, tracking_id).await?;
    print_applied("Uploaded", &applied);
    Ok(applied)
}

pub async fn ship(ctx: &AppContext, as_user: UserId, po_id: DocumentId) -> anyhow::Result<Applied> {
    let actor = ctx.actor(as_user)?;
    let applied = ctx.engine.ship(&actor, po_id).await?;
    print_applied("Shipped", &applied);
    Ok(applied)
}

pub async fn receive(ctx: &AppContext, as_user: UserId, po_id: DocumentId) -> anyhow::Result<Applied> {
    let actor = ctx.actor(as_user)?;
    let applied = ctx.engine.receive(&actor, po_id).await?;
    print_applied("Received", &applied);
    Ok(applied)
}

pub async fn issue_invoice(
    ctx: &AppContext,
    as_user: UserId,
    po_id: DocumentId,
    file: &Path,
) -> anyhow::Result<Applied> {
    let actor = ctx.actor(as_user)?;
    let upload = ctx.upload_file(file).await?;

    let applied = ctx.engine.issue_invoice(&actor, po_id, upload).await?;
    print_applied("Issued", &applied);
    Ok(applied)
}

/// `document_id` may be the invoice or its purchase order
pub async fn pay(ctx: &AppContext, as_user: UserId, document_id: DocumentId) -> anyhow::Result<Applied> {
    let actor = ctx.actor(as_user)?;
    let applied = ctx.engine.pay_invoice(&actor, document_id).await?;
    print_applied("Paid", &applied);
    Ok(applied)
}

/// Auditor sign-off
pub async fn verify_doc(ctx: &AppContext, as_user: UserId, document_id: DocumentId) -> anyhow::Result<Applied> {
    let actor = ctx.actor(as_user)?;
    let applied = ctx.engine.verify_document(&actor, document_id).await?;
    print_applied("Verified", &applied);
    Ok(applied)
}

/// File integrity check
pub async fn verify_hash(
    ctx: &AppContext,
    as_user: UserId,
    document_id: DocumentId,
) -> anyhow::Result<VerificationReport> {
    let actor = ctx.actor(as_user)?;
    let report = ctx.verifier.verify(&actor, document_id).await?;

    if report.is_valid {
        println!(
            "✅ Document {} matches its recorded hash (ledger entry {})",
            report.document_id, report.ledger_entry_id
        );
    } else {
        println!(
            "❌ Document {} does NOT match: expected {}, got {} (ledger entry {})",
            report.document_id, report.expected_hash, report.actual_hash, report.ledger_entry_id
        );
    }
    if report.is_compromised {
        println!("⚠️  Document {} is marked compromised", report.document_id);
    }
    Ok(report)
}

pub async fn reupload(
    ctx: &AppContext,
    as_user: UserId,
    document_id: DocumentId,
    file: &Path,
) -> anyhow::Result<Applied> {
    let actor = ctx.actor(as_user)?;
    let upload = ctx.upload_file(file).await?;

    let applied = ctx.engine.replace_file(&actor, document_id, upload).await?;
    print_applied("Re-uploaded", &applied);
    Ok(applied)
}

// === Views ===

pub fn documents(ctx: &AppContext, as_user: UserId) -> anyhow::Result<Vec<Document>> {
    let docs = ctx.documents(as_user)?;

    println!("{:<6} {:<16} {:<8} {:<10} {:<6} {:<9} {:<11}", "ID", "NUMBER", "TYPE", "STATUS", "TXN", "VERIFIED", "COMPROMISED");
    for doc in &docs {
        println!(
            "{:<6} {:<16} {:<8} {:<10} {:<6} {:<9} {:<11}",
            doc.id, doc.doc_number, doc.doc_type, doc.status, doc.transaction_id, doc.is_verified, doc.is_compromised
        );
    }
    Ok(docs)
}

/// One document with its ledger timeline
pub fn document(
    ctx: &AppContext,
    as_user: UserId,
    id: DocumentId,
) -> anyhow::Result<(Document, Vec<TimelineEntry>)> {
    let (doc, _) = ctx.document(as_user, id)?;
    let timeline = ctx.timeline(&LedgerQuery::new().document(id))?;

    print_json(&doc)?;
    print_timeline(&timeline);
    Ok((doc, timeline))
}

pub fn transactions(ctx: &AppContext, as_user: UserId) -> anyhow::Result<Vec<Transaction>> {
    let txns = ctx.transactions(as_user)?;

    println!("{:<6} {:<6} {:<6} {:>14} {:<5} {:<12}", "ID", "BUYER", "SELLER", "AMOUNT", "CCY", "STATUS");
    for txn in &txns {
        println!(
            "{:<6} {:<6} {:<6} {:>14} {:<5} {:<12}",
            txn.id, txn.buyer_id, txn.seller_id, txn.amount, txn.currency, txn.status
        );
    }
    Ok(txns)
}

/// One transaction with its documents and ledger timeline
pub fn transaction(
    ctx: &AppContext,
    as_user: UserId,
    id: TransactionId,
) -> anyhow::Result<(Transaction, Vec<Document>, Vec<TimelineEntry>)> {
    let (txn, docs) = ctx.transaction(as_user, id)?;
    let timeline = ctx.timeline(&LedgerQuery::new().transaction(id))?;

    print_json(&txn)?;
    for doc in &docs {
        println!("  {} {} {}", doc.doc_number, doc.status, doc.file_hash);
    }
    print_timeline(&timeline);
    Ok((txn, docs, timeline))
}

fn print_timeline(timeline: &[TimelineEntry]) {
    for item in timeline {
        let entry = &item.entry;
        println!(
            "#{:<5} {} {:<14} by {} ({}, {}) doc {} txn {}",
            entry.id,
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.action,
            item.actor_name,
            entry.actor_role,
            item.actor_org,
            entry.document_id,
            entry.transaction_id
        );
    }
}

pub fn ledger(
    ctx: &AppContext,
    actor: Option<UserId>,
    document: Option<DocumentId>,
    transaction: Option<TransactionId>,
    since: Option<DateTime<Utc>>,
    action: Option<LedgerAction>,
) -> anyhow::Result<Vec<TimelineEntry>> {
    let query = LedgerQuery {
        actor_id: actor,
        document_id: document,
        transaction_id: transaction,
        since,
        action,
    };
    let timeline = ctx.timeline(&query)?;

    print_timeline(&timeline);
    println!("{} entries", timeline.len());
    Ok(timeline)
}

/// Verify the ledger hash chain
pub fn audit(ctx: &AppContext) -> anyhow::Result<usize> {
    let count = ctx.audit().context("Ledger hash chain is broken")?;
    println!("✅ Ledger hash chain verified ({} entries)", count);
    Ok(count)
}

// === Risk and dashboards ===

pub fn risk(ctx: &AppContext, user_id: UserId) -> anyhow::Result<RiskScore> {
    let score = ctx.risk.score(user_id)?;
    println!(
        "User {}: {} completed, {} disputed, risk {}%",
        score.user_id, score.completed, score.disputed, score.risk_percent
    );
    Ok(score)
}

pub fn leaderboard(ctx: &AppContext, board: Board, limit: Option<usize>) -> anyhow::Result<Vec<Ranking>> {
    let n = limit.unwrap_or(ctx.config.leaderboard_size);
    let rows = match board {
        Board::Risk => ctx.risk.top_risky(n)?,
        Board::Volume => ctx.risk.top_volume(n)?,
    };

    println!("{:<4} {:<6} {:<20} {:<16} {:>5} {:>14} {:>8}", "#", "USER", "NAME", "ORG", "TXNS", "VOLUME", "RISK%");
    for (rank, row) in rows.iter().enumerate() {
        println!(
            "{:<4} {:<6} {:<20} {:<16} {:>5} {:>14} {:>8}",
            rank + 1,
            row.user_id,
            row.name,
            row.org,
            row.transactions,
            row.volume,
            row.risk_percent
        );
    }
    Ok(rows)
}

pub fn totals(ctx: &AppContext, org: &str) -> anyhow::Result<OrgTotals> {
    let totals = ctx.risk.org_totals(org)?;
    println!(
        "{}: bought {}, sold {}, total {}",
        totals.org, totals.total_bought, totals.total_sold, totals.total_amount
    );
    Ok(totals)
}

pub fn breakdown(ctx: &AppContext, org: &str) -> anyhow::Result<Vec<StatusCount>> {
    let counts = ctx.risk.status_breakdown(org)?;
    for count in &counts {
        println!("{:<12} {}", count.status, count.count);
    }
    Ok(counts)
}

/// Rows for the export collaborator, one JSON object per line
pub fn export(ctx: &AppContext, org: &str) -> anyhow::Result<Vec<ExportRow>> {
    let rows = ctx.risk.export_rows(org)?;
    for row in &rows {
        println!("{}", serde_json::to_string(row)?);
    }
    Ok(rows)
}

/// Documents currently marked compromised
pub fn alerts(ctx: &AppContext) -> anyhow::Result<Vec<Document>> {
    let docs = ctx.verifier.alerts()?;
    if docs.is_empty() {
        println!("✅ No compromised documents");
    }
    for doc in &docs {
        println!(
            "⚠️  {} (transaction {}) failed integrity verification",
            doc.doc_number, doc.transaction_id
        );
    }
    Ok(docs)
}
