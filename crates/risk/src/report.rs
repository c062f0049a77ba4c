//! Organisation dashboard views

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use strum::IntoEnumIterator;
use tradeflow_core::{Amount, Currency, Transaction, TransactionId, TransactionStatus, User, UserId};

/// Amounts an organisation bought, sold and took part in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrgTotals {
    pub org: String,
    pub total_bought: Decimal,
    pub total_sold: Decimal,
    /// Each transaction counted once, even when both sides are in the org
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: TransactionStatus,
    pub count: usize,
}

/// One transaction, flattened for the export collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub transaction_id: TransactionId,
    pub buyer: String,
    pub seller: String,
    pub amount: Amount,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

/// Transactions with a buyer or seller in `org`
struct OrgView<'a> {
    org: &'a str,
    users: HashMap<UserId, &'a User>,
    transactions: &'a [Transaction],
}

impl<'a> OrgView<'a> {
    fn new(org: &'a str, users: &'a [User], transactions: &'a [Transaction]) -> Self {
        Self {
            org,
            users: users.iter().map(|u| (u.id, u)).collect(),
            transactions,
        }
    }

    fn in_org(&self, user_id: UserId) -> bool {
        self.users.get(&user_id).is_some_and(|u| u.org == self.org)
    }

    fn name(&self, user_id: UserId) -> String {
        self.users
            .get(&user_id)
            .map(|u| u.name.clone())
            .unwrap_or_else(|| format!("user {user_id}"))
    }

    fn involved(&self) -> impl Iterator<Item = &'a Transaction> + '_ {
        self.transactions
            .iter()
            .filter(|t| self.in_org(t.buyer_id) || self.in_org(t.seller_id))
    }
}

pub fn org_totals(org: &str, users: &[User], transactions: &[Transaction]) -> OrgTotals {
    let view = OrgView::new(org, users, transactions);
    let mut totals = OrgTotals {
        org: org.to_string(),
        total_bought: Decimal::ZERO,
        total_sold: Decimal::ZERO,
        total_amount: Decimal::ZERO,
    };

    for txn in view.involved() {
        let amount = txn.amount.value();
        if view.in_org(txn.buyer_id) {
            totals.total_bought += amount;
        }
        if view.in_org(txn.seller_id) {
            totals.total_sold += amount;
        }
        totals.total_amount += amount;
    }
    totals
}

/// Count per status, every status listed
pub fn status_breakdown(org: &str, users: &[User], transactions: &[Transaction]) -> Vec<StatusCount> {
    let view = OrgView::new(org, users, transactions);
    TransactionStatus::iter()
        .map(|status| StatusCount {
            status,
            count: view.involved().filter(|t| t.status == status).count(),
        })
        .collect()
}

pub fn export_rows(org: &str, users: &[User], transactions: &[Transaction]) -> Vec<ExportRow> {
    let view = OrgView::new(org, users, transactions);
    view.involved()
        .map(|txn| ExportRow {
            transaction_id: txn.id,
            buyer: view.name(txn.buyer_id),
            seller: view.name(txn.seller_id),
            amount: txn.amount,
            currency: txn.currency.clone(),
            status: txn.status,
            created_at: txn.created_at,
        })
        .collect()
}
