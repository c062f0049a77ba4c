//! Per-user risk tallies
//!
//! Rebuilt from user and transaction rows on every read; only terminal
//! transactions (completed or disputed) feed the risk percentage.

use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use tradeflow_core::{Role, Transaction, TransactionStatus, User, UserId};

/// Risk score of one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskScore {
    pub user_id: UserId,
    pub completed: u32,
    pub disputed: u32,
    /// `disputed / (completed + disputed) * 100`, 2 dp, 0 with no terminal
    /// transactions
    pub risk_percent: Decimal,
}

/// Counters for one user across every transaction they are party to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserTally {
    pub completed: u32,
    pub disputed: u32,
    pub transactions: u32,
    pub volume: Decimal,
}

impl UserTally {
    fn record(&mut self, txn: &Transaction) {
        self.transactions += 1;
        self.volume += txn.amount.value();
        match txn.status {
            TransactionStatus::Completed => self.completed += 1,
            TransactionStatus::Disputed => self.disputed += 1,
            TransactionStatus::Pending | TransactionStatus::InProgress => {}
        }
    }

    pub fn risk_percent(&self) -> Decimal {
        let terminal = self.completed + self.disputed;
        if terminal == 0 {
            return Decimal::ZERO;
        }
        (Decimal::from(self.disputed) * Decimal::ONE_HUNDRED / Decimal::from(terminal)).round_dp(2)
    }
}

/// One leaderboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ranking {
    pub user_id: UserId,
    pub name: String,
    pub org: String,
    pub role: Role,
    pub transactions: u32,
    pub volume: Decimal,
    pub risk_percent: Decimal,
}

/// Tallies for every buyer and seller
#[derive(Debug, Default)]
pub struct RiskState {
    users: Vec<User>,
    tallies: HashMap<UserId, UserTally>,
}

impl RiskState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild tallies from scratch
    pub fn rebuild(users: &[User], transactions: &[Transaction]) -> Self {
        let mut tallies: HashMap<UserId, UserTally> = HashMap::new();
        for txn in transactions {
            tallies.entry(txn.buyer_id).or_default().record(txn);
            if txn.seller_id != txn.buyer_id {
                tallies.entry(txn.seller_id).or_default().record(txn);
            }
        }

        let users = users
            .iter()
            .filter(|u| matches!(u.role, Role::Buyer | Role::Seller))
            .cloned()
            .collect();

        Self { users, tallies }
    }

    /// Tally for a user (all zero if they have no transactions)
    pub fn tally(&self, user_id: UserId) -> UserTally {
        self.tallies.get(&user_id).cloned().unwrap_or_default()
    }

    pub fn score(&self, user_id: UserId) -> RiskScore {
        let tally = self.tally(user_id);
        RiskScore {
            user_id,
            completed: tally.completed,
            disputed: tally.disputed,
            risk_percent: tally.risk_percent(),
        }
    }

    /// Highest risk first
    pub fn top_risky(&self, n: usize) -> Vec<Ranking> {
        self.ranked(n, |a, b| b.risk_percent.cmp(&a.risk_percent))
    }

    /// Highest total amount first
    pub fn top_volume(&self, n: usize) -> Vec<Ranking> {
        self.ranked(n, |a, b| b.volume.cmp(&a.volume))
    }

    /// Sort by `primary`, then more transactions, then lower user id
    fn ranked(&self, n: usize, primary: impl Fn(&Ranking, &Ranking) -> Ordering) -> Vec<Ranking> {
        let mut rows: Vec<Ranking> = self
            .users
            .iter()
            .map(|user| {
                let tally = self.tally(user.id);
                Ranking {
                    user_id: user.id,
                    name: user.name.clone(),
                    org: user.org.clone(),
                    role: user.role,
                    transactions: tally.transactions,
                    volume: tally.volume,
                    risk_percent: tally.risk_percent(),
                }
            })
            .collect();

        rows.sort_by(|a, b| {
            primary(a, b)
                .then_with(|| b.transactions.cmp(&a.transactions))
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        rows.truncate(n);
        rows
    }
}
