//! Read-only risk and dashboard views over the store

use crate::error::{RiskError, RiskResult};
use crate::report::{self, ExportRow, OrgTotals, StatusCount};
use crate::state::{Ranking, RiskScore, RiskState};
use tracing::debug;
use tradeflow_core::{Transaction, User, UserId};
use tradeflow_store::{Store, StoreError};

/// Derives risk views on demand; takes no workflow lock
#[derive(Debug, Clone)]
pub struct RiskScorer {
    store: Store,
}

impl RiskScorer {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn snapshot(&self) -> RiskResult<(Vec<User>, Vec<Transaction>)> {
        let (users, transactions) = self
            .store
            .read(|repo| Ok((repo.users()?, repo.transactions()?)))?;
        debug!(
            users = users.len(),
            transactions = transactions.len(),
            "Loaded risk snapshot"
        );
        Ok((users, transactions))
    }

    fn state(&self) -> RiskResult<RiskState> {
        let (users, transactions) = self.snapshot()?;
        Ok(RiskState::rebuild(&users, &transactions))
    }

    pub fn score(&self, user_id: UserId) -> RiskResult<RiskScore> {
        match self.store.read(|repo| repo.user(user_id)) {
            Ok(_) => {}
            Err(StoreError::NotFound { .. }) => return Err(RiskError::UnknownUser(user_id)),
            Err(err) => return Err(err.into()),
        }
        Ok(self.state()?.score(user_id))
    }

    pub fn top_risky(&self, n: usize) -> RiskResult<Vec<Ranking>> {
        Ok(self.state()?.top_risky(n))
    }

    pub fn top_volume(&self, n: usize) -> RiskResult<Vec<Ranking>> {
        Ok(self.state()?.top_volume(n))
    }

    pub fn org_totals(&self, org: &str) -> RiskResult<OrgTotals> {
        let (users, transactions) = self.snapshot()?;
        Ok(report::org_totals(org, &users, &transactions))
    }

    pub fn status_breakdown(&self, org: &str) -> RiskResult<Vec<StatusCount>> {
        let (users, transactions) = self.snapshot()?;
        Ok(report::status_breakdown(org, &users, &transactions))
    }

    pub fn export_rows(&self, org: &str) -> RiskResult<Vec<ExportRow>> {
        let (users, transactions) = self.snapshot()?;
        Ok(report::export_rows(org, &users, &transactions))
    }
}
