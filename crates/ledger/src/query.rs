//! Ledger read filter

use crate::entry::{LedgerAction, LedgerEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tradeflow_core::{DocumentId, TransactionId, UserId};

/// Filter for ledger reads. All criteria are ANDed; results are oldest first.
///
/// ```
/// use tradeflow_ledger::{LedgerAction, LedgerQuery};
///
/// let query = LedgerQuery::new()
///     .transaction(4)
///     .action(LedgerAction::VerifyFailed);
/// assert_eq!(query.transaction_id, Some(4));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerQuery {
    pub actor_id: Option<UserId>,
    pub document_id: Option<DocumentId>,
    pub transaction_id: Option<TransactionId>,
    /// Inclusive lower bound on `created_at`
    pub since: Option<DateTime<Utc>>,
    pub action: Option<LedgerAction>,
}

impl LedgerQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actor(mut self, actor_id: UserId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn document(mut self, document_id: DocumentId) -> Self {
        self.document_id = Some(document_id);
        self
    }

    pub fn transaction(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn action(mut self, action: LedgerAction) -> Self {
        self.action = Some(action);
        self
    }

    /// True if the entry satisfies every criterion
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.actor_id.map_or(true, |id| entry.actor_id == id)
            && self.document_id.map_or(true, |id| entry.document_id == id)
            && self.transaction_id.map_or(true, |id| entry.transaction_id == id)
            && self.since.map_or(true, |since| entry.created_at >= since)
            && self.action.map_or(true, |action| entry.action == action)
    }
}
