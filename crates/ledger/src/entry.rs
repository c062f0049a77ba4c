//! Ledger entries

use crate::error::LedgerError;
use crate::hash::calculate_entry_hash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};
use tradeflow_core::{Action, Actor, DocumentId, Role, TransactionId, UserId};

/// Ledger entry identifier (monotonic, starts at 1)
pub type EntryId = i64;

/// Free-form correlation keys (`po_id`, `tracking_id`, ...)
pub type ExtraData = serde_json::Map<String, Value>;

/// What a ledger entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerAction {
    CreatePo,
    IssueLoc,
    IssueBol,
    Ship,
    Receive,
    IssueInvoice,
    Pay,
    Verify,
    VerifyOk,
    VerifyFailed,
    Reupload,
}

impl LedgerAction {
    /// Parse a stored action column
    pub fn parse(value: &str) -> Result<Self, LedgerError> {
        value
            .parse()
            .map_err(|_| LedgerError::UnknownAction(value.to_string()))
    }
}

/// Decode a stored extra_data column
pub fn decode_extra_data(value: &str) -> Result<ExtraData, LedgerError> {
    match serde_json::from_str::<Value>(value) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(LedgerError::ExtraDataNotObject(value.to_string())),
    }
}

impl From<Action> for LedgerAction {
    fn from(action: Action) -> Self {
        match action {
            Action::CreatePo => LedgerAction::CreatePo,
            Action::IssueLoc => LedgerAction::IssueLoc,
            Action::IssueBol => LedgerAction::IssueBol,
            Action::Ship => LedgerAction::Ship,
            Action::Receive => LedgerAction::Receive,
            Action::IssueInvoice => LedgerAction::IssueInvoice,
            Action::Pay => LedgerAction::Pay,
            Action::Verify => LedgerAction::Verify,
        }
    }
}

/// Entry content before it is sealed by the store
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub actor_id: UserId,
    pub actor_role: Role,
    pub document_id: DocumentId,
    pub transaction_id: TransactionId,
    pub action: LedgerAction,
    pub extra_data: ExtraData,
}

impl NewEntry {
    pub fn new(
        actor: &Actor,
        action: impl Into<LedgerAction>,
        document_id: DocumentId,
        transaction_id: TransactionId,
    ) -> Self {
        Self {
            actor_id: actor.user_id,
            actor_role: actor.role,
            document_id,
            transaction_id,
            action: action.into(),
            extra_data: ExtraData::new(),
        }
    }

    /// Attach a correlation key
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra_data.insert(key.to_string(), value.into());
        self
    }

    /// Merge caller-supplied keys; keys already set by the engine win
    pub fn merge(mut self, extra: &ExtraData) -> Self {
        for (key, value) in extra {
            self.extra_data
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }

    /// Assign position in the chain and compute the entry hash
    pub fn seal(self, id: EntryId, prev_hash: &str, created_at: DateTime<Utc>) -> LedgerEntry {
        let mut entry = LedgerEntry {
            id,
            actor_id: self.actor_id,
            actor_role: self.actor_role,
            document_id: self.document_id,
            transaction_id: self.transaction_id,
            action: self.action,
            extra_data: self.extra_data,
            created_at,
            prev_hash: prev_hash.to_string(),
            hash: String::new(),
        };
        entry.hash = calculate_entry_hash(&entry);
        entry
    }
}

/// A sealed ledger entry. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub document_id: DocumentId,
    pub transaction_id: TransactionId,
    pub action: LedgerAction,
    pub extra_data: ExtraData,
    pub created_at: DateTime<Utc>,
    pub prev_hash: String,
    pub hash: String,
}
