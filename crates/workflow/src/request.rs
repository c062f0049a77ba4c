//! Engine inputs and outputs

use serde::{Deserialize, Serialize};
use tradeflow_core::{Action, Amount, Currency, Document, DocumentId, Transaction, UserId};
use tradeflow_ledger::{EntryId, ExtraData};

/// A file already handed to the blob store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upload {
    /// SHA-256 (hex) of the bytes
    pub file_hash: String,
    pub file_url: String,
}

impl Upload {
    pub fn new(file_hash: impl Into<String>, file_url: impl Into<String>) -> Self {
        Self {
            file_hash: file_hash.into(),
            file_url: file_url.into(),
        }
    }
}

/// Commercial terms of a new purchase order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTerms {
    pub seller_id: UserId,
    pub amount: Amount,
    pub currency: Currency,
}

/// What an action is aimed at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// An existing document
    Document(DocumentId),
    /// A purchase order that does not exist yet
    NewOrder(OrderTerms),
}

/// One workflow action request
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub action: Action,
    pub target: Target,
    /// Required by actions that create a document
    pub upload: Option<Upload>,
    /// Caller correlation keys, merged into the ledger entry
    pub extra_data: ExtraData,
}

impl ActionRequest {
    pub fn new(action: Action, target: Target) -> Self {
        Self {
            action,
            target,
            upload: None,
            extra_data: ExtraData::new(),
        }
    }

    /// An action on an existing document
    pub fn on(action: Action, document_id: DocumentId) -> Self {
        Self::new(action, Target::Document(document_id))
    }

    pub fn with_upload(mut self, upload: Upload) -> Self {
        self.upload = Some(upload);
        self
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.extra_data.insert(key.to_string(), value.into());
        self
    }
}

/// Result of an accepted action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Applied {
    /// The created document, or the target when nothing was created
    pub document: Document,
    pub transaction: Transaction,
    pub ledger_entry_id: EntryId,
    pub created: bool,
}
