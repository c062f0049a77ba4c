//! Trade documents
//!
//! Four document types hang off a transaction. Only the purchase order walks
//! the full shipping lifecycle; LOC, BOL and INVOICE are issued in `CREATED`
//! and the invoice moves to `PAY` once settled.

use crate::{DocumentId, TransactionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Document type
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocType {
    /// Purchase Order - opens the transaction
    Po,
    /// Letter of Credit - bank guarantee against a PO
    Loc,
    /// Bill of Lading - shipment proof
    Bol,
    /// Commercial invoice - payment request
    Invoice,
}

/// Document lifecycle status
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Created,
    IssueBol,
    Ship,
    Receive,
    Pay,
}

impl DocumentStatus {
    /// No workflow action (including VERIFY) leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Pay)
    }
}

/// A stored trade document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Human-readable number, e.g. `PO-000001`
    pub doc_number: String,
    pub doc_type: DocType,
    pub owner_id: UserId,
    pub transaction_id: TransactionId,
    pub status: DocumentStatus,
    /// SHA-256 (hex) of the file captured at upload
    pub file_hash: String,
    pub file_url: String,
    /// One-way latch set by a failed integrity check
    pub is_compromised: bool,
    /// Set by an auditor VERIFY
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Format the human-readable document number
    pub fn format_number(doc_type: DocType, id: DocumentId) -> String {
        format!("{}-{:06}", doc_type, id)
    }
}

/// Fields supplied when a document is first stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    pub doc_type: DocType,
    pub owner_id: UserId,
    pub transaction_id: TransactionId,
    pub file_hash: String,
    pub file_url: String,
}
