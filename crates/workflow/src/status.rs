//! Transaction status derived from its documents

use tradeflow_core::{DocType, Document, DocumentStatus, TransactionStatus};

/// Recompute the transaction status from its documents.
///
/// Terminal statuses are kept as they are; otherwise a compromised document
/// disputes the transaction, a paid invoice completes it and an issued BOL
/// puts it in progress. The result never moves backwards from `current`.
pub fn derive_status(current: TransactionStatus, documents: &[Document]) -> TransactionStatus {
    if current.is_terminal() {
        return current;
    }

    let has = |doc_type: DocType, status: Option<DocumentStatus>| {
        documents
            .iter()
            .any(|d| d.doc_type == doc_type && status.map_or(true, |s| d.status == s))
    };

    let derived = if documents.iter().any(|d| d.is_compromised) {
        TransactionStatus::Disputed
    } else if has(DocType::Invoice, Some(DocumentStatus::Pay)) {
        TransactionStatus::Completed
    } else if has(DocType::Bol, None) {
        TransactionStatus::InProgress
    } else {
        TransactionStatus::Pending
    };

    if current.can_advance_to(derived) {
        derived
    } else {
        current
    }
}
