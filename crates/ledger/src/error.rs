//! Ledger errors

use thiserror::Error;

/// Errors that can occur decoding stored ledger entries
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("extra_data must be a JSON object, got: {0}")]
    ExtraDataNotObject(String),

    #[error("Unknown ledger action: {0}")]
    UnknownAction(String),
}
