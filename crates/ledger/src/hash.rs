//! Hash chain utilities for ledger integrity

use crate::entry::LedgerEntry;
use sha2::{Digest, Sha256};

/// prev_hash of the first entry
pub const GENESIS_HASH: &str = "GENESIS";

/// Calculate SHA256 hash of entry content (excluding the hash field itself)
pub fn calculate_entry_hash(entry: &LedgerEntry) -> String {
    let mut hasher = Sha256::new();

    hasher.update(entry.id.to_le_bytes());
    hasher.update(entry.prev_hash.as_bytes());
    hasher.update(entry.created_at.to_rfc3339().as_bytes());
    hasher.update(entry.actor_id.to_le_bytes());
    hasher.update(entry.actor_role.as_ref().as_bytes());
    hasher.update(entry.document_id.to_le_bytes());
    hasher.update(entry.transaction_id.to_le_bytes());
    hasher.update(entry.action.as_ref().as_bytes());

    // Sorted for determinism
    let mut keys: Vec<_> = entry.extra_data.keys().collect();
    keys.sort();
    for key in keys {
        hasher.update(key.as_bytes());
        if let Some(value) = entry.extra_data.get(key) {
            hasher.update(value.to_string().as_bytes());
        }
    }

    hex::encode(hasher.finalize())
}

/// Verify hash chain integrity of a full, ordered ledger
pub fn verify_chain(entries: &[LedgerEntry]) -> Result<(), ChainError> {
    let mut prev_hash = GENESIS_HASH.to_string();

    for (i, entry) in entries.iter().enumerate() {
        if entry.prev_hash != prev_hash {
            return Err(ChainError::BrokenLink {
                id: entry.id,
                expected: prev_hash,
                actual: entry.prev_hash.clone(),
            });
        }

        let calculated = calculate_entry_hash(entry);
        if entry.hash != calculated {
            return Err(ChainError::InvalidHash {
                id: entry.id,
                expected: calculated,
                actual: entry.hash.clone(),
            });
        }

        if i > 0 && entry.id != entries[i - 1].id + 1 {
            return Err(ChainError::InvalidSequence {
                expected: entries[i - 1].id + 1,
                actual: entry.id,
            });
        }

        prev_hash = entry.hash.clone();
    }

    Ok(())
}

/// Errors in hash chain verification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("Broken link at entry {id}: expected prev_hash '{expected}', got '{actual}'")]
    BrokenLink {
        id: i64,
        expected: String,
        actual: String,
    },

    #[error("Invalid hash at entry {id}: expected '{expected}', got '{actual}'")]
    InvalidHash {
        id: i64,
        expected: String,
        actual: String,
    },

    #[error("Invalid sequence: expected {expected}, got {actual}")]
    InvalidSequence { expected: i64, actual: i64 },
}
