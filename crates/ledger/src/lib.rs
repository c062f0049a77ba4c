//! Tradeflow Ledger - Append-only audit log
//!
//! The ledger is the ONLY record of history. Every accepted workflow action
//! and every integrity check becomes exactly one entry.
//!
//! # Key Types
//! - `LedgerEntry`: Sealed, hash-chained record of one action
//! - `NewEntry`: Entry content before the store assigns id and hash
//! - `LedgerAction`: What happened
//! - `LedgerQuery`: Read filter (actor, document, transaction, since, action)

pub mod entry;
pub mod error;
pub mod hash;
pub mod query;

pub use entry::{decode_extra_data, EntryId, ExtraData, LedgerAction, LedgerEntry, NewEntry};
pub use error::LedgerError;
pub use hash::{calculate_entry_hash, verify_chain, ChainError, GENESIS_HASH};
pub use query::LedgerQuery;
