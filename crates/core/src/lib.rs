//! Tradeflow Core - Domain types
//!
//! This crate contains the fundamental types shared by every Tradeflow crate:
//! - `Amount`: Non-negative decimal wrapper for trade amounts
//! - `Currency`: Type-safe currency codes
//! - `Role`, `User`, `Actor`: who is acting
//! - `DocType`, `DocumentStatus`, `Document`: trade documents
//! - `TransactionStatus`, `Transaction`: the aggregate grouping documents
//! - `Action`: workflow actions that move documents through their lifecycle

pub mod action;
pub mod amount;
pub mod currency;
pub mod document;
pub mod transaction;
pub mod user;

pub use action::Action;
pub use amount::{Amount, AmountError};
pub use currency::{Currency, CurrencyError};
pub use document::{DocType, Document, DocumentStatus, NewDocument};
pub use transaction::{NewTransaction, Transaction, TransactionStatus};
pub use user::{Actor, NewUser, Role, User};

/// Identifier of a user (assigned by the auth collaborator)
pub type UserId = i64;

/// Identifier of a document
pub type DocumentId = i64;

/// Identifier of a transaction
pub type TransactionId = i64;
