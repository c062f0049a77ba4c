//! Tradeflow Store - SQLite persistence
//!
//! Users, transactions, documents and the ledger live in one SQLite database.
//! Every workflow mutation and its ledger entry are written through
//! [`Store::atomic`], so either both land or neither does.
//!
//! # Key Types
//! - `Store`: Connection owner, unit of work with bounded retry
//! - `Repo`: Typed queries over a connection or an open transaction
//! - `LockManager`: Per-transaction async mutex
//! - `RetryPolicy`: Bounded retry for transient faults

pub mod error;
pub mod locks;
pub mod repo;
pub mod retry;
pub mod schema;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use locks::{LockManager, TransactionGuard};
pub use repo::Repo;
pub use retry::{RetryPolicy, Retryable};
pub use store::Store;
