//! Tradeflow Risk - Derived risk views
//!
//! Nothing here is stored. Every score, leaderboard and total is recomputed
//! from the users and transactions in the store on each call.
//!
//! # Key Types
//! - `RiskScorer`: Read-only views over a `Store`
//! - `RiskState`: Per-user tallies rebuilt from transaction rows
//! - `RiskScore`, `Ranking`, `OrgTotals`, `ExportRow`: View results

pub mod error;
pub mod report;
pub mod scorer;
pub mod state;

pub use error::{RiskError, RiskResult};
pub use report::{ExportRow, OrgTotals, StatusCount};
pub use scorer::RiskScorer;
pub use state::{Ranking, RiskScore, RiskState, UserTally};
