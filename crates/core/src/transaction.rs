//! Transaction aggregate
//!
//! A transaction groups the documents exchanged between one buyer and one
//! seller. Its status is derived from those documents and only moves forward:
//!
//! ```text
//! pending ──► in_progress ──► completed
//!    │             │
//!    └─────────────┴────────► disputed
//! ```

use crate::{Amount, Currency, TransactionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Overall transaction status
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// PO issued, LOC and BOL not both in place yet
    Pending,
    /// Shipment documented, awaiting invoice settlement
    InProgress,
    /// A linked document failed integrity verification
    Disputed,
    /// Invoice paid
    Completed,
}

impl TransactionStatus {
    /// Completed and disputed transactions accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::Disputed)
    }

    fn rank(&self) -> u8 {
        match self {
            TransactionStatus::Pending => 0,
            TransactionStatus::InProgress => 1,
            TransactionStatus::Disputed | TransactionStatus::Completed => 2,
        }
    }

    /// True if moving from `self` to `next` respects the forward-only order.
    ///
    /// Staying in the same status is allowed; leaving a terminal status is not.
    pub fn can_advance_to(&self, next: TransactionStatus) -> bool {
        if *self == next {
            return true;
        }
        !self.is_terminal() && next.rank() > self.rank()
    }
}

/// A stored transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub amount: Amount,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// True if the user is the buyer or the seller
    pub fn involves(&self, user_id: UserId) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }
}

/// Fields supplied when a purchase order opens a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub amount: Amount,
    pub currency: Currency,
}
