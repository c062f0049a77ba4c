//! Risk view errors

use thiserror::Error;
use tradeflow_core::UserId;
use tradeflow_store::StoreError;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("User not found: {0}")]
    UnknownUser(UserId),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

pub type RiskResult<T> = Result<T, RiskError>;
