//! Tradeflow Workflow - Document state machine
//!
//! Every workflow action is checked against one static transition table
//! keyed by `(doc_type, status, action, role)`, then committed together with
//! its ledger entry while the transaction's lock is held.
//!
//! # Key Types
//! - `WorkflowEngine`: `apply` plus one helper per operation
//! - `Transition`: A row of the transition table
//! - `ActionRequest` / `Applied`: Input and result of `apply`
//! - `WorkflowPolicy`: Configurable guards

pub mod engine;
pub mod error;
pub mod policy;
pub mod request;
pub mod rules;
pub mod status;

pub use engine::WorkflowEngine;
pub use error::{WorkflowError, WorkflowResult};
pub use policy::WorkflowPolicy;
pub use request::{ActionRequest, Applied, OrderTerms, Target, Upload};
pub use rules::{Effect, Prerequisite, Source, Transition, TRANSITIONS};
pub use status::derive_status;
