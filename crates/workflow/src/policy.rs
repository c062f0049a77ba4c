//! Configurable workflow guards

use serde::{Deserialize, Serialize};

/// Workflow policy switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowPolicy {
    /// PAY requires every document of the transaction to be auditor-verified
    #[serde(default)]
    pub require_audit_before_payment: bool,
}

impl WorkflowPolicy {
    pub fn audited() -> Self {
        Self {
            require_audit_before_payment: true,
        }
    }
}
