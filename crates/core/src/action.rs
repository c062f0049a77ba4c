//! Workflow actions

use crate::DocType;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// An action a participant can request against a document
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    CreatePo,
    IssueLoc,
    IssueBol,
    Ship,
    Receive,
    IssueInvoice,
    Pay,
    Verify,
}

impl Action {
    /// Document type this action brings into existence, if any
    pub fn creates(&self) -> Option<DocType> {
        match self {
            Action::CreatePo => Some(DocType::Po),
            Action::IssueLoc => Some(DocType::Loc),
            Action::IssueBol => Some(DocType::Bol),
            Action::IssueInvoice => Some(DocType::Invoice),
            _ => None,
        }
    }
}
