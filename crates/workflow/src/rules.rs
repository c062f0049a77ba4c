//! Static transition table
//!
//! | doc     | from            | action        | role    | to        |
//! |---------|-----------------|---------------|---------|-----------|
//! | PO      | (new)           | CREATE_PO     | buyer   | CREATED   |
//! | PO      | CREATED         | ISSUE_LOC     | bank    | CREATED   |
//! | PO      | CREATED         | ISSUE_BOL     | seller  | ISSUE_BOL |
//! | PO      | ISSUE_BOL       | SHIP          | seller  | SHIP      |
//! | PO      | SHIP            | RECEIVE       | buyer   | RECEIVE   |
//! | PO      | SHIP, RECEIVE   | ISSUE_INVOICE | seller  | unchanged |
//! | PO      | RECEIVE         | PAY           | bank    | PAY       |
//! | INVOICE | CREATED         | PAY           | bank    | PAY       |
//! | any     | non-terminal    | VERIFY        | auditor | unchanged |

use tradeflow_core::{Action, DocType, DocumentStatus, Role};

/// Statuses a document can still leave
pub const NON_TERMINAL: &[DocumentStatus] = &[
    DocumentStatus::Created,
    DocumentStatus::IssueBol,
    DocumentStatus::Ship,
    DocumentStatus::Receive,
];

/// Where a transition starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The document does not exist yet
    New,
    /// The target document is in one of these statuses
    In(&'static [DocumentStatus]),
}

/// What the engine does once the guards pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Create the transaction and its purchase order
    OpenTransaction,
    /// Create a linked document of this type
    Issue(DocType),
    /// Move the target to `to`
    Advance,
    /// Mark both PO and invoice paid, complete the transaction
    Settle,
    /// Set the auditor verification flag
    MarkVerified,
}

/// A condition on live transaction state, checked after the table lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prerequisite {
    /// Counterparty exists and holds the seller role
    SellerRegistered,
    /// Order amount is above zero
    PositiveAmount,
    /// No document of this type yet (duplicate -> InvalidTransition)
    Absent(DocType),
    /// A document of this type exists (else MissingPrerequisite)
    Present(DocType),
    /// The invoice exists and has not been paid
    InvoiceUnpaid,
    /// The purchase order reached RECEIVE
    GoodsReceived,
    /// No document in the transaction is compromised
    NothingCompromised,
    /// Every document verified, when the policy asks for it
    AuditComplete,
    /// Target not verified yet
    NotVerified,
}

/// One row of the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub doc_type: DocType,
    pub from: Source,
    pub action: Action,
    pub role: Role,
    /// New status of the target, `None` leaves it unchanged
    pub to: Option<DocumentStatus>,
    pub effect: Effect,
    pub requires: &'static [Prerequisite],
}

macro_rules! verify_row {
    ($doc_type:expr) => {
        Transition {
            doc_type: $doc_type,
            from: Source::In(NON_TERMINAL),
            action: Action::Verify,
            role: Role::Auditor,
            to: None,
            effect: Effect::MarkVerified,
            requires: &[Prerequisite::NotVerified],
        }
    };
}

pub static TRANSITIONS: &[Transition] = &[
    Transition {
        doc_type: DocType::Po,
        from: Source::New,
        action: Action::CreatePo,
        role: Role::Buyer,
        to: Some(DocumentStatus::Created),
        effect: Effect::OpenTransaction,
        requires: &[Prerequisite::SellerRegistered, Prerequisite::PositiveAmount],
    },
    Transition {
        doc_type: DocType::Po,
        from: Source::In(&[DocumentStatus::Created]),
        action: Action::IssueLoc,
        role: Role::Bank,
        to: None,
        effect: Effect::Issue(DocType::Loc),
        requires: &[Prerequisite::Absent(DocType::Loc)],
    },
    Transition {
        doc_type: DocType::Po,
        from: Source::In(&[DocumentStatus::Created]),
        action: Action::IssueBol,
        role: Role::Seller,
        to: Some(DocumentStatus::IssueBol),
        effect: Effect::Issue(DocType::Bol),
        requires: &[Prerequisite::Present(DocType::Loc), Prerequisite::Absent(DocType::Bol)],
    },
    Transition {
        doc_type: DocType::Po,
        from: Source::In(&[DocumentStatus::IssueBol]),
        action: Action::Ship,
        role: Role::Seller,
        to: Some(DocumentStatus::Ship),
        effect: Effect::Advance,
        requires: &[],
    },
    Transition {
        doc_type: DocType::Po,
        from: Source::In(&[DocumentStatus::Ship]),
        action: Action::Receive,
        role: Role::Buyer,
        to: Some(DocumentStatus::Receive),
        effect: Effect::Advance,
        requires: &[],
    },
    Transition {
        doc_type: DocType::Po,
        from: Source::In(&[DocumentStatus::Ship, DocumentStatus::Receive]),
        action: Action::IssueInvoice,
        role: Role::Seller,
        to: None,
        effect: Effect::Issue(DocType::Invoice),
        requires: &[Prerequisite::Present(DocType::Bol), Prerequisite::Absent(DocType::Invoice)],
    },
    Transition {
        doc_type: DocType::Po,
        from: Source::In(&[DocumentStatus::Receive]),
        action: Action::Pay,
        role: Role::Bank,
        to: Some(DocumentStatus::Pay),
        effect: Effect::Settle,
        requires: &[
            Prerequisite::InvoiceUnpaid,
            Prerequisite::NothingCompromised,
            Prerequisite::AuditComplete,
        ],
    },
    Transition {
        doc_type: DocType::Invoice,
        from: Source::In(&[DocumentStatus::Created]),
        action: Action::Pay,
        role: Role::Bank,
        to: Some(DocumentStatus::Pay),
        effect: Effect::Settle,
        requires: &[
            Prerequisite::GoodsReceived,
            Prerequisite::NothingCompromised,
            Prerequisite::AuditComplete,
        ],
    },
    verify_row!(DocType::Po),
    verify_row!(DocType::Loc),
    verify_row!(DocType::Bol),
    verify_row!(DocType::Invoice),
];

/// True if any row lets `role` perform `action` on `doc_type`, in any status
pub fn permits(doc_type: DocType, action: Action, role: Role) -> bool {
    TRANSITIONS
        .iter()
        .any(|t| t.doc_type == doc_type && t.action == action && t.role == role)
}

/// The row for an existing document in `status`, if any
pub fn lookup(
    doc_type: DocType,
    status: DocumentStatus,
    action: Action,
    role: Role,
) -> Option<&'static Transition> {
    TRANSITIONS.iter().find(|t| {
        t.doc_type == doc_type
            && t.action == action
            && t.role == role
            && matches!(t.from, Source::In(statuses) if statuses.contains(&status))
    })
}

/// The row that creates a new document with `action`
pub fn lookup_new(action: Action, role: Role) -> Option<&'static Transition> {
    TRANSITIONS
        .iter()
        .find(|t| t.action == action && t.role == role && t.from == Source::New)
}
