//! Workflow engine
//!
//! Guards run in a fixed order:
//!
//! 1. the actor's claimed role and org match the stored user
//! 2. the target document exists
//! 3. buyers and sellers act only on their own transactions
//! 4. some table row lets the role perform the action on the document type
//! 5. the transaction is not completed or disputed
//! 6. the target is not compromised
//! 7. a row exists for the target's current status
//! 8. the row's prerequisites hold against live state
//!
//! Steps 2-8 and the mutation run inside one SQLite transaction while the
//! transaction lock is held.

use crate::error::{WorkflowError, WorkflowResult};
use crate::policy::WorkflowPolicy;
use crate::request::{ActionRequest, Applied, OrderTerms, Target, Upload};
use crate::rules::{self, Effect, Prerequisite, Transition};
use crate::status::derive_status;
use tracing::{info, warn};
use tradeflow_core::{
    Action, Actor, DocType, Document, DocumentId, DocumentStatus, NewDocument, NewTransaction,
    Role, Transaction, User,
};
use tradeflow_ledger::{LedgerAction, NewEntry};
use tradeflow_store::{LockManager, Repo, Store, StoreError};
use uuid::Uuid;

/// A document with its transaction and siblings, read inside the unit of work
struct Snapshot {
    target: Document,
    transaction: Transaction,
    documents: Vec<Document>,
}

impl Snapshot {
    fn load(repo: &Repo<'_>, document_id: DocumentId) -> WorkflowResult<Self> {
        let target = repo.document(document_id)?;
        let transaction = repo.transaction(target.transaction_id)?;
        let documents = repo.documents_in(transaction.id)?;
        Ok(Self {
            target,
            transaction,
            documents,
        })
    }

    fn find(&self, doc_type: DocType) -> Option<&Document> {
        self.documents.iter().find(|d| d.doc_type == doc_type)
    }
}

/// Ledger key carrying the id of a document type
fn id_key(doc_type: DocType) -> &'static str {
    match doc_type {
        DocType::Po => "po_id",
        DocType::Loc => "loc_id",
        DocType::Bol => "bol_id",
        DocType::Invoice => "invoice_id",
    }
}

fn new_tracking_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("TRK-{}", id[..8].to_uppercase())
}

fn validate_upload(upload: &Upload) -> WorkflowResult<()> {
    let hash = &upload.file_hash;
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(WorkflowError::InvalidRequest(format!(
            "file_hash must be 64 hex characters, got '{}'",
            hash
        )));
    }
    if upload.file_url.trim().is_empty() {
        return Err(WorkflowError::InvalidRequest("file_url is empty".to_string()));
    }
    Ok(())
}

/// Check that target and upload fit the action before touching the store
fn validate_request(request: &ActionRequest) -> WorkflowResult<()> {
    match (&request.target, request.action) {
        (Target::NewOrder(_), Action::CreatePo) => {}
        (Target::NewOrder(_), action) => {
            return Err(WorkflowError::InvalidRequest(format!(
                "{} needs an existing document",
                action
            )))
        }
        (Target::Document(_), Action::CreatePo) => {
            return Err(WorkflowError::InvalidRequest(
                "CREATE_PO needs order terms".to_string(),
            ))
        }
        (Target::Document(_), _) => {}
    }

    match (&request.upload, request.action.creates()) {
        (Some(upload), Some(_)) => validate_upload(upload),
        (None, Some(doc_type)) => Err(WorkflowError::InvalidRequest(format!(
            "{} needs a {} file",
            request.action, doc_type
        ))),
        (Some(_), None) => Err(WorkflowError::InvalidRequest(format!(
            "{} does not take a file",
            request.action
        ))),
        (None, None) => Ok(()),
    }
}

/// Applies workflow actions against the store
pub struct WorkflowEngine {
    store: Store,
    locks: LockManager,
    policy: WorkflowPolicy,
}

impl WorkflowEngine {
    pub fn new(store: Store, locks: LockManager, policy: WorkflowPolicy) -> Self {
        Self {
            store,
            locks,
            policy,
        }
    }

    /// Engine with default policy and its own lock manager
    pub fn with_store(store: Store) -> Self {
        Self::new(store, LockManager::new(), WorkflowPolicy::default())
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn policy(&self) -> &WorkflowPolicy {
        &self.policy
    }

    /// Validate and commit one action, with its ledger entry, atomically
    pub async fn apply(&self, actor: &Actor, request: ActionRequest) -> WorkflowResult<Applied> {
        let result = self.dispatch(actor, &request).await;

        match &result {
            Ok(applied) => info!(
                action = %request.action,
                actor_id = actor.user_id,
                document_id = applied.document.id,
                transaction_id = applied.transaction.id,
                entry_id = applied.ledger_entry_id,
                "Action applied"
            ),
            Err(err) => warn!(
                action = %request.action,
                actor_id = actor.user_id,
                error = %err,
                "Action rejected"
            ),
        }

        result
    }

    async fn dispatch(&self, actor: &Actor, request: &ActionRequest) -> WorkflowResult<Applied> {
        validate_request(request)?;
        self.verify_actor(actor)?;

        match &request.target {
            Target::NewOrder(terms) => self.open_transaction(actor, terms, request).await,
            Target::Document(document_id) => self.transition(actor, *document_id, request).await,
        }
    }

    /// Re-check the claimed identity against the stored user
    fn verify_actor(&self, actor: &Actor) -> WorkflowResult<User> {
        let user = match self.store.read(|repo| repo.user(actor.user_id)) {
            Ok(user) => user,
            Err(StoreError::NotFound { .. }) => {
                return Err(WorkflowError::Unauthorized(format!(
                    "unknown user {}",
                    actor.user_id
                )))
            }
            Err(err) => return Err(err.into()),
        };

        if !actor.matches(&user) {
            return Err(WorkflowError::Unauthorized(format!(
                "claimed {} at '{}' does not match user {}",
                actor.role, actor.org, actor.user_id
            )));
        }
        Ok(user)
    }

    async fn open_transaction(
        &self,
        actor: &Actor,
        terms: &OrderTerms,
        request: &ActionRequest,
    ) -> WorkflowResult<Applied> {
        let row = rules::lookup_new(request.action, actor.role).ok_or_else(|| {
            WorkflowError::Unauthorized(format!("{} may not {}", actor.role, request.action))
        })?;
        let upload = request
            .upload
            .as_ref()
            .ok_or_else(|| WorkflowError::InvalidRequest("CREATE_PO needs a PO file".to_string()))?;

        self.store
            .atomic(|repo| {
                self.check_terms(repo, row, terms)?;

                let transaction = repo.insert_transaction(&NewTransaction {
                    buyer_id: actor.user_id,
                    seller_id: terms.seller_id,
                    amount: terms.amount,
                    currency: terms.currency.clone(),
                })?;
                let po = repo.insert_document(&NewDocument {
                    doc_type: DocType::Po,
                    owner_id: actor.user_id,
                    transaction_id: transaction.id,
                    file_hash: upload.file_hash.clone(),
                    file_url: upload.file_url.clone(),
                })?;

                let entry = NewEntry::new(actor, Action::CreatePo, po.id, transaction.id)
                    .with("po_id", po.id)
                    .with("transaction_id", transaction.id)
                    .with("seller_id", terms.seller_id)
                    .with("amount", terms.amount.to_string())
                    .with("currency", terms.currency.code())
                    .with("file_hash", upload.file_hash.clone())
                    .merge(&request.extra_data);
                let entry = repo.append(entry)?;

                Ok(Applied {
                    document: po,
                    transaction,
                    ledger_entry_id: entry.id,
                    created: true,
                })
            })
            .await
    }

    fn check_terms(&self, repo: &Repo<'_>, row: &Transition, terms: &OrderTerms) -> WorkflowResult<()> {
        for prerequisite in row.requires {
            match prerequisite {
                Prerequisite::SellerRegistered => {
                    let seller = repo.user(terms.seller_id)?;
                    if seller.role != Role::Seller {
                        return Err(WorkflowError::InvalidRequest(format!(
                            "user {} is a {}, not a seller",
                            seller.id, seller.role
                        )));
                    }
                }
                Prerequisite::PositiveAmount => {
                    if terms.amount.is_zero() {
                        return Err(WorkflowError::InvalidRequest(
                            "amount must be greater than zero".to_string(),
                        ));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn transition(
        &self,
        actor: &Actor,
        document_id: DocumentId,
        request: &ActionRequest,
    ) -> WorkflowResult<Applied> {
        // A document never changes transaction, so this read picks the lock
        let transaction_id = self.store.read(|repo| repo.document(document_id))?.transaction_id;
        let _guard = self.locks.acquire(transaction_id).await;

        self.store
            .atomic(|repo| {
                let snapshot = Snapshot::load(repo, document_id)?;
                let row = self.guard(actor, &snapshot, request.action)?;
                self.check_prerequisites(row, &snapshot)?;
                self.execute(repo, actor, row, &snapshot, request)
            })
            .await
    }

    fn guard(
        &self,
        actor: &Actor,
        snapshot: &Snapshot,
        action: Action,
    ) -> WorkflowResult<&'static Transition> {
        let target = &snapshot.target;
        let txn = &snapshot.transaction;

        let party = match actor.role {
            Role::Buyer => Some(txn.buyer_id),
            Role::Seller => Some(txn.seller_id),
            Role::Bank | Role::Auditor => None,
        };
        if party.is_some_and(|id| id != actor.user_id) {
            return Err(WorkflowError::Unauthorized(format!(
                "user {} is not the {} of transaction {}",
                actor.user_id, actor.role, txn.id
            )));
        }

        if !rules::permits(target.doc_type, action, actor.role) {
            return Err(WorkflowError::Unauthorized(format!(
                "{} may not {} a {}",
                actor.role, action, target.doc_type
            )));
        }

        if txn.status.is_terminal() {
            return Err(WorkflowError::InvalidTransition(format!(
                "transaction {} is {}",
                txn.id, txn.status
            )));
        }

        if target.is_compromised {
            return Err(WorkflowError::InvalidTransition(format!(
                "{} failed integrity verification",
                target.doc_number
            )));
        }

        rules::lookup(target.doc_type, target.status, action, actor.role).ok_or_else(|| {
            WorkflowError::InvalidTransition(format!(
                "{} not allowed on {} in status {}",
                action, target.doc_number, target.status
            ))
        })
    }

    fn check_prerequisites(&self, row: &Transition, snapshot: &Snapshot) -> WorkflowResult<()> {
        let txn_id = snapshot.transaction.id;

        for prerequisite in row.requires {
            match *prerequisite {
                Prerequisite::Absent(doc_type) => {
                    if let Some(existing) = snapshot.find(doc_type) {
                        return Err(WorkflowError::InvalidTransition(format!(
                            "{} already issued for transaction {} as {}",
                            doc_type, txn_id, existing.doc_number
                        )));
                    }
                }
                Prerequisite::Present(doc_type) => {
                    if snapshot.find(doc_type).is_none() {
                        return Err(WorkflowError::MissingPrerequisite(format!(
                            "no {} issued for transaction {}",
                            doc_type, txn_id
                        )));
                    }
                }
                Prerequisite::InvoiceUnpaid => match snapshot.find(DocType::Invoice) {
                    None => {
                        return Err(WorkflowError::MissingPrerequisite(format!(
                            "no INVOICE issued for transaction {}",
                            txn_id
                        )))
                    }
                    Some(invoice) if invoice.status == DocumentStatus::Pay => {
                        return Err(WorkflowError::InvalidTransition(format!(
                            "{} is already paid",
                            invoice.doc_number
                        )))
                    }
                    Some(_) => {}
                },
                Prerequisite::GoodsReceived => {
                    let received = snapshot
                        .find(DocType::Po)
                        .is_some_and(|po| po.status == DocumentStatus::Receive);
                    if !received {
                        return Err(WorkflowError::MissingPrerequisite(format!(
                            "goods for transaction {} not received",
                            txn_id
                        )));
                    }
                }
                Prerequisite::NothingCompromised => {
                    if let Some(doc) = snapshot.documents.iter().find(|d| d.is_compromised) {
                        return Err(WorkflowError::MissingPrerequisite(format!(
                            "{} failed integrity verification",
                            doc.doc_number
                        )));
                    }
                }
                Prerequisite::AuditComplete => {
                    if !self.policy.require_audit_before_payment {
                        continue;
                    }
                    if let Some(doc) = snapshot.documents.iter().find(|d| !d.is_verified) {
                        return Err(WorkflowError::MissingPrerequisite(format!(
                            "{} not verified by an auditor",
                            doc.doc_number
                        )));
                    }
                }
                Prerequisite::NotVerified => {
                    if snapshot.target.is_verified {
                        return Err(WorkflowError::InvalidTransition(format!(
                            "{} already verified",
                            snapshot.target.doc_number
                        )));
                    }
                }
                Prerequisite::SellerRegistered | Prerequisite::PositiveAmount => {}
            }
        }
        Ok(())
    }

    fn execute(
        &self,
        repo: &Repo<'_>,
        actor: &Actor,
        row: &Transition,
        snapshot: &Snapshot,
        request: &ActionRequest,
    ) -> WorkflowResult<Applied> {
        let target = &snapshot.target;
        let txn = &snapshot.transaction;

        let mut entry =
            NewEntry::new(actor, row.action, target.id, txn.id).with("transaction_id", txn.id);
        if let Some(po) = snapshot.find(DocType::Po) {
            entry = entry.with("po_id", po.id);
        }

        if let Some(to) = row.to {
            repo.set_document_status(target.id, to)?;
        }

        let mut created = None;
        match row.effect {
            Effect::Issue(doc_type) => {
                let upload = request.upload.as_ref().ok_or_else(|| {
                    WorkflowError::InvalidRequest(format!("{} needs a file", row.action))
                })?;
                let doc = repo.insert_document(&NewDocument {
                    doc_type,
                    owner_id: actor.user_id,
                    transaction_id: txn.id,
                    file_hash: upload.file_hash.clone(),
                    file_url: upload.file_url.clone(),
                })?;

                entry.document_id = doc.id;
                entry = entry
                    .with(id_key(doc_type), doc.id)
                    .with("file_hash", upload.file_hash.clone());
                if doc_type == DocType::Bol && !request.extra_data.contains_key("tracking_id") {
                    entry = entry.with("tracking_id", new_tracking_id());
                }
                created = Some(doc);
            }
            Effect::Settle => {
                for doc in &snapshot.documents {
                    let settles = matches!(doc.doc_type, DocType::Po | DocType::Invoice);
                    if settles && doc.id != target.id {
                        repo.set_document_status(doc.id, DocumentStatus::Pay)?;
                    }
                }
                if let Some(invoice) = snapshot.find(DocType::Invoice) {
                    entry = entry.with("invoice_id", invoice.id);
                }
                entry = entry
                    .with("amount", txn.amount.to_string())
                    .with("currency", txn.currency.code());
            }
            Effect::MarkVerified => {
                repo.mark_verified(target.id)?;
                entry = entry.with("doc_type", target.doc_type.to_string());
            }
            Effect::Advance => {}
            Effect::OpenTransaction => {
                return Err(WorkflowError::InvalidRequest(format!(
                    "{} cannot target an existing document",
                    row.action
                )))
            }
        }

        let documents = repo.documents_in(txn.id)?;
        let status = derive_status(txn.status, &documents);
        if status != txn.status {
            repo.set_transaction_status(txn.id, status)?;
        }

        let sealed = repo.append(entry.merge(&request.extra_data))?;
        let was_created = created.is_some();
        let document = match created {
            Some(doc) => doc,
            None => repo.document(target.id)?,
        };

        Ok(Applied {
            document,
            created: was_created,
            transaction: repo.transaction(txn.id)?,
            ledger_entry_id: sealed.id,
        })
    }

    // === Per-operation helpers ===

    /// Buyer opens a transaction with a purchase order
    pub async fn create_po(
        &self,
        actor: &Actor,
        terms: OrderTerms,
        upload: Upload,
    ) -> WorkflowResult<Applied> {
        let request = ActionRequest::new(Action::CreatePo, Target::NewOrder(terms)).with_upload(upload);
        self.apply(actor, request).await
    }

    /// Bank issues the letter of credit for a purchase order
    pub async fn issue_loc(&self, actor: &Actor, po_id: DocumentId, upload: Upload) -> WorkflowResult<Applied> {
        self.apply(actor, ActionRequest::on(Action::IssueLoc, po_id).with_upload(upload))
            .await
    }

    /// Seller uploads the bill of lading; a tracking id is generated when
    /// none is given
    pub async fn upload_bol(
        &self,
        actor: &Actor,
        po_id: DocumentId,
        upload: Upload,
        tracking_id: Option<String>,
    ) -> WorkflowResult<Applied> {
        let mut request = ActionRequest::on(Action::IssueBol, po_id).with_upload(upload);
        if let Some(tracking_id) = tracking_id {
            request = request.with_extra("tracking_id", tracking_id);
        }
        self.apply(actor, request).await
    }

    pub async fn ship(&self, actor: &Actor, po_id: DocumentId) -> WorkflowResult<Applied> {
        self.apply(actor, ActionRequest::on(Action::Ship, po_id)).await
    }

    pub async fn receive(&self, actor: &Actor, po_id: DocumentId) -> WorkflowResult<Applied> {
        self.apply(actor, ActionRequest::on(Action::Receive, po_id)).await
    }

    pub async fn issue_invoice(
        &self,
        actor: &Actor,
        po_id: DocumentId,
        upload: Upload,
    ) -> WorkflowResult<Applied> {
        self.apply(actor, ActionRequest::on(Action::IssueInvoice, po_id).with_upload(upload))
            .await
    }

    /// Bank pays; `document_id` may be the invoice or its purchase order
    pub async fn pay_invoice(&self, actor: &Actor, document_id: DocumentId) -> WorkflowResult<Applied> {
        self.apply(actor, ActionRequest::on(Action::Pay, document_id)).await
    }

    /// Auditor marks a document verified
    pub async fn verify_document(&self, actor: &Actor, document_id: DocumentId) -> WorkflowResult<Applied> {
        self.apply(actor, ActionRequest::on(Action::Verify, document_id)).await
    }

    /// Owner replaces the file of a compromised document.
    ///
    /// Clears the compromise latch and the auditor verification. The
    /// transaction keeps its status.
    pub async fn replace_file(
        &self,
        actor: &Actor,
        document_id: DocumentId,
        upload: Upload,
    ) -> WorkflowResult<Applied> {
        let result = self.reupload(actor, document_id, &upload).await;

        match &result {
            Ok(applied) => info!(
                action = %LedgerAction::Reupload,
                actor_id = actor.user_id,
                document_id,
                entry_id = applied.ledger_entry_id,
                "File replaced"
            ),
            Err(err) => warn!(
                action = %LedgerAction::Reupload,
                actor_id = actor.user_id,
                document_id,
                error = %err,
                "Re-upload rejected"
            ),
        }

        result
    }

    async fn reupload(&self, actor: &Actor, document_id: DocumentId, upload: &Upload) -> WorkflowResult<Applied> {
        validate_upload(upload)?;
        self.verify_actor(actor)?;

        let transaction_id = self.store.read(|repo| repo.document(document_id))?.transaction_id;
        let _guard = self.locks.acquire(transaction_id).await;

        self.store
            .atomic(|repo| {
                let doc = repo.document(document_id)?;
                if doc.owner_id != actor.user_id {
                    return Err(WorkflowError::Unauthorized(format!(
                        "only the owner may replace {}",
                        doc.doc_number
                    )));
                }
                if !doc.is_compromised {
                    return Err(WorkflowError::InvalidTransition(format!(
                        "{} is not compromised",
                        doc.doc_number
                    )));
                }

                repo.replace_file(doc.id, &upload.file_hash, &upload.file_url)?;
                let entry = repo.append(
                    NewEntry::new(actor, LedgerAction::Reupload, doc.id, doc.transaction_id)
                        .with("transaction_id", doc.transaction_id)
                        .with(id_key(doc.doc_type), doc.id)
                        .with("old_hash", doc.file_hash.clone())
                        .with("new_hash", upload.file_hash.clone()),
                )?;

                Ok(Applied {
                    document: repo.document(doc.id)?,
                    transaction: repo.transaction(doc.transaction_id)?,
                    ledger_entry_id: entry.id,
                    created: false,
                })
            })
            .await
    }
}
