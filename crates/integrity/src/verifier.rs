//! File integrity verification

use crate::blob::BlobStore;
use crate::digest::sha256_hex;
use crate::error::{IntegrityError, IntegrityResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tradeflow_core::{Actor, Document, DocumentId, Role};
use tradeflow_ledger::{EntryId, LedgerAction, LedgerQuery, NewEntry};
use tradeflow_store::{LockManager, Repo, RetryPolicy, Retryable, Store, StoreError, StoreResult};
use tradeflow_workflow::derive_status;

/// Outcome of one verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub document_id: DocumentId,
    /// Stored bytes hash to the recorded `file_hash`
    pub is_valid: bool,
    /// State of the latch after this check
    pub is_compromised: bool,
    pub expected_hash: String,
    pub actual_hash: String,
    pub ledger_entry_id: EntryId,
}

/// Recomputes stored file digests and latches tampered documents
pub struct IntegrityVerifier {
    store: Store,
    locks: LockManager,
    blobs: Arc<dyn BlobStore>,
    retry: RetryPolicy,
}

impl IntegrityVerifier {
    /// `locks` must be the lock manager the workflow engine uses
    pub fn new(
        store: Store,
        locks: LockManager,
        blobs: Arc<dyn BlobStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            locks,
            blobs,
            retry,
        }
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// Check a document's stored bytes against its recorded hash.
    ///
    /// Safe to repeat. A mismatch latches `is_compromised`, disputes the
    /// transaction and appends `VERIFY_FAILED`; a match appends `VERIFY_OK`.
    /// Unreadable blobs surface as [`IntegrityError::Io`] after the retry
    /// budget and never latch anything.
    pub async fn verify(&self, actor: &Actor, document_id: DocumentId) -> IntegrityResult<VerificationReport> {
        let result = self.run(actor, document_id).await;

        match &result {
            Ok(report) if report.is_valid => info!(
                document_id,
                actor_id = actor.user_id,
                entry_id = report.ledger_entry_id,
                "Integrity check passed"
            ),
            Ok(report) => warn!(
                document_id,
                actor_id = actor.user_id,
                entry_id = report.ledger_entry_id,
                expected = %report.expected_hash,
                actual = %report.actual_hash,
                "Integrity check FAILED, document marked compromised"
            ),
            Err(err) => warn!(
                document_id,
                actor_id = actor.user_id,
                error = %err,
                "Integrity check not completed"
            ),
        }

        result
    }

    async fn run(&self, actor: &Actor, document_id: DocumentId) -> IntegrityResult<VerificationReport> {
        let (doc, reupload) = self.authorize(actor, document_id)?;

        // Hash with no lock held
        let bytes = self.fetch(&doc.file_url).await?;
        let actual_hash = sha256_hex(&bytes);

        let _guard = self.locks.acquire(doc.transaction_id).await;
        self.store
            .atomic(|repo| {
                let current = repo.document(document_id)?;
                // Re-uploading identical bytes keeps hash and url
                let replaced = current.file_hash != doc.file_hash
                    || current.file_url != doc.file_url
                    || last_reupload(repo, document_id)? != reupload;
                if replaced {
                    return Err(IntegrityError::InvalidTransition(format!(
                        "{} was replaced during verification",
                        current.doc_number
                    )));
                }

                let is_valid = actual_hash == current.file_hash;
                if !is_valid {
                    if !current.is_compromised {
                        repo.mark_compromised(current.id)?;
                    }
                    let txn = repo.transaction(current.transaction_id)?;
                    let status = derive_status(txn.status, &repo.documents_in(txn.id)?);
                    if status != txn.status {
                        repo.set_transaction_status(txn.id, status)?;
                    }
                }

                let action = if is_valid {
                    LedgerAction::VerifyOk
                } else {
                    LedgerAction::VerifyFailed
                };
                let entry = repo.append(
                    NewEntry::new(actor, action, current.id, current.transaction_id)
                        .with("transaction_id", current.transaction_id)
                        .with("doc_type", current.doc_type.to_string())
                        .with("expected_hash", current.file_hash.clone())
                        .with("actual_hash", actual_hash.clone()),
                )?;

                Ok(VerificationReport {
                    document_id: current.id,
                    is_valid,
                    is_compromised: current.is_compromised || !is_valid,
                    expected_hash: current.file_hash,
                    actual_hash: actual_hash.clone(),
                    ledger_entry_id: entry.id,
                })
            })
            .await
    }

    /// Auditors and banks may verify anything, buyers and sellers only
    /// documents of their own transactions.
    ///
    /// Returns the document with the id of its latest `REUPLOAD` entry.
    fn authorize(
        &self,
        actor: &Actor,
        document_id: DocumentId,
    ) -> IntegrityResult<(Document, Option<EntryId>)> {
        let user = match self.store.read(|repo| repo.user(actor.user_id)) {
            Ok(user) => user,
            Err(StoreError::NotFound { .. }) => {
                return Err(IntegrityError::Unauthorized(format!(
                    "unknown user {}",
                    actor.user_id
                )))
            }
            Err(err) => return Err(err.into()),
        };
        if !actor.matches(&user) {
            return Err(IntegrityError::Unauthorized(format!(
                "claimed {} at '{}' does not match user {}",
                actor.role, actor.org, actor.user_id
            )));
        }

        let (doc, txn, reupload) = self.store.read(|repo| {
            let doc = repo.document(document_id)?;
            let txn = repo.transaction(doc.transaction_id)?;
            Ok((doc, txn, last_reupload(repo, document_id)?))
        })?;

        let allowed = match actor.role {
            Role::Auditor | Role::Bank => true,
            Role::Buyer | Role::Seller => txn.involves(actor.user_id),
        };
        if !allowed {
            return Err(IntegrityError::Unauthorized(format!(
                "user {} is not a party to transaction {}",
                actor.user_id, txn.id
            )));
        }
        Ok((doc, reupload))
    }

    /// Read a blob, retrying transient failures per the retry policy
    async fn fetch(&self, file_url: &str) -> IntegrityResult<Vec<u8>> {
        let mut attempt = 1;
        loop {
            match self.blobs.get(file_url).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) if err.is_retryable() && self.retry.allows_retry_after(attempt) => {
                    debug!(
                        backend = self.blobs.name(),
                        file_url,
                        attempt,
                        error = %err,
                        "Retrying blob read"
                    );
                    tokio::time::sleep(self.retry.delay(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Every document currently latched as compromised
    pub fn alerts(&self) -> IntegrityResult<Vec<Document>> {
        Ok(self.store.read(|repo| repo.compromised_documents())?)
    }
}

fn last_reupload(repo: &Repo<'_>, document_id: DocumentId) -> StoreResult<Option<EntryId>> {
    let entries = repo.ledger(
        &LedgerQuery::new()
            .document(document_id)
            .action(LedgerAction::Reupload),
    )?;
    Ok(entries.last().map(|e| e.id))
}
