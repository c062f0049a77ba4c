//! Application context - wires everything together

use crate::config::AppConfig;
use anyhow::Context as _;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tradeflow_core::{Actor, Document, DocumentId, NewUser, Role, Transaction, TransactionId, User, UserId};
use tradeflow_integrity::{BlobStore, FsBlobStore, IntegrityVerifier};
use tradeflow_ledger::{verify_chain, LedgerEntry, LedgerQuery};
use tradeflow_risk::RiskScorer;
use tradeflow_store::{LockManager, Store, StoreError};
use tradeflow_workflow::{Upload, WorkflowEngine};

/// A ledger entry with its actor resolved for display
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    #[serde(flatten)]
    pub entry: LedgerEntry,
    pub actor_name: String,
    pub actor_org: String,
}

/// Application context - wires together all components
pub struct AppContext {
    pub config: AppConfig,
    pub store: Store,
    pub engine: WorkflowEngine,
    pub verifier: IntegrityVerifier,
    pub risk: RiskScorer,
    blobs: Arc<FsBlobStore>,
}

impl AppContext {
    /// Open (or create) the database and blob directory under the data dir
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .with_context(|| format!("creating {}", config.data_dir.display()))?;

        let store = Store::open(config.database_path())?.with_retry(config.persistence_retry);
        let blobs = Arc::new(FsBlobStore::new(config.blob_dir()));

        // Engine and verifier serialize on the same per-transaction locks
        let locks = LockManager::new();
        let engine = WorkflowEngine::new(store.clone(), locks.clone(), config.workflow);
        let verifier = IntegrityVerifier::new(store.clone(), locks, blobs.clone(), config.blob_retry);
        let risk = RiskScorer::new(store.clone());

        info!(
            data_dir = %config.data_dir.display(),
            require_audit = config.workflow.require_audit_before_payment,
            "Tradeflow context ready"
        );

        Ok(Self {
            config,
            store,
            engine,
            verifier,
            risk,
            blobs,
        })
    }

    /// Default configuration rooted at `data_dir`
    pub async fn open(data_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        Self::new(AppConfig {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..AppConfig::default()
        })
        .await
    }

    pub fn blobs(&self) -> &FsBlobStore {
        &self.blobs
    }

    /// Register a user (stand-in for the auth collaborator)
    pub fn register(&self, user: NewUser) -> anyhow::Result<User> {
        let user = self.store.read(|repo| repo.insert_user(&user))?;
        info!(user_id = user.id, role = %user.role, org = %user.org, "User registered");
        Ok(user)
    }

    pub fn user(&self, user_id: UserId) -> anyhow::Result<User> {
        match self.store.read(|repo| repo.user(user_id)) {
            Err(StoreError::NotFound { .. }) => anyhow::bail!("Unknown user {user_id}"),
            other => Ok(other?),
        }
    }

    /// The identity the auth collaborator would admit for `user_id`
    pub fn actor(&self, user_id: UserId) -> anyhow::Result<Actor> {
        Ok(Actor::from_user(&self.user(user_id)?))
    }

    /// Store file bytes and return the upload to attach to an action
    pub async fn upload(&self, bytes: &[u8]) -> anyhow::Result<Upload> {
        Ok(self.blobs.put(bytes).await?)
    }

    pub async fn upload_file(&self, path: impl AsRef<Path>) -> anyhow::Result<Upload> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        self.upload(&bytes).await
    }

    /// Documents the user may see
    pub fn documents(&self, viewer: UserId) -> anyhow::Result<Vec<Document>> {
        let user = self.user(viewer)?;
        Ok(self.store.read(|repo| repo.documents_for(&user))?)
    }

    /// Transactions the user may see
    pub fn transactions(&self, viewer: UserId) -> anyhow::Result<Vec<Transaction>> {
        let user = self.user(viewer)?;
        Ok(self.store.read(|repo| repo.transactions_for(&user))?)
    }

    /// One document with its transaction, if the user may see it
    pub fn document(&self, viewer: UserId, id: DocumentId) -> anyhow::Result<(Document, Transaction)> {
        let user = self.user(viewer)?;
        let (doc, txn) = self
            .store
            .read(|repo| {
                let doc = repo.document(id)?;
                let txn = repo.transaction(doc.transaction_id)?;
                Ok((doc, txn))
            })
            .with_context(|| format!("document {id}"))?;
        ensure_visible(&user, &txn)?;
        Ok((doc, txn))
    }

    /// One transaction with its documents, if the user may see it
    pub fn transaction(
        &self,
        viewer: UserId,
        id: TransactionId,
    ) -> anyhow::Result<(Transaction, Vec<Document>)> {
        let user = self.user(viewer)?;
        let (txn, docs) = self
            .store
            .read(|repo| Ok((repo.transaction(id)?, repo.documents_in(id)?)))
            .with_context(|| format!("transaction {id}"))?;
        ensure_visible(&user, &txn)?;
        Ok((txn, docs))
    }

    /// Ledger entries matching `query`, oldest first, with actor names
    pub fn timeline(&self, query: &LedgerQuery) -> anyhow::Result<Vec<TimelineEntry>> {
        let (entries, users) = self
            .store
            .read(|repo| Ok((repo.ledger(query)?, repo.users()?)))?;
        let users: HashMap<UserId, User> = users.into_iter().map(|u| (u.id, u)).collect();

        Ok(entries
            .into_iter()
            .map(|entry| {
                let (actor_name, actor_org) = users
                    .get(&entry.actor_id)
                    .map(|u| (u.name.clone(), u.org.clone()))
                    .unwrap_or_else(|| (format!("user {}", entry.actor_id), String::new()));
                TimelineEntry {
                    entry,
                    actor_name,
                    actor_org,
                }
            })
            .collect())
    }

    /// Verify the whole hash chain; returns the number of entries checked
    pub fn audit(&self) -> anyhow::Result<usize> {
        let entries = self.store.read(|repo| repo.ledger(&LedgerQuery::new()))?;
        verify_chain(&entries)?;
        Ok(entries.len())
    }
}

fn ensure_visible(user: &User, txn: &Transaction) -> anyhow::Result<()> {
    let visible = match user.role {
        Role::Bank | Role::Auditor => true,
        Role::Buyer | Role::Seller => txn.involves(user.id),
    };
    if !visible {
        anyhow::bail!("User {} is not a party to transaction {}", user.id, txn.id);
    }
    Ok(())
}
