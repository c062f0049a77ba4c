//! Connection owner and unit of work

use crate::error::{StoreError, StoreResult};
use crate::repo::Repo;
use crate::retry::{RetryPolicy, Retryable};
use crate::schema::init_schema;
use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// How long SQLite itself waits on a locked database before reporting BUSY
const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// SQLite-backed store shared by the workflow engine, the integrity verifier
/// and the read views
#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    retry: RetryPolicy,
}

impl Store {
    /// Open (or create) the database file at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::from_connection(conn)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            retry: RetryPolicy::default(),
        })
    }

    /// Replace the retry policy used by [`Store::atomic`]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Run read-only queries against the current committed state
    pub fn read<T>(&self, f: impl FnOnce(&Repo<'_>) -> StoreResult<T>) -> StoreResult<T> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&Repo::new(&conn))
    }

    /// Run `f` inside one SQLite transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back otherwise. Transient faults
    /// (BUSY/LOCKED) are retried per the store's [`RetryPolicy`]; every other
    /// error is returned after the first attempt.
    pub async fn atomic<T, E, F>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut(&Repo<'_>) -> Result<T, E>,
        E: From<StoreError> + Retryable + std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match self.attempt(&mut f) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && self.retry.allows_retry_after(attempt) => {
                    let delay = self.retry.delay(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "Retrying unit of work");
                    drop(err);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        warn!(attempt, error = %err, "Unit of work gave up after retries");
                    }
                    return Err(err);
                }
            }
        }
    }

    fn attempt<T, E, F>(&self, f: &mut F) -> Result<T, E>
    where
        F: FnMut(&Repo<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;

        let value = f(&Repo::new(&tx))?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }

    /// Execute raw SQL (maintenance, fault injection in tests)
    pub fn execute_batch(&self, sql: &str) -> StoreResult<()> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute_batch(sql)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::ffi;
    use std::cell::Cell;
    use tradeflow_core::{
        Actor, Amount, Currency, DocType, DocumentStatus, NewDocument, NewTransaction, NewUser,
        Role, Transaction, TransactionStatus, User,
    };
    use tradeflow_ledger::{verify_chain, LedgerAction, LedgerQuery, NewEntry};

    fn user(repo: &Repo<'_>, name: &str, role: Role, org: &str) -> User {
        repo.insert_user(&NewUser {
            name: name.to_string(),
            email: format!("{}@{}.test", name.to_lowercase(), org.to_lowercase()),
            org: org.to_string(),
            role,
        })
        .unwrap()
    }

    struct Fixture {
        store: Store,
        buyer: User,
        seller: User,
        bank: User,
        txn: Transaction,
    }

    fn fixture() -> Fixture {
        let store = Store::in_memory().unwrap();
        let (buyer, seller, bank, txn) = store
            .read(|repo| {
                let buyer = user(repo, "Asha", Role::Buyer, "Acme");
                let seller = user(repo, "Bo", Role::Seller, "Globex");
                let bank = user(repo, "Cy", Role::Bank, "First Bank");
                let txn = repo.insert_transaction(&NewTransaction {
                    buyer_id: buyer.id,
                    seller_id: seller.id,
                    amount: "1500.00".parse().unwrap(),
                    currency: Currency::Usd,
                })?;
                Ok((buyer, seller, bank, txn))
            })
            .unwrap();
        Fixture {
            store,
            buyer,
            seller,
            bank,
            txn,
        }
    }

    fn new_doc(f: &Fixture, doc_type: DocType) -> NewDocument {
        NewDocument {
            doc_type,
            owner_id: f.buyer.id,
            transaction_id: f.txn.id,
            file_hash: "ab".repeat(32),
            file_url: format!("blobs/{}", doc_type),
        }
    }

    fn busy() -> StoreError {
        StoreError::Database(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_BUSY),
            None,
        ))
    }

    #[test]
    fn test_user_and_transaction_round_trip() {
        let f = fixture();
        let (stored_user, stored_txn) = f
            .store
            .read(|repo| Ok((repo.user(f.seller.id)?, repo.transaction(f.txn.id)?)))
            .unwrap();

        assert_eq!(stored_user, f.seller);
        assert_eq!(stored_txn.status, TransactionStatus::Pending);
        assert_eq!(stored_txn.amount, "1500.00".parse::<Amount>().unwrap());
        assert_eq!(stored_txn.currency, Currency::Usd);
    }

    #[test]
    fn test_missing_rows_are_not_found() {
        let f = fixture();
        let err = f.store.read(|repo| repo.document(99)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "document", id: 99 }));
    }

    #[test]
    fn test_document_numbering_and_flags() {
        let f = fixture();
        f.store
            .read(|repo| {
                let po = repo.insert_document(&new_doc(&f, DocType::Po))?;
                let loc = repo.insert_document(&new_doc(&f, DocType::Loc))?;
                assert_eq!(po.doc_number, "PO-000001");
                assert_eq!(loc.doc_number, "LOC-000002");
                assert_eq!(po.status, DocumentStatus::Created);
                assert!(!po.is_compromised && !po.is_verified);

                repo.mark_verified(po.id)?;
                repo.mark_compromised(po.id)?;
                let po = repo.document(po.id)?;
                assert!(po.is_verified && po.is_compromised);
                assert_eq!(repo.compromised_documents()?.len(), 1);

                repo.replace_file(po.id, &"cd".repeat(32), "blobs/new")?;
                let po = repo.document(po.id)?;
                assert!(!po.is_verified && !po.is_compromised);
                assert_eq!(po.file_hash, "cd".repeat(32));
                assert!(repo.compromised_documents()?.is_empty());

                assert_eq!(
                    repo.document_of_type(f.txn.id, DocType::Loc)?.map(|d| d.id),
                    Some(loc.id)
                );
                assert!(repo.document_of_type(f.txn.id, DocType::Bol)?.is_none());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_one_document_per_type_per_transaction() {
        let f = fixture();
        let err = f
            .store
            .read(|repo| {
                repo.insert_document(&new_doc(&f, DocType::Loc))?;
                repo.insert_document(&new_doc(&f, DocType::Loc))
            })
            .unwrap_err();
        assert!(err.is_constraint());
    }

    #[test]
    fn test_visibility_by_role() {
        let f = fixture();
        f.store
            .read(|repo| {
                repo.insert_document(&new_doc(&f, DocType::Po))?;
                let outsider = user(repo, "Dee", Role::Buyer, "Initech");

                assert_eq!(repo.documents_for(&f.buyer)?.len(), 1);
                assert_eq!(repo.documents_for(&f.seller)?.len(), 1);
                assert_eq!(repo.documents_for(&f.bank)?.len(), 1);
                assert!(repo.documents_for(&outsider)?.is_empty());
                assert!(repo.transactions_for(&outsider)?.is_empty());
                assert_eq!(repo.transactions_for(&f.bank)?.len(), 1);
                Ok(())
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_ledger_append_builds_valid_chain() {
        let f = fixture();
        let actor = Actor::from_user(&f.buyer);

        for action in [LedgerAction::CreatePo, LedgerAction::Verify, LedgerAction::VerifyOk] {
            f.store
                .atomic(|repo| repo.append(NewEntry::new(&actor, action, 1, f.txn.id).with("po_id", 1)))
                .await
                .unwrap();
        }

        let entries = f.store.read(|repo| repo.ledger(&LedgerQuery::new())).unwrap();
        assert_eq!(entries.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(verify_chain(&entries).is_ok());

        let only_ok = f
            .store
            .read(|repo| repo.ledger(&LedgerQuery::new().action(LedgerAction::VerifyOk)))
            .unwrap();
        assert_eq!(only_ok.len(), 1);
        assert_eq!(only_ok[0].extra_data.get("po_id"), Some(&serde_json::json!(1)));

        let since = entries[1].created_at;
        let recent = f
            .store
            .read(|repo| repo.ledger(&LedgerQuery::new().since(since)))
            .unwrap();
        assert_eq!(recent.first().map(|e| e.id), Some(2));

        let other_actor = f
            .store
            .read(|repo| repo.ledger(&LedgerQuery::new().actor(f.bank.id)))
            .unwrap();
        assert!(other_actor.is_empty());
    }

    #[tokio::test]
    async fn test_ledger_rows_cannot_be_changed() {
        let f = fixture();
        let actor = Actor::from_user(&f.bank);
        f.store
            .atomic(|repo| repo.append(NewEntry::new(&actor, LedgerAction::IssueLoc, 1, f.txn.id)))
            .await
            .unwrap();

        let update = f.store.execute_batch("UPDATE ledger_entries SET action = 'PAY'");
        assert!(update.unwrap_err().is_constraint());

        let delete = f.store.execute_batch("DELETE FROM ledger_entries");
        assert!(delete.unwrap_err().is_constraint());

        let count = f.store.read(|repo| repo.ledger(&LedgerQuery::new())).unwrap().len();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_failed_append_rolls_back_mutation() {
        let f = fixture();
        let po = f
            .store
            .read(|repo| repo.insert_document(&new_doc(&f, DocType::Po)))
            .unwrap();

        f.store
            .execute_batch(
                "CREATE TRIGGER fail_ledger BEFORE INSERT ON ledger_entries
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let actor = Actor::from_user(&f.seller);
        let result: StoreResult<()> = f
            .store
            .atomic(|repo| {
                repo.set_document_status(po.id, DocumentStatus::IssueBol)?;
                repo.set_transaction_status(f.txn.id, TransactionStatus::InProgress)?;
                repo.append(NewEntry::new(&actor, LedgerAction::IssueBol, po.id, f.txn.id))?;
                Ok(())
            })
            .await;
        assert!(result.is_err());

        let (doc, txn) = f
            .store
            .read(|repo| Ok((repo.document(po.id)?, repo.transaction(f.txn.id)?)))
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Created);
        assert_eq!(txn.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_transient_faults_are_retried() {
        let store = Store::in_memory().unwrap().with_retry(RetryPolicy::new(3, 1));
        let calls = Cell::new(0);

        let value = store
            .atomic(|_repo| {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(busy())
                } else {
                    Ok(42)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let store = Store::in_memory().unwrap().with_retry(RetryPolicy::new(2, 1));
        let calls = Cell::new(0);

        let result: StoreResult<()> = store
            .atomic(|_repo| {
                calls.set(calls.get() + 1);
                Err(busy())
            })
            .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let store = Store::in_memory().unwrap().with_retry(RetryPolicy::new(5, 1));
        let calls = Cell::new(0);

        let result: StoreResult<()> = store
            .atomic(|repo| {
                calls.set(calls.get() + 1);
                repo.document(1).map(|_| ())
            })
            .await;

        assert!(matches!(result, Err(StoreError::NotFound { .. })));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_reopen_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tradeflow.db");

        {
            let store = Store::open(&path).unwrap();
            store
                .read(|repo| Ok(user(repo, "Asha", Role::Buyer, "Acme")))
                .unwrap();
        }

        let store = Store::open(&path).unwrap();
        let users = store.read(|repo| repo.users()).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].role, Role::Buyer);
    }
}
