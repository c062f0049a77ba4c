//! Typed queries over a SQLite connection
//!
//! A `Repo` borrows either the bare connection (reads) or an open
//! transaction (inside [`crate::Store::atomic`]); the SQL is the same.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::str::FromStr;
use tradeflow_core::{
    DocType, Document, DocumentId, DocumentStatus, NewDocument, NewTransaction, NewUser, Role,
    Transaction, TransactionId, TransactionStatus, User, UserId,
};
use tradeflow_ledger::{decode_extra_data, LedgerEntry, LedgerQuery, NewEntry, GENESIS_HASH};

const USER_COLUMNS: &str = "id, name, email, org, role";

const TRANSACTION_COLUMNS: &str = "id, buyer_id, seller_id, amount, currency, status, created_at";

const DOCUMENT_COLUMNS: &str = "d.id, d.doc_number, d.doc_type, d.owner_id, d.transaction_id, \
     d.status, d.file_hash, d.file_url, d.is_compromised, d.is_verified, d.created_at";

const LEDGER_COLUMNS: &str = "id, actor_id, actor_role, document_id, transaction_id, action, \
     extra_data, created_at, prev_hash, hash";

/// Current time at the precision the database stores
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 so stored timestamps compare lexicographically
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        org: row.get(3)?,
        role: parse_column(row, 4)?,
    })
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        buyer_id: row.get(1)?,
        seller_id: row.get(2)?,
        amount: parse_column(row, 3)?,
        currency: parse_column(row, 4)?,
        status: parse_column(row, 5)?,
        created_at: parse_column(row, 6)?,
    })
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        doc_number: row.get(1)?,
        doc_type: parse_column(row, 2)?,
        owner_id: row.get(3)?,
        transaction_id: row.get(4)?,
        status: parse_column(row, 5)?,
        file_hash: row.get(6)?,
        file_url: row.get(7)?,
        is_compromised: row.get(8)?,
        is_verified: row.get(9)?,
        created_at: parse_column(row, 10)?,
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let extra_raw: String = row.get(6)?;
    let extra_data = decode_extra_data(&extra_raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(LedgerEntry {
        id: row.get(0)?,
        actor_id: row.get(1)?,
        actor_role: parse_column(row, 2)?,
        document_id: row.get(3)?,
        transaction_id: row.get(4)?,
        action: parse_column(row, 5)?,
        extra_data,
        created_at: parse_column(row, 7)?,
        prev_hash: row.get(8)?,
        hash: row.get(9)?,
    })
}

fn not_found(entity: &'static str, id: i64) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |e| match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound { entity, id },
        other => StoreError::Database(other),
    }
}

/// Typed access to users, transactions, documents and the ledger
pub struct Repo<'c> {
    conn: &'c Connection,
}

impl<'c> Repo<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    // === Users ===

    pub fn insert_user(&self, user: &NewUser) -> StoreResult<User> {
        self.conn.execute(
            "INSERT INTO users (name, email, org, role) VALUES (?1, ?2, ?3, ?4)",
            params![user.name, user.email, user.org, user.role.as_ref()],
        )?;
        self.user(self.conn.last_insert_rowid())
    }

    pub fn user(&self, id: UserId) -> StoreResult<User> {
        self.conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            )
            .map_err(not_found("user", id))
    }

    pub fn users(&self) -> StoreResult<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    // === Transactions ===

    /// Insert a new transaction in `pending`
    pub fn insert_transaction(&self, txn: &NewTransaction) -> StoreResult<Transaction> {
        self.conn.execute(
            "INSERT INTO transactions (buyer_id, seller_id, amount, currency, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                txn.buyer_id,
                txn.seller_id,
                txn.amount.to_string(),
                txn.currency.code(),
                TransactionStatus::Pending.as_ref(),
                timestamp(&now()),
            ],
        )?;
        self.transaction(self.conn.last_insert_rowid())
    }

    pub fn transaction(&self, id: TransactionId) -> StoreResult<Transaction> {
        self.conn
            .query_row(
                &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1"),
                params![id],
                transaction_from_row,
            )
            .map_err(not_found("transaction", id))
    }

    pub fn transactions(&self) -> StoreResult<Vec<Transaction>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions ORDER BY id"
        ))?;
        let txns = stmt
            .query_map([], transaction_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(txns)
    }

    /// Transactions a user may see: their own for buyers and sellers, all for
    /// banks and auditors
    pub fn transactions_for(&self, user: &User) -> StoreResult<Vec<Transaction>> {
        match user.role {
            Role::Bank | Role::Auditor => self.transactions(),
            Role::Buyer | Role::Seller => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {TRANSACTION_COLUMNS} FROM transactions
                     WHERE buyer_id = ?1 OR seller_id = ?1 ORDER BY id"
                ))?;
                let txns = stmt
                    .query_map(params![user.id], transaction_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(txns)
            }
        }
    }

    pub fn set_transaction_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> StoreResult<()> {
        let rows = self.conn.execute(
            "UPDATE transactions SET status = ?1 WHERE id = ?2",
            params![status.as_ref(), id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound {
                entity: "transaction",
                id,
            });
        }
        Ok(())
    }

    // === Documents ===

    /// Insert a document in `CREATED` and assign its number
    pub fn insert_document(&self, doc: &NewDocument) -> StoreResult<Document> {
        let id: DocumentId = self.conn.query_row(
            "SELECT COALESCE(MAX(id), 0) + 1 FROM documents",
            [],
            |row| row.get(0),
        )?;

        self.conn.execute(
            "INSERT INTO documents
             (id, doc_number, doc_type, owner_id, transaction_id, status,
              file_hash, file_url, is_compromised, is_verified, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, 0, ?9)",
            params![
                id,
                Document::format_number(doc.doc_type, id),
                doc.doc_type.as_ref(),
                doc.owner_id,
                doc.transaction_id,
                DocumentStatus::Created.as_ref(),
                doc.file_hash,
                doc.file_url,
                timestamp(&now()),
            ],
        )?;
        self.document(id)
    }

    pub fn document(&self, id: DocumentId) -> StoreResult<Document> {
        self.conn
            .query_row(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents d WHERE d.id = ?1"),
                params![id],
                document_from_row,
            )
            .map_err(not_found("document", id))
    }

    /// The document of a given type in a transaction, if issued
    pub fn document_of_type(
        &self,
        transaction_id: TransactionId,
        doc_type: DocType,
    ) -> StoreResult<Option<Document>> {
        let doc = self
            .conn
            .query_row(
                &format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents d
                     WHERE d.transaction_id = ?1 AND d.doc_type = ?2"
                ),
                params![transaction_id, doc_type.as_ref()],
                document_from_row,
            )
            .optional()?;
        Ok(doc)
    }

    pub fn documents_in(&self, transaction_id: TransactionId) -> StoreResult<Vec<Document>> {
        self.query_documents(
            &format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents d
                 WHERE d.transaction_id = ?1 ORDER BY d.id"
            ),
            params![transaction_id],
        )
    }

    pub fn documents(&self) -> StoreResult<Vec<Document>> {
        self.query_documents(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents d ORDER BY d.id"),
            [],
        )
    }

    /// Documents a user may see: those of their own transactions for buyers
    /// and sellers, all for banks and auditors
    pub fn documents_for(&self, user: &User) -> StoreResult<Vec<Document>> {
        match user.role {
            Role::Bank | Role::Auditor => self.documents(),
            Role::Buyer | Role::Seller => self.query_documents(
                &format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents d
                     JOIN transactions t ON t.id = d.transaction_id
                     WHERE t.buyer_id = ?1 OR t.seller_id = ?1
                     ORDER BY d.id"
                ),
                params![user.id],
            ),
        }
    }

    /// Every document whose integrity latch is set
    pub fn compromised_documents(&self) -> StoreResult<Vec<Document>> {
        self.query_documents(
            &format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents d
                 WHERE d.is_compromised = 1 ORDER BY d.id"
            ),
            [],
        )
    }

    fn query_documents<P: rusqlite::Params>(&self, sql: &str, params: P) -> StoreResult<Vec<Document>> {
        let mut stmt = self.conn.prepare(sql)?;
        let docs = stmt
            .query_map(params, document_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(docs)
    }

    pub fn set_document_status(&self, id: DocumentId, status: DocumentStatus) -> StoreResult<()> {
        self.update_document(
            "UPDATE documents SET status = ?1 WHERE id = ?2",
            params![status.as_ref(), id],
            id,
        )
    }

    pub fn mark_verified(&self, id: DocumentId) -> StoreResult<()> {
        self.update_document(
            "UPDATE documents SET is_verified = 1 WHERE id = ?1",
            params![id],
            id,
        )
    }

    /// Set the one-way compromise latch
    pub fn mark_compromised(&self, id: DocumentId) -> StoreResult<()> {
        self.update_document(
            "UPDATE documents SET is_compromised = 1 WHERE id = ?1",
            params![id],
            id,
        )
    }

    /// Record a fresh upload; clears both the compromise latch and the
    /// auditor verification
    pub fn replace_file(&self, id: DocumentId, file_hash: &str, file_url: &str) -> StoreResult<()> {
        self.update_document(
            "UPDATE documents
             SET file_hash = ?1, file_url = ?2, is_compromised = 0, is_verified = 0
             WHERE id = ?3",
            params![file_hash, file_url, id],
            id,
        )
    }

    fn update_document<P: rusqlite::Params>(&self, sql: &str, params: P, id: DocumentId) -> StoreResult<()> {
        let rows = self.conn.execute(sql, params)?;
        if rows == 0 {
            return Err(StoreError::NotFound {
                entity: "document",
                id,
            });
        }
        Ok(())
    }

    // === Ledger ===

    pub fn last_entry(&self) -> StoreResult<Option<LedgerEntry>> {
        let entry = self
            .conn
            .query_row(
                &format!("SELECT {LEDGER_COLUMNS} FROM ledger_entries ORDER BY id DESC LIMIT 1"),
                [],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Seal and append an entry at the end of the chain
    pub fn append(&self, entry: NewEntry) -> StoreResult<LedgerEntry> {
        let (id, prev_hash) = match self.last_entry()? {
            Some(last) => (last.id + 1, last.hash),
            None => (1, GENESIS_HASH.to_string()),
        };
        let sealed = entry.seal(id, &prev_hash, now());

        self.conn.execute(
            "INSERT INTO ledger_entries
             (id, actor_id, actor_role, document_id, transaction_id, action,
              extra_data, created_at, prev_hash, hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                sealed.id,
                sealed.actor_id,
                sealed.actor_role.as_ref(),
                sealed.document_id,
                sealed.transaction_id,
                sealed.action.as_ref(),
                serde_json::to_string(&sealed.extra_data)?,
                timestamp(&sealed.created_at),
                sealed.prev_hash,
                sealed.hash,
            ],
        )?;

        Ok(sealed)
    }

    /// Entries matching the query, oldest first
    pub fn ledger(&self, query: &LedgerQuery) -> StoreResult<Vec<LedgerEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_entries
             WHERE (?1 IS NULL OR actor_id = ?1)
               AND (?2 IS NULL OR document_id = ?2)
               AND (?3 IS NULL OR transaction_id = ?3)
               AND (?4 IS NULL OR created_at >= ?4)
               AND (?5 IS NULL OR action = ?5)
             ORDER BY id"
        ))?;

        let entries = stmt
            .query_map(
                params![
                    query.actor_id,
                    query.document_id,
                    query.transaction_id,
                    query.since.as_ref().map(timestamp),
                    query.action.map(|a| a.to_string()),
                ],
                entry_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
