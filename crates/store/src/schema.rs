//! Database schema

use rusqlite::Connection;

/// Create tables, indexes and the ledger append-only triggers
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            org TEXT NOT NULL,
            role TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            buyer_id INTEGER NOT NULL REFERENCES users(id),
            seller_id INTEGER NOT NULL REFERENCES users(id),
            amount TEXT NOT NULL,
            currency TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY,
            doc_number TEXT NOT NULL UNIQUE,
            doc_type TEXT NOT NULL,
            owner_id INTEGER NOT NULL REFERENCES users(id),
            transaction_id INTEGER NOT NULL REFERENCES transactions(id),
            status TEXT NOT NULL,
            file_hash TEXT NOT NULL,
            file_url TEXT NOT NULL,
            is_compromised INTEGER NOT NULL DEFAULT 0,
            is_verified INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        -- One document of each type per transaction
        CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_txn_type
            ON documents(transaction_id, doc_type);

        CREATE INDEX IF NOT EXISTS idx_documents_compromised
            ON documents(is_compromised);

        CREATE TABLE IF NOT EXISTS ledger_entries (
            id INTEGER PRIMARY KEY,
            actor_id INTEGER NOT NULL,
            actor_role TEXT NOT NULL,
            document_id INTEGER NOT NULL,
            transaction_id INTEGER NOT NULL,
            action TEXT NOT NULL,
            extra_data TEXT NOT NULL,
            created_at TEXT NOT NULL,
            prev_hash TEXT NOT NULL,
            hash TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_ledger_document ON ledger_entries(document_id);
        CREATE INDEX IF NOT EXISTS idx_ledger_transaction ON ledger_entries(transaction_id);
        CREATE INDEX IF NOT EXISTS idx_ledger_actor ON ledger_entries(actor_id);

        CREATE TRIGGER IF NOT EXISTS ledger_entries_no_update
            BEFORE UPDATE ON ledger_entries
        BEGIN
            SELECT RAISE(ABORT, 'ledger_entries is append-only');
        END;

        CREATE TRIGGER IF NOT EXISTS ledger_entries_no_delete
            BEFORE DELETE ON ledger_entries
        BEGIN
            SELECT RAISE(ABORT, 'ledger_entries is append-only');
        END;",
    )
}
