//! SQLite Persistent Storage for Shielding Addresses
//!
//! Durable registry of shielding address registrations. Uses connection
//! pooling via r2d2 for concurrent access. Duplicate registrations are
//! rejected by a unique index, not by a read-then-write check.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

use super::traits::{DepositStore, StorageError, StorageResult};
use crate::types::{ChainCode, ChainCodeMode, DepositRecord};

/// SQLITE_CONSTRAINT_PRIMARYKEY / SQLITE_CONSTRAINT_UNIQUE
fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.extended_code == 1555 || err.extended_code == 2067
    )
}

/// SQLite-backed registration store with connection pooling
pub struct SqliteDepositStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteDepositStore {
    /// Create a new store with the given database path
    ///
    /// Creates the database file and runs migrations if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.busy_timeout(Duration::from_secs(5))?;
            conn.execute_batch("PRAGMA journal_mode = WAL;")
        });
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Get a connection from the pool
    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS shielding_addresses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chain_code_mode TEXT NOT NULL,
                chain_code TEXT NOT NULL,
                btc_address TEXT NOT NULL,
                receivers TEXT NOT NULL DEFAULT '[]',
                signatures TEXT NOT NULL DEFAULT '[]',
                receiver_keys TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                UNIQUE (chain_code_mode, chain_code, btc_address)
            );

            CREATE INDEX IF NOT EXISTS idx_shielding_chain_code
                ON shielding_addresses(chain_code_mode, chain_code);
            CREATE INDEX IF NOT EXISTS idx_shielding_created_at
                ON shielding_addresses(created_at);

            CREATE TABLE IF NOT EXISTS receiver_keys (
                receiver_key TEXT PRIMARY KEY,
                address_id INTEGER NOT NULL REFERENCES shielding_addresses(id)
            );
            "#,
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    fn json_column(row: &rusqlite::Row, idx: &str) -> rusqlite::Result<Vec<String>> {
        let raw: String = row.get(idx)?;
        serde_json::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
    }

    /// Convert a database row to DepositRecord
    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<DepositRecord> {
        let mode_str: String = row.get("chain_code_mode")?;
        let mode: ChainCodeMode = mode_str.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(0, Type::Text, e.into())
        })?;

        Ok(DepositRecord {
            chain_code: ChainCode::from_parts(mode, row.get("chain_code")?),
            btc_address: row.get("btc_address")?,
            receivers: Self::json_column(row, "receivers")?,
            signatures: Self::json_column(row, "signatures")?,
            receiver_keys: Self::json_column(row, "receiver_keys")?,
            created_at: row.get("created_at")?,
        })
    }

    fn to_json(values: &[String]) -> Result<String, StorageError> {
        serde_json::to_string(values).map_err(|e| StorageError::InvalidData(e.to_string()))
    }

    // Synchronous helper methods for the trait implementations

    fn insert_sync(&self, record: &DepositRecord) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        // Take the write lock up front so concurrent writers wait on busy_timeout
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        tx.execute(
            r#"
            INSERT INTO shielding_addresses (
                chain_code_mode, chain_code, btc_address,
                receivers, signatures, receiver_keys, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.chain_code.mode().as_str(),
                record.chain_code.as_str(),
                record.btc_address,
                Self::to_json(&record.receivers)?,
                Self::to_json(&record.signatures)?,
                Self::to_json(&record.receiver_keys)?,
                record.created_at,
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                return StorageError::Duplicate(format!(
                    "{} -> {}",
                    record.chain_code, record.btc_address
                ));
            }
            StorageError::Database(e.to_string())
        })?;

        let address_id = tx.last_insert_rowid();
        for key in &record.receiver_keys {
            tx.execute(
                "INSERT INTO receiver_keys (receiver_key, address_id) VALUES (?1, ?2)",
                params![key, address_id],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    return StorageError::ReceiverKeyTaken(key.clone());
                }
                StorageError::Database(e.to_string())
            })?;
        }

        // Dropping an uncommitted transaction rolls it back
        tx.commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    fn exists_sync(&self, chain_code: &ChainCode, btc_address: &str) -> Result<bool, StorageError> {
        let conn = self.conn()?;

        let found = conn
            .query_row(
                r#"
            SELECT 1 FROM shielding_addresses
            WHERE chain_code_mode = ?1 AND chain_code = ?2 AND btc_address = ?3
            "#,
                params![chain_code.mode().as_str(), chain_code.as_str(), btc_address],
                |_| Ok(()),
            )
            .optional()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(found.is_some())
    }

    fn address_for_sync(&self, chain_code: &ChainCode) -> Result<Option<String>, StorageError> {
        let conn = self.conn()?;

        conn.query_row(
            r#"
            SELECT btc_address FROM shielding_addresses
            WHERE chain_code_mode = ?1 AND chain_code = ?2
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
            params![chain_code.mode().as_str(), chain_code.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn list_by_time_sync(&self, from: i64, to: i64) -> Result<Vec<DepositRecord>, StorageError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                r#"
            SELECT * FROM shielding_addresses
            WHERE created_at >= ?1 AND created_at < ?2
            ORDER BY created_at ASC, id ASC
            "#,
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let records = stmt
            .query_map(params![from, to], |row| Self::row_to_record(row))
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(records)
    }

    fn receiver_key_used_sync(&self, receiver_key: &str) -> Result<bool, StorageError> {
        let conn = self.conn()?;

        let found = conn
            .query_row(
                "SELECT 1 FROM receiver_keys WHERE receiver_key = ?1",
                params![receiver_key],
                |_| Ok(()),
            )
            .optional()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(found.is_some())
    }

    fn ping_sync(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl DepositStore for SqliteDepositStore {
    async fn insert(&self, record: &DepositRecord) -> StorageResult<()> {
        self.insert_sync(record)
    }

    async fn exists(&self, chain_code: &ChainCode, btc_address: &str) -> StorageResult<bool> {
        self.exists_sync(chain_code, btc_address)
    }

    async fn address_for(&self, chain_code: &ChainCode) -> StorageResult<Option<String>> {
        self.address_for_sync(chain_code)
    }

    async fn list_by_time(&self, from: i64, to: i64) -> StorageResult<Vec<DepositRecord>> {
        self.list_by_time_sync(from, to)
    }

    async fn receiver_key_used(&self, receiver_key: &str) -> StorageResult<bool> {
        self.receiver_key_used_sync(receiver_key)
    }

    async fn ping(&self) -> StorageResult<()> {
        self.ping_sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_record(account: &str, address: &str, created_at: i64) -> DepositRecord {
        DepositRecord {
            chain_code: ChainCode::Account(account.to_string()),
            btc_address: address.to_string(),
            receivers: vec![],
            signatures: vec![],
            receiver_keys: vec![],
            created_at,
        }
    }

    fn one_time_record(key: &str, address: &str, receiver_keys: &[&str]) -> DepositRecord {
        DepositRecord {
            chain_code: ChainCode::DepositKey(key.to_string()),
            btc_address: address.to_string(),
            receivers: receiver_keys.iter().map(|k| format!("r-{k}")).collect(),
            signatures: receiver_keys.iter().map(|k| format!("s-{k}")).collect(),
            receiver_keys: receiver_keys.iter().map(|k| k.to_string()).collect(),
            created_at: 100,
        }
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let store = SqliteDepositStore::in_memory().unwrap();
        let record = legacy_record("A1", "tb1q_a1", 100);

        store.insert(&record).await.unwrap();

        let code = ChainCode::Account("A1".to_string());
        assert!(store.exists(&code, "tb1q_a1").await.unwrap());
        assert!(!store.exists(&code, "tb1q_other").await.unwrap());
        assert_eq!(
            store.address_for(&code).await.unwrap(),
            Some("tb1q_a1".to_string())
        );
        assert_eq!(
            store
                .address_for(&ChainCode::DepositKey("A1".to_string()))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let store = SqliteDepositStore::in_memory().unwrap();

        store.insert(&legacy_record("A1", "tb1q_same", 100)).await.unwrap();
        let result = store.insert(&legacy_record("A1", "tb1q_same", 200)).await;

        assert!(matches!(result, Err(StorageError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_receiver_key_taken_rolls_back() {
        let store = SqliteDepositStore::in_memory().unwrap();

        store
            .insert(&one_time_record("K1", "tb1q_k1", &["02aa"]))
            .await
            .unwrap();
        assert!(store.receiver_key_used("02aa").await.unwrap());

        let result = store
            .insert(&one_time_record("K2", "tb1q_k2", &["02bb", "02aa"]))
            .await;
        assert!(matches!(result, Err(StorageError::ReceiverKeyTaken(k)) if k == "02aa"));

        // Nothing from the failed insert survives
        assert!(!store.receiver_key_used("02bb").await.unwrap());
        assert!(!store
            .exists(&ChainCode::DepositKey("K2".to_string()), "tb1q_k2")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_list_by_time_half_open() {
        let store = SqliteDepositStore::in_memory().unwrap();
        for (i, ts) in [100, 200, 300].iter().enumerate() {
            store
                .insert(&legacy_record(&format!("A{i}"), &format!("tb1q_{i}"), *ts))
                .await
                .unwrap();
        }

        let records = store.list_by_time(100, 300).await.unwrap();
        let times: Vec<i64> = records.iter().map(|r| r.created_at).collect();
        assert_eq!(times, vec![100, 200]);

        assert!(store.list_by_time(301, 400).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_round_trips_columns() {
        let store = SqliteDepositStore::in_memory().unwrap();
        let record = one_time_record("K1", "tb1q_k1", &["02aa", "03bb"]);
        store.insert(&record).await.unwrap();

        let records = store.list_by_time(0, 1_000).await.unwrap();
        assert_eq!(records, vec![record]);
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_persists() {
        let dir = std::env::temp_dir().join(format!("shield-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("shield.db");

        {
            let store = SqliteDepositStore::new(&path).unwrap();
            store.insert(&legacy_record("A1", "tb1q_a1", 100)).await.unwrap();
        }

        let reopened = SqliteDepositStore::new(&path).unwrap();
        assert!(reopened
            .exists(&ChainCode::Account("A1".to_string()), "tb1q_a1")
            .await
            .unwrap());

        std::fs::remove_dir_all(dir).ok();
    }
}
