//! Embedded database engine wrapper.
//!
//! `LedgerEngine` owns the single in-memory SQLite connection for a session.
//! It is created once (cold start or from a Ledger Image), lives for the
//! session, and is never explicitly closed. All statement execution is
//! synchronous; only persistence and model calls suspend.

use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard};

use rusqlite::serialize::OwnedData;
use rusqlite::{Connection, DatabaseName};

use crate::error::{PdsError, Result};
use crate::model::QueryOutcome;

/// Primary tables of the ledger schema. Used to validate table names on
/// surfaces that interpolate them (row counts).
pub const PRIMARY_TABLES: &[&str] = &[
    "posts",
    "transactions",
    "tasks",
    "balances",
    "notes",
    "health_metrics",
    "contacts",
    "assets",
    "messages",
    "workflows",
];

// CREATE IF NOT EXISTS throughout, so hydrating an image produced by an
// older schema revision tops up the missing tables instead of failing.
const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS posts (
        id TEXT PRIMARY KEY,
        author TEXT NOT NULL,
        body TEXT NOT NULL,
        likes INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS transactions (
        id TEXT PRIMARY KEY,
        amount REAL NOT NULL,
        currency TEXT NOT NULL,
        category TEXT NOT NULL,
        kind TEXT NOT NULL,
        occurred_at TEXT NOT NULL,
        description TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        status TEXT NOT NULL,
        priority TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS balances (
        currency TEXT PRIMARY KEY,
        amount REAL NOT NULL,
        symbol TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS notes (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        tags TEXT,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS health_metrics (
        id TEXT PRIMARY KEY,
        recorded_at TEXT NOT NULL,
        metric TEXT NOT NULL,
        value REAL NOT NULL,
        unit TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS contacts (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        handle TEXT,
        category TEXT NOT NULL,
        last_contacted TEXT NOT NULL,
        notes TEXT
    );

    CREATE TABLE IF NOT EXISTS assets (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        serial TEXT,
        value REAL NOT NULL,
        category TEXT NOT NULL,
        location TEXT,
        purchased_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        sender TEXT NOT NULL,
        receiver TEXT NOT NULL,
        body TEXT NOT NULL,
        sent_at TEXT NOT NULL,
        encrypted INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS workflows (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        trigger_kind TEXT NOT NULL,
        condition TEXT NOT NULL,
        action TEXT NOT NULL,
        active INTEGER NOT NULL DEFAULT 1
    );
"#;

const SEED: &str = "INSERT OR IGNORE INTO balances (currency, amount, symbol) VALUES ('USD', 5000.0, '$');";

/// The embedded database engine for one ledger session.
pub struct LedgerEngine {
    conn: Mutex<Connection>,
}

impl LedgerEngine {
    /// Start a fresh ledger: full schema plus seed balances.
    pub fn cold_start() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch(SEED)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Restore a ledger from a previously exported Ledger Image.
    pub fn from_image(image: &[u8]) -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        let owned = Self::owned_data_from_bytes(image)?;
        conn.deserialize(DatabaseName::Main, owned, false)?;
        // Sanity check: a corrupt image surfaces here, not on first use.
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Serialize the complete current state as an opaque byte sequence.
    pub fn export(&self) -> Result<Vec<u8>> {
        let conn = self.lock_conn()?;
        let data = conn.serialize(DatabaseName::Main)?;
        Ok(data.as_ref().to_vec())
    }

    /// Run an arbitrary SQL string against the live handle.
    ///
    /// A row-producing statement returns `Rows`; a write returns `Done` with
    /// the change count. Multi-statement scripts execute top-to-bottom with
    /// no implicit transaction wrapping, so a failing statement N leaves the
    /// writes of statements 1..N-1 applied. Engine errors come back as
    /// `Failed`, never as an `Err`.
    pub fn raw(&self, sql: &str) -> QueryOutcome {
        match self.raw_inner(sql) {
            Ok(outcome) => outcome,
            Err(e) => QueryOutcome::Failed {
                error: e.to_string(),
            },
        }
    }

    fn raw_inner(&self, sql: &str) -> Result<QueryOutcome> {
        let conn = self.lock_conn()?;
        let outcome = match conn.prepare(sql) {
            Ok(mut stmt) => {
                if stmt.column_count() > 0 {
                    let columns: Vec<String> =
                        stmt.column_names().iter().map(|c| c.to_string()).collect();
                    let mut rows = stmt.query([])?;
                    let mut out = Vec::new();
                    while let Some(row) = rows.next()? {
                        let mut object = serde_json::Map::new();
                        for (i, name) in columns.iter().enumerate() {
                            object.insert(name.clone(), value_ref_to_json(row.get_ref(i)?));
                        }
                        out.push(serde_json::Value::Object(object));
                    }
                    Ok(QueryOutcome::Rows(out))
                } else {
                    let changes = stmt.execute([])?;
                    Ok(QueryOutcome::Done { changes })
                }
            }
            Err(rusqlite::Error::MultipleStatement) => {
                conn.execute_batch(sql)?;
                Ok(QueryOutcome::Done {
                    changes: conn.changes() as usize,
                })
            }
            Err(e) => Err(e.into()),
        };
        outcome
    }

    /// Whether `sql` is a single statement that cannot modify the database.
    ///
    /// Uses the prepared statement's own read-only flag, so CTE-prefixed
    /// writes (`WITH ... DELETE`) are classified correctly. Multi-statement
    /// scripts are never read-only.
    pub fn is_read_only(&self, sql: &str) -> Result<bool> {
        let conn = self.lock_conn()?;
        let outcome = match conn.prepare(sql) {
            Ok(stmt) => Ok(stmt.readonly()),
            Err(rusqlite::Error::MultipleStatement) => Ok(false),
            Err(e) => Err(e.into()),
        };
        outcome
    }

    /// Row count for one of the primary tables.
    pub fn table_row_count(&self, table: &str) -> Result<i64> {
        if !PRIMARY_TABLES.contains(&table) {
            return Err(PdsError::NotFound(format!("Unknown table: {}", table)));
        }
        let conn = self.lock_conn()?;
        let count = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    /// Lock the database connection, returning an error if the mutex is
    /// poisoned.
    pub(crate) fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PdsError::Storage("SQLite connection poisoned".to_string()))
    }

    fn owned_data_from_bytes(bytes: &[u8]) -> Result<OwnedData> {
        if bytes.is_empty() {
            return Err(PdsError::Storage("Ledger image is empty".to_string()));
        }

        let size: i32 = bytes
            .len()
            .try_into()
            .map_err(|_| PdsError::Storage("Ledger image too large".to_string()))?;

        // SAFETY: sqlite3_malloc returns a valid pointer or null; null is
        // rejected below. `size` equals `bytes.len()` (checked via try_into),
        // the source and destination regions cannot overlap because `raw` is
        // freshly allocated, and `OwnedData::from_raw_nonnull` takes
        // ownership of the buffer so SQLite frees it.
        let raw = unsafe { rusqlite::ffi::sqlite3_malloc(size) as *mut u8 };
        let ptr = NonNull::new(raw)
            .ok_or_else(|| PdsError::Storage("SQLite allocation failed".to_string()))?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len());
            Ok(OwnedData::from_raw_nonnull(ptr, bytes.len()))
        }
    }
}

fn value_ref_to_json(value: rusqlite::types::ValueRef<'_>) -> serde_json::Value {
    use rusqlite::types::ValueRef;
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(format!("<blob {} bytes>", b.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QueryOutcome;

    #[test]
    fn test_cold_start_has_seed_balance_and_empty_tables() {
        let engine = LedgerEngine::cold_start().unwrap();

        match engine.raw("SELECT currency, amount FROM balances") {
            QueryOutcome::Rows(rows) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0]["currency"], serde_json::json!("USD"));
                assert_eq!(rows[0]["amount"], serde_json::json!(5000.0));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        for table in PRIMARY_TABLES.iter().filter(|t| **t != "balances") {
            assert_eq!(engine.table_row_count(table).unwrap(), 0, "{}", table);
        }
    }

    #[test]
    fn test_export_round_trip_preserves_rows() {
        let engine = LedgerEngine::cold_start().unwrap();
        engine.raw("INSERT INTO tasks VALUES ('t1', 'Ship it', 'todo', 'high')");
        let image = engine.export().unwrap();
        drop(engine);

        let restored = LedgerEngine::from_image(&image).unwrap();
        match restored.raw("SELECT title FROM tasks WHERE id = 't1'") {
            QueryOutcome::Rows(rows) => {
                assert_eq!(rows[0]["title"], serde_json::json!("Ship it"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(restored.table_row_count("tasks").unwrap(), 1);
    }

    #[test]
    fn test_from_image_rejects_garbage() {
        assert!(LedgerEngine::from_image(&[0u8; 64]).is_err());
        assert!(LedgerEngine::from_image(&[]).is_err());
    }

    #[test]
    fn test_raw_malformed_sql_is_a_value_not_an_error() {
        let engine = LedgerEngine::cold_start().unwrap();
        match engine.raw("SELEC broken") {
            QueryOutcome::Failed { error } => assert!(!error.is_empty()),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_raw_script_runs_without_implicit_transaction() {
        let engine = LedgerEngine::cold_start().unwrap();
        // Second statement fails; the first write must survive.
        let outcome = engine.raw(
            "INSERT INTO tasks VALUES ('a', 'first', 'todo', 'low'); \
             INSERT INTO nonexistent VALUES (1);",
        );
        assert!(!outcome.is_success());
        assert_eq!(engine.table_row_count("tasks").unwrap(), 1);
    }

    #[test]
    fn test_is_read_only_sees_through_cte_writes() {
        let engine = LedgerEngine::cold_start().unwrap();

        assert!(engine.is_read_only("SELECT * FROM tasks").unwrap());
        assert!(engine
            .is_read_only("WITH t AS (SELECT 1) SELECT * FROM t")
            .unwrap());

        assert!(!engine
            .is_read_only("WITH t AS (SELECT 1) DELETE FROM tasks")
            .unwrap());
        assert!(!engine
            .is_read_only("WITH t AS (SELECT 1) INSERT INTO tasks VALUES ('x', 'y', 'todo', 'low')")
            .unwrap());
        assert!(!engine.is_read_only("DELETE FROM tasks").unwrap());
        assert!(!engine.is_read_only("SELECT 1; DROP TABLE tasks").unwrap());

        assert!(engine.is_read_only("SELEC broken").is_err());
    }

    #[test]
    fn test_table_row_count_rejects_unknown_table() {
        let engine = LedgerEngine::cold_start().unwrap();
        assert!(engine.table_row_count("sqlite_master").is_err());
    }
}
