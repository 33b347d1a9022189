//! SQLite-backed thread store: per-thread message history and serialized
//! agent state. Own DB, independent of the core checkpoint layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("not found: {0}")]
    NotFound(String),
}

/// One stored message in a thread's history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
    /// Milliseconds since Unix epoch.
    pub created_at_ms: i64,
}

/// SQLite-backed thread store: message history plus an opaque per-thread
/// JSON state blob for an embedded agent's own bookkeeping.
pub struct Store {
    db: Arc<Mutex<rusqlite::Connection>>,
}

impl Store {
    /// Opens or creates the database and tables.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&path).map_err(|e| StoreError::Storage(e.to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS thread_messages (
                thread_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (thread_id, seq)
            );
            CREATE TABLE IF NOT EXISTS thread_state (
                thread_id TEXT PRIMARY KEY,
                state TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Appends messages to a thread's history, in the order given.
    pub async fn add_messages(&self, thread_id: &str, messages: Vec<StoredMessage>) -> Result<(), StoreError> {
        let db = self.db.clone();
        let thread_id = thread_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock".into()))?;
            let next_seq: i64 = conn
                .query_row(
                    "SELECT COALESCE(MAX(seq), -1) + 1 FROM thread_messages WHERE thread_id = ?1",
                    rusqlite::params![thread_id],
                    |row| row.get(0),
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            for (i, message) in messages.into_iter().enumerate() {
                conn.execute(
                    "INSERT INTO thread_messages (thread_id, seq, role, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![
                        thread_id,
                        next_seq + i as i64,
                        message.role,
                        message.content,
                        message.created_at_ms,
                    ],
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            }
            Ok(())
        })
    }

    /// Lists a thread's full message history in append order.
    pub async fn list_messages(&self, thread_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        let db = self.db.clone();
        let thread_id = thread_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock".into()))?;
            let mut stmt = conn
                .prepare(
                    "SELECT role, content, created_at FROM thread_messages WHERE thread_id = ?1 ORDER BY seq ASC",
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(rusqlite::params![thread_id], |row| {
                    Ok(StoredMessage { role: row.get(0)?, content: row.get(1)?, created_at_ms: row.get(2)? })
                })
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|e| StoreError::Storage(e.to_string()))
        })
    }

    /// Overwrites a thread's opaque agent-state blob.
    pub async fn serialize_state(&self, thread_id: &str, state: Value) -> Result<(), StoreError> {
        let db = self.db.clone();
        let thread_id = thread_id.to_string();
        let body = serde_json::to_string(&state).map_err(|e| StoreError::Storage(e.to_string()))?;
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock".into()))?;
            conn.execute(
                "INSERT OR REPLACE INTO thread_state (thread_id, state) VALUES (?1, ?2)",
                rusqlite::params![thread_id, body],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })
    }

    /// Reads a thread's agent-state blob, `None` if it was never written.
    pub async fn deserialize_state(&self, thread_id: &str) -> Result<Option<Value>, StoreError> {
        let db = self.db.clone();
        let thread_id = thread_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock".into()))?;
            let body: Option<String> = conn
                .query_row(
                    "SELECT state FROM thread_state WHERE thread_id = ?1",
                    rusqlite::params![thread_id],
                    |row| row.get(0),
                )
                .ok();
            body.map(|b| serde_json::from_str(&b).map_err(|e| StoreError::Storage(e.to_string())))
                .transpose()
        })
    }

}
