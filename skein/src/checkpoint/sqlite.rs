//! SQLite-backed `CheckpointStorage`, for the same durability tier the
//! pack reaches for `rusqlite` (bundled) when it needs a single-file,
//! dependency-free store. `rusqlite` is synchronous, so every call runs
//! on a blocking thread via `spawn_blocking`.

use std::path::PathBuf;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use rusqlite::{params, Connection};

use crate::checkpoint::storage::{Checkpoint, CheckpointStorage, CheckpointSummary};
use crate::error::WorkflowError;

pub struct SqliteCheckpointStorage {
    conn: std::sync::Arc<StdMutex<Connection>>,
}

impl SqliteCheckpointStorage {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, WorkflowError> {
        let conn = Connection::open(path.into()).map_err(|e| WorkflowError::Storage(e.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                checkpoint_id TEXT PRIMARY KEY,
                step INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                body TEXT NOT NULL
            )",
        )
        .map_err(|e| WorkflowError::Storage(e.to_string()))?;
        Ok(Self { conn: std::sync::Arc::new(StdMutex::new(conn)) })
    }

    pub fn open_in_memory() -> Result<Self, WorkflowError> {
        let conn = Connection::open_in_memory().map_err(|e| WorkflowError::Storage(e.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                checkpoint_id TEXT PRIMARY KEY,
                step INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                body TEXT NOT NULL
            )",
        )
        .map_err(|e| WorkflowError::Storage(e.to_string()))?;
        Ok(Self { conn: std::sync::Arc::new(StdMutex::new(conn)) })
    }
}

#[async_trait]
impl CheckpointStorage for SqliteCheckpointStorage {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), WorkflowError> {
        let conn = self.conn.clone();
        let checkpoint = checkpoint.clone();
        tokio::task::spawn_blocking(move || {
            let body = serde_json::to_string(&checkpoint)
                .map_err(|e| WorkflowError::Serialization(e.to_string()))?;
            let conn = conn.lock().expect("checkpoint connection poisoned");
            conn.execute(
                "INSERT OR REPLACE INTO checkpoints (checkpoint_id, step, timestamp, body)
                 VALUES (?1, ?2, ?3, ?4)",
                params![checkpoint.checkpoint_id, checkpoint.step as i64, checkpoint.timestamp, body],
            )
            .map_err(|e| WorkflowError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| WorkflowError::Internal(e.to_string()))?
    }

    async fn list(&self) -> Result<Vec<CheckpointSummary>, WorkflowError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("checkpoint connection poisoned");
            let mut stmt = conn
                .prepare("SELECT checkpoint_id, step, timestamp FROM checkpoints ORDER BY timestamp ASC")
                .map_err(|e| WorkflowError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(CheckpointSummary {
                        checkpoint_id: row.get(0)?,
                        step: row.get::<_, i64>(1)? as u64,
                        timestamp: row.get(2)?,
                    })
                })
                .map_err(|e| WorkflowError::Storage(e.to_string()))?;
            let mut summaries = Vec::new();
            for row in rows {
                summaries.push(row.map_err(|e| WorkflowError::Storage(e.to_string()))?);
            }
            Ok(summaries)
        })
        .await
        .map_err(|e| WorkflowError::Internal(e.to_string()))?
    }

    async fn load(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>, WorkflowError> {
        let conn = self.conn.clone();
        let checkpoint_id = checkpoint_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("checkpoint connection poisoned");
            let body: Option<String> = conn
                .query_row(
                    "SELECT body FROM checkpoints WHERE checkpoint_id = ?1",
                    params![checkpoint_id],
                    |row| row.get(0),
                )
                .ok();
            body.map(|b| serde_json::from_str(&b).map_err(|e| WorkflowError::Serialization(e.to_string())))
                .transpose()
        })
        .await
        .map_err(|e| WorkflowError::Internal(e.to_string()))?
    }

    async fn delete(&self, checkpoint_id: &str) -> Result<(), WorkflowError> {
        let conn = self.conn.clone();
        let checkpoint_id = checkpoint_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("checkpoint connection poisoned");
            conn.execute("DELETE FROM checkpoints WHERE checkpoint_id = ?1", params![checkpoint_id])
                .map_err(|e| WorkflowError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| WorkflowError::Internal(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample(id: &str) -> Checkpoint {
        Checkpoint {
            checkpoint_id: id.to_string(),
            graph_hash: 9,
            step: 2,
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            per_executor_state: HashMap::new(),
            pending_queue: Vec::new(),
            outstanding_requests: Vec::new(),
            session_state: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let storage = SqliteCheckpointStorage::open_in_memory().unwrap();
        storage.save(&sample("a")).await.unwrap();
        let loaded = storage.load("a").await.unwrap().unwrap();
        assert_eq!(loaded.graph_hash, 9);
    }

    #[tokio::test]
    async fn overwrite_same_id_replaces_row() {
        let storage = SqliteCheckpointStorage::open_in_memory().unwrap();
        storage.save(&sample("a")).await.unwrap();
        let mut second = sample("a");
        second.step = 5;
        storage.save(&second).await.unwrap();
        let loaded = storage.load("a").await.unwrap().unwrap();
        assert_eq!(loaded.step, 5);
        assert_eq!(storage.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let storage = SqliteCheckpointStorage::open_in_memory().unwrap();
        storage.save(&sample("a")).await.unwrap();
        storage.delete("a").await.unwrap();
        assert!(storage.load("a").await.unwrap().is_none());
    }
}
