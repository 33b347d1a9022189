//! `DashMap`-backed in-memory `CheckpointStorage`.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::checkpoint::storage::{Checkpoint, CheckpointStorage, CheckpointSummary};
use crate::error::WorkflowError;

#[derive(Default)]
pub struct InMemoryCheckpointStorage {
    checkpoints: DashMap<String, Checkpoint>,
}

impl InMemoryCheckpointStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStorage for InMemoryCheckpointStorage {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), WorkflowError> {
        self.checkpoints
            .insert(checkpoint.checkpoint_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<CheckpointSummary>, WorkflowError> {
        let mut items: Vec<CheckpointSummary> =
            self.checkpoints.iter().map(|e| CheckpointSummary::from(e.value())).collect();
        items.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(items)
    }

    async fn load(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>, WorkflowError> {
        Ok(self.checkpoints.get(checkpoint_id).map(|e| e.value().clone()))
    }

    async fn delete(&self, checkpoint_id: &str) -> Result<(), WorkflowError> {
        self.checkpoints.remove(checkpoint_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample(id: &str, step: u64) -> Checkpoint {
        Checkpoint {
            checkpoint_id: id.to_string(),
            graph_hash: 1,
            step,
            timestamp: format!("2026-01-01T00:00:0{step}Z"),
            per_executor_state: HashMap::new(),
            pending_queue: Vec::new(),
            outstanding_requests: Vec::new(),
            session_state: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let storage = InMemoryCheckpointStorage::new();
        storage.save(&sample("a", 1)).await.unwrap();
        let loaded = storage.load("a").await.unwrap().unwrap();
        assert_eq!(loaded.step, 1);
    }

    #[tokio::test]
    async fn list_is_sorted_by_timestamp() {
        let storage = InMemoryCheckpointStorage::new();
        storage.save(&sample("b", 2)).await.unwrap();
        storage.save(&sample("a", 1)).await.unwrap();
        let items = storage.list().await.unwrap();
        assert_eq!(items[0].checkpoint_id, "a");
        assert_eq!(items[1].checkpoint_id, "b");
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let storage = InMemoryCheckpointStorage::new();
        storage.save(&sample("a", 1)).await.unwrap();
        storage.delete("a").await.unwrap();
        assert!(storage.load("a").await.unwrap().is_none());
    }
}
