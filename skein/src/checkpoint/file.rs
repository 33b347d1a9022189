//! One JSON file per checkpoint, written temp-then-rename for atomicity.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::checkpoint::storage::{Checkpoint, CheckpointStorage, CheckpointSummary};
use crate::error::WorkflowError;

pub struct FileCheckpointStorage {
    dir: PathBuf,
}

impl FileCheckpointStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, checkpoint_id: &str) -> PathBuf {
        self.dir.join(format!("{checkpoint_id}.json"))
    }

    async fn ensure_dir(&self) -> Result<(), WorkflowError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| WorkflowError::Storage(e.to_string()))
    }
}

#[async_trait]
impl CheckpointStorage for FileCheckpointStorage {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), WorkflowError> {
        self.ensure_dir().await?;
        let body = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| WorkflowError::Serialization(e.to_string()))?;
        let final_path = self.path_for(&checkpoint.checkpoint_id);
        let tmp_path = self.dir.join(format!("{}.tmp", checkpoint.checkpoint_id));
        fs::write(&tmp_path, body)
            .await
            .map_err(|e| WorkflowError::Storage(e.to_string()))?;
        fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|e| WorkflowError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<CheckpointSummary>, WorkflowError> {
        self.ensure_dir().await?;
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| WorkflowError::Storage(e.to_string()))?;
        let mut summaries = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkflowError::Storage(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(checkpoint) = read_checkpoint(&path).await? {
                summaries.push(CheckpointSummary::from(&checkpoint));
            }
        }
        summaries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(summaries)
    }

    async fn load(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>, WorkflowError> {
        read_checkpoint(&self.path_for(checkpoint_id)).await
    }

    async fn delete(&self, checkpoint_id: &str) -> Result<(), WorkflowError> {
        let path = self.path_for(checkpoint_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WorkflowError::Storage(e.to_string())),
        }
    }
}

async fn read_checkpoint(path: &Path) -> Result<Option<Checkpoint>, WorkflowError> {
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| WorkflowError::Serialization(e.to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(WorkflowError::Storage(e.to_string())),
    }
}
