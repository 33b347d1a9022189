//! Runs a workflow in-process: loads the YAML file with the CLI's builtin
//! registries (`crate::registry`), attaches a `FileCheckpointStorage` rooted
//! next to the workflow file, and drives a `skein::Runner` directly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use skein::{Checkpoint, CheckpointStorage, FileCheckpointStorage, Runner, WorkflowError};

use super::{BackendError, EventSink, RunBackend, RunOutcome};
use crate::registry;

pub struct LocalBackend {
    pub max_parallelism: Option<usize>,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self { max_parallelism: None }
    }

    pub fn checkpoint_dir(workflow_path: &Path) -> PathBuf {
        let dir = workflow_path.parent().unwrap_or_else(|| Path::new("."));
        let stem = workflow_path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        dir.join(format!(".{stem}-checkpoints"))
    }

    fn load(&self, workflow_path: &Path) -> Result<(Arc<skein::Workflow>, Arc<FileCheckpointStorage>), BackendError> {
        let loader = skein::Loader::new(registry::default_agents(), registry::default_functions(), registry::default_selectors());
        let loaded = loader.load_file(workflow_path)?;
        let storage = Arc::new(FileCheckpointStorage::new(Self::checkpoint_dir(workflow_path)));
        let builder = loaded.builder.checkpoint_storage(storage.clone());
        let workflow = builder.build()?;
        Ok((Arc::new(workflow), storage))
    }

    fn make_runner(&self, workflow: Arc<skein::Workflow>) -> Arc<Runner> {
        let mut runner = Runner::new(workflow);
        if let Some(n) = self.max_parallelism {
            runner = runner.with_max_parallelism(n);
        }
        Arc::new(runner)
    }

    /// Polls `runner`'s event bus alongside `driver`, calling `on_event` as
    /// each event is published, until `driver` resolves.
    async fn drain<F>(runner: Arc<Runner>, driver: F, on_event: EventSink<'_>) -> Result<RunOutcome, BackendError>
    where
        F: std::future::Future<Output = Result<skein::RunResult, WorkflowError>>,
    {
        let mut subscriber = Box::pin(runner.event_bus().subscribe());
        tokio::pin!(driver);
        let run_result = loop {
            tokio::select! {
                biased;
                result = &mut driver => break result?,
                Some(event) = futures::StreamExt::next(&mut subscriber) => {
                    on_event(&event);
                }
            }
        };
        Ok(RunOutcome {
            outputs: run_result.outputs,
            final_state: Some(format!("{:?}", run_result.final_state)),
        })
    }
}

#[async_trait(?Send)]
impl RunBackend for LocalBackend {
    async fn run(&self, workflow_path: &Path, input: Value, on_event: EventSink<'_>) -> Result<RunOutcome, BackendError> {
        let (workflow, _storage) = self.load(workflow_path)?;
        let runner = self.make_runner(workflow);
        let driver_runner = runner.clone();
        Self::drain(runner, async move { driver_runner.run(input).await }, on_event).await
    }

    async fn resume(&self, workflow_path: &Path, checkpoint_id: &str, on_event: EventSink<'_>) -> Result<RunOutcome, BackendError> {
        let (workflow, storage) = self.load(workflow_path)?;
        let checkpoint: Checkpoint = storage
            .load(checkpoint_id)
            .await?
            .ok_or_else(|| BackendError::UnknownCheckpoint(checkpoint_id.to_string()))?;
        let runner = self.make_runner(workflow);
        let driver_runner = runner.clone();
        Self::drain(runner, async move { driver_runner.resume_from_checkpoint(checkpoint).await }, on_event).await
    }

    async fn list_checkpoints(&self, workflow_path: &Path) -> Result<Vec<skein::CheckpointSummary>, BackendError> {
        let (_workflow, storage) = self.load(workflow_path)?;
        let summaries = storage.list().await?;
        Ok(summaries)
    }
}
