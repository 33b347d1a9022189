//! `Checkpoint` data shape and the pluggable `CheckpointStorage` trait:
//! save/list/load/delete over the full run snapshot, not just one state value.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WorkflowError;
use crate::event::Event;
use crate::event_bus::EventBus;
use crate::request_info::ExternalInputRequest;
use crate::uuid6::uuid6;
use crate::workflow::Workflow;

/// One message that had not yet been delivered when the checkpoint was taken.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingMessage {
    pub destination: String,
    pub type_tag: String,
    pub payload: Value,
}

/// A point-in-time snapshot enabling later resumption, provided the
/// workflow's current graph hash still matches `graph_hash`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub graph_hash: u64,
    pub step: u64,
    pub timestamp: String,
    pub per_executor_state: HashMap<String, Value>,
    pub pending_queue: Vec<PendingMessage>,
    pub outstanding_requests: Vec<ExternalInputRequest>,
    pub session_state: HashMap<String, Value>,
}

/// Lightweight listing entry, avoiding a full deserialize for `list()`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub checkpoint_id: String,
    pub step: u64,
    pub timestamp: String,
}

impl From<&Checkpoint> for CheckpointSummary {
    fn from(c: &Checkpoint) -> Self {
        Self {
            checkpoint_id: c.checkpoint_id.clone(),
            step: c.step,
            timestamp: c.timestamp.clone(),
        }
    }
}

/// Pluggable checkpoint persistence. `save` must be atomic per checkpoint id;
/// concurrent writes of the same id are unspecified (last writer wins).
#[async_trait]
pub trait CheckpointStorage: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), WorkflowError>;
    async fn list(&self) -> Result<Vec<CheckpointSummary>, WorkflowError>;
    async fn load(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>, WorkflowError>;
    async fn delete(&self, checkpoint_id: &str) -> Result<(), WorkflowError>;
}

/// Builds, saves, and publishes one checkpoint snapshot against `workflow`'s
/// bound storage (a no-op if none is configured). Shared by the runner's
/// end-of-step capture and the pre-suspend capture `request_info` triggers
/// immediately before a handler suspends for external input (§4.6's second
/// capture point).
pub(crate) async fn capture(
    workflow: &Workflow,
    event_bus: &Arc<EventBus>,
    step: u64,
    pending_queue: Vec<PendingMessage>,
    outstanding_requests: Vec<ExternalInputRequest>,
) -> Option<Checkpoint> {
    let storage = workflow.checkpoint_storage()?;
    let per_executor_state: HashMap<String, Value> = workflow
        .executor_ids()
        .filter_map(|id| {
            let executor = workflow.executor(id)?;
            executor.serialize_state().map(|v| (id.to_string(), v))
        })
        .collect();
    let checkpoint = Checkpoint {
        checkpoint_id: uuid6().to_string(),
        graph_hash: workflow.graph_hash(),
        step,
        timestamp: chrono::Utc::now().to_rfc3339(),
        per_executor_state,
        pending_queue,
        outstanding_requests,
        session_state: HashMap::new(),
    };
    if let Err(err) = storage.save(&checkpoint).await {
        tracing::warn!(error = %err, "checkpoint save failed");
    } else {
        event_bus
            .publish(Event::CheckpointCreated {
                checkpoint_id: checkpoint.checkpoint_id.clone(),
                step: checkpoint.step,
            })
            .await;
    }
    Some(checkpoint)
}
