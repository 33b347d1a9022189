//! `RunBackend`: the one seam between the CLI's subcommands and where a
//! workflow actually executes. [`LocalBackend`] drives a `skein::Runner`
//! in-process; [`RemoteBackend`] drives one over HTTP+SSE against a running
//! `skein-serve` instance. Both report every `skein::Event` through the same
//! callback so `main.rs` doesn't need to know which backend it's talking to.

pub mod auto_start;
pub mod local;
pub mod remote;

use async_trait::async_trait;
use serde_json::Value;
use skein::Event;
use thiserror::Error;

pub use local::LocalBackend;
pub use remote::RemoteBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("workflow file: {0}")]
    Loader(#[from] skein::loader::LoaderError),
    #[error(transparent)]
    Workflow(#[from] skein::WorkflowError),
    #[error("unknown checkpoint '{0}'")]
    UnknownCheckpoint(String),
    #[error("request to server: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: reqwest::StatusCode, body: String },
    #[error("malformed event stream: {0}")]
    Stream(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Terminal outcome of a run, independent of whether it was local or remote.
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub outputs: Vec<Value>,
    pub final_state: Option<String>,
}

/// Called once per event observed on the run, in order, before the run
/// terminates. Implementations that only care about final output can ignore
/// every call and read `RunOutcome` instead.
pub type EventSink<'a> = &'a mut dyn FnMut(&Event);

#[async_trait(?Send)]
pub trait RunBackend {
    /// Runs `workflow` to completion (or until it suspends on a
    /// `request-info` node that never gets answered) against `input`.
    async fn run(
        &self,
        workflow_path: &std::path::Path,
        input: Value,
        on_event: EventSink<'_>,
    ) -> Result<RunOutcome, BackendError>;

    /// Resumes a previously checkpointed run.
    async fn resume(
        &self,
        workflow_path: &std::path::Path,
        checkpoint_id: &str,
        on_event: EventSink<'_>,
    ) -> Result<RunOutcome, BackendError>;

    /// Lists checkpoints saved for `workflow_path`'s bound storage.
    async fn list_checkpoints(
        &self,
        workflow_path: &std::path::Path,
    ) -> Result<Vec<skein::CheckpointSummary>, BackendError>;
}
