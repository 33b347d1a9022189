//! Drives a workflow over HTTP against a running `skein-serve` instance:
//! `POST /runs` and `POST /checkpoints/:id/resume` both return
//! `text/event-stream`, parsed line-by-line into `skein::Event`s as the
//! response body arrives.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use skein::{CheckpointSummary, Event};

use super::{BackendError, EventSink, RunBackend, RunOutcome};

pub struct RemoteBackend {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), client: reqwest::Client::new() }
    }

    pub async fn is_reachable(&self) -> bool {
        self.client
            .get(format!("{}/healthz", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// Reads an SSE response body to completion, handing each `data:` line
    /// to `on_event` after decoding it as a `skein::Event`, and folding
    /// `workflow_output`/`workflow_status` events into a `RunOutcome`.
    async fn consume_sse(response: reqwest::Response, on_event: EventSink<'_>) -> Result<RunOutcome, BackendError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Server { status, body });
        }

        let mut outcome = RunOutcome::default();
        let mut buf = String::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buf.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buf.find("\n\n") {
                let block: String = buf.drain(..pos + 2).collect();
                if let Some(event) = parse_sse_block(&block) {
                    match &event {
                        Event::WorkflowOutput { payload, .. } => outcome.outputs.push(payload.clone()),
                        Event::WorkflowStatus { state } => outcome.final_state = Some(format!("{state:?}")),
                        _ => {}
                    }
                    on_event(&event);
                }
            }
        }
        Ok(outcome)
    }
}

fn parse_sse_block(block: &str) -> Option<Event> {
    let data: String = block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|v| v.trim_start())
        .collect::<Vec<_>>()
        .join("\n");
    if data.is_empty() {
        return None;
    }
    serde_json::from_str::<Event>(&data).ok()
}

#[async_trait(?Send)]
impl RunBackend for RemoteBackend {
    async fn run(&self, _workflow_path: &Path, input: Value, on_event: EventSink<'_>) -> Result<RunOutcome, BackendError> {
        let response = self
            .client
            .post(format!("{}/runs", self.base_url))
            .json(&serde_json::json!({ "run_id": null, "input": input }))
            .send()
            .await?;
        Self::consume_sse(response, on_event).await
    }

    async fn resume(&self, _workflow_path: &Path, checkpoint_id: &str, on_event: EventSink<'_>) -> Result<RunOutcome, BackendError> {
        let response = self
            .client
            .post(format!("{}/checkpoints/{checkpoint_id}/resume", self.base_url))
            .send()
            .await?;
        Self::consume_sse(response, on_event).await
    }

    async fn list_checkpoints(&self, _workflow_path: &Path) -> Result<Vec<CheckpointSummary>, BackendError> {
        let response = self.client.get(format!("{}/checkpoints", self.base_url)).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Server { status, body });
        }
        Ok(response.json().await?)
    }
}
