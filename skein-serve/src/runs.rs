//! `POST /runs`, `POST /runs/:run_id/responses`, and checkpoint listing/resume:
//! the HTTP+SSE surface a caller drives a `Workflow` instance through, streaming
//! `skein::Event`s over Server-Sent Events instead of raw text deltas.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use axum::extract::{Path, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::Json;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use skein::{Checkpoint, CheckpointSummary, Event, ExternalInputResponse, RunResult, Runner, WorkflowError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct StartRunRequest {
    pub run_id: Option<String>,
    pub input: Value,
}

#[derive(Serialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
}

/// Wraps an event stream so the run is deregistered from `AppState::runs`
/// the moment the stream is dropped (client disconnect, completion, or
/// cancellation all go through the same path).
struct RunGuardStream<S> {
    inner: S,
    run_id: String,
    state: AppState,
}

impl<S: Stream + Unpin> Stream for RunGuardStream<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<S> Drop for RunGuardStream<S> {
    fn drop(&mut self) {
        self.state.runs.remove(&self.run_id);
    }
}

fn event_kind(event: &Event) -> &'static str {
    match event {
        Event::ExecutorInvoked { .. } => "executor_invoked",
        Event::ExecutorCompleted { .. } => "executor_completed",
        Event::ExecutorFailed { .. } => "executor_failed",
        Event::AgentRunUpdate { .. } => "agent_run_update",
        Event::WorkflowOutput { .. } => "workflow_output",
        Event::WorkflowStatus { .. } => "workflow_status",
        Event::RequestInfo { .. } => "request_info",
        Event::CheckpointCreated { .. } => "checkpoint_created",
    }
}

fn to_sse(event: Event) -> Result<SseEvent, Infallible> {
    Ok(SseEvent::default()
        .event(event_kind(&event))
        .json_data(&event)
        .unwrap_or_else(|err| SseEvent::default().event("encode_error").data(err.to_string())))
}

/// Spawns `driver` alongside a subscription to `runner`'s event bus, relaying
/// every published event until `driver` resolves. Used for both a fresh run
/// (`Runner::run`) and a checkpoint resume (`Runner::resume_from_checkpoint`),
/// neither of which exposes its own streaming variant for the terminal form.
fn stream_events<F>(runner: std::sync::Arc<Runner>, driver: F) -> impl Stream<Item = Event>
where
    F: std::future::Future<Output = Result<RunResult, WorkflowError>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(async move {
        let mut subscriber = Box::pin(runner.event_bus().subscribe());
        tokio::pin!(driver);
        loop {
            tokio::select! {
                biased;
                result = &mut driver => {
                    let _ = result;
                    break;
                }
                Some(event) = futures::StreamExt::next(&mut subscriber) => {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
    ReceiverStream::new(rx)
}

/// `POST /runs` — starts a fresh `Runner` over the server's bound `Workflow`
/// and streams its event bus back as `text/event-stream`. The run is
/// registered under `run_id` for the duration of the stream so a suspended
/// `request_input` call can be answered via `POST /runs/:run_id/responses`.
pub async fn start_run(
    State(state): State<AppState>,
    Json(body): Json<StartRunRequest>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let run_id = body.run_id.unwrap_or_else(|| skein::uuid6::uuid6().to_string());
    let runner = std::sync::Arc::new(Runner::new(state.workflow.clone()));
    state.runs.insert(run_id.clone(), runner.clone());

    let driver_runner = runner.clone();
    let input = body.input;
    let raw = stream_events(runner, async move { driver_runner.run(input).await });
    let guarded = RunGuardStream { inner: Box::pin(raw), run_id, state };
    Sse::new(guarded.map(to_sse)).keep_alive(KeepAlive::default())
}

/// `POST /runs/:run_id/responses` — delivers a caller-supplied
/// `ExternalInputResponse` to a handler suspended in `request_input` on the
/// still-streaming run identified by `run_id`.
pub async fn respond_to_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Json(response): Json<ExternalInputResponse>,
) -> Result<Json<AcceptedResponse>, ApiError> {
    let runner = state
        .runs
        .get(&run_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| ApiError::UnknownRun(run_id.clone()))?;
    runner.send_response(response).await?;
    Ok(Json(AcceptedResponse { accepted: true }))
}

/// `GET /checkpoints` — lists every checkpoint saved under the workflow's
/// bound `CheckpointStorage`, most recent last (storage-defined order).
pub async fn list_checkpoints(
    State(state): State<AppState>,
) -> Result<Json<Vec<CheckpointSummary>>, ApiError> {
    let storage = state.workflow.checkpoint_storage().ok_or(ApiError::NoCheckpointStorage)?;
    let summaries = storage.list().await?;
    Ok(Json(summaries))
}

/// `POST /checkpoints/:checkpoint_id/resume` — loads the named checkpoint,
/// fails fast with `GraphMismatch` if the workflow changed since it was
/// taken, and otherwise streams the resumed run the same way `/runs` does.
pub async fn resume_checkpoint(
    State(state): State<AppState>,
    Path(checkpoint_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let storage = state.workflow.checkpoint_storage().ok_or(ApiError::NoCheckpointStorage)?;
    let checkpoint: Checkpoint = storage
        .load(&checkpoint_id)
        .await?
        .ok_or_else(|| ApiError::UnknownCheckpoint(checkpoint_id.clone()))?;

    let run_id = checkpoint_id.clone();
    let runner = std::sync::Arc::new(Runner::new(state.workflow.clone()));
    state.runs.insert(run_id.clone(), runner.clone());

    let driver_runner = runner.clone();
    let raw = stream_events(runner, async move { driver_runner.resume_from_checkpoint(checkpoint).await });
    let guarded = RunGuardStream { inner: Box::pin(raw), run_id, state };
    Ok(Sse::new(guarded.map(to_sse)).keep_alive(KeepAlive::default()))
}
