//! Human-in-the-loop: the `RequestInfoExecutor` and the correlation table
//! that matches `ExternalInputResponse`s back to a suspended handler.
//!
//! Uses a per-request correlation table, rather than a graph-wide interrupt,
//! so many requests (from many executors) can be outstanding at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};

use crate::error::WorkflowError;
use crate::event::{Event, WorkflowState};
use crate::event_bus::EventBus;
use crate::executor::{Context, Executor, ExecutorBuilder, HandlerDescriptor};
use crate::message::Message;
use crate::uuid6::uuid6;
use crate::workflow::Workflow;

/// Published by `RequestInfoExecutor`; the resumer supplies a matching
/// `ExternalInputResponse` keyed by `request_id`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExternalInputRequest {
    pub request_id: String,
    pub executor_id: String,
    pub prompt: String,
    pub schema: Option<Value>,
}

/// A caller-supplied answer to an `ExternalInputRequest`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExternalInputResponse {
    pub request_id: String,
    pub data: Value,
}

/// The suspension hook a `Context::request_input` call goes through. Kept as
/// a trait (rather than a concrete `CorrelationTable` reference) so `Context`
/// doesn't need to know about `Runner` internals.
#[async_trait]
pub trait RequestHub: Send + Sync {
    async fn request(
        &self,
        executor_id: String,
        prompt: String,
        schema: Option<Value>,
    ) -> Result<ExternalInputResponse, WorkflowError>;
}

/// A `RequestHub` usable outside of a `Runner` (unit tests, standalone
/// executor dispatch) that always fails — there is nothing to resume it.
pub struct NullRequestHub;

#[async_trait]
impl RequestHub for NullRequestHub {
    async fn request(
        &self,
        _executor_id: String,
        _prompt: String,
        _schema: Option<Value>,
    ) -> Result<ExternalInputResponse, WorkflowError> {
        Err(WorkflowError::internal(
            "request_input has no effect outside of a Runner",
        ))
    }
}

struct PendingRequest {
    request: ExternalInputRequest,
    sender: Option<oneshot::Sender<ExternalInputResponse>>,
}

/// The pieces `CorrelationTable` needs to take a checkpoint on its own,
/// wired once by `Runner::new` before the table is shared behind an `Arc`.
struct CheckpointContext {
    workflow: Arc<Workflow>,
    step: Arc<AtomicU64>,
}

/// Owns every outstanding `ExternalInputRequest` for one `Runner`, keyed by
/// request id (not executor id, so one executor may have several concurrent
/// requests in flight).
pub struct CorrelationTable {
    pending: Mutex<HashMap<String, PendingRequest>>,
    event_bus: Arc<EventBus>,
    checkpoint_ctx: Option<CheckpointContext>,
}

impl CorrelationTable {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            event_bus,
            checkpoint_ctx: None,
        }
    }

    /// Enables the pre-suspend checkpoint hook (§4.6's second capture
    /// point: "immediately before suspending for external input"). Without
    /// this, a run that suspends for HITL is only resumable from its last
    /// end-of-step checkpoint, not from the suspension point itself.
    pub(crate) fn set_checkpoint_context(&mut self, workflow: Arc<Workflow>, step: Arc<AtomicU64>) {
        self.checkpoint_ctx = Some(CheckpointContext { workflow, step });
    }

    /// Captures and saves a checkpoint right before a handler suspends.
    /// A no-op `Runner` with no bound `CheckpointStorage` (or one built
    /// outside of `Runner::new`, e.g. in unit tests) simply skips this.
    async fn checkpoint_before_suspend(&self, outstanding_requests: Vec<ExternalInputRequest>) {
        let Some(ctx) = &self.checkpoint_ctx else { return };
        crate::checkpoint::capture(
            &ctx.workflow,
            &self.event_bus,
            ctx.step.load(Ordering::SeqCst),
            Vec::new(),
            outstanding_requests,
        )
        .await;
    }

    /// Re-publishes every still-outstanding request, used right after a
    /// checkpoint resume so the caller can supply responses again.
    pub async fn republish_outstanding(&self) {
        let pending = self.pending.lock().await;
        for entry in pending.values() {
            self.event_bus
                .publish(Event::RequestInfo {
                    request_id: entry.request.request_id.clone(),
                    prompt: entry.request.prompt.clone(),
                    schema: entry.request.schema.clone(),
                    correlation_token: entry.request.request_id.clone(),
                })
                .await;
        }
    }

    /// Snapshot of outstanding requests, for checkpoint capture.
    pub async fn snapshot(&self) -> Vec<ExternalInputRequest> {
        self.pending
            .lock()
            .await
            .values()
            .map(|p| p.request.clone())
            .collect()
    }

    /// Re-arms a correlation entry after a resume (the original in-memory
    /// `oneshot` sender is gone across a process restart).
    pub async fn rearm(&self, request: ExternalInputRequest) -> oneshot::Receiver<ExternalInputResponse> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(
            request.request_id.clone(),
            PendingRequest { request, sender: Some(tx) },
        );
        rx
    }

    /// Delivers a caller-supplied response to its matching pending request.
    /// A mismatched id surfaces as `WorkflowError::UnknownRequestId` without
    /// touching any other pending entry.
    pub async fn respond(&self, response: ExternalInputResponse) -> Result<(), WorkflowError> {
        let sender = {
            let mut pending = self.pending.lock().await;
            match pending.remove(&response.request_id) {
                Some(mut entry) => entry.sender.take(),
                None => return Err(WorkflowError::UnknownRequestId(response.request_id)),
            }
        };
        if let Some(sender) = sender {
            // The receiver may already be gone if the waiting handler was
            // cancelled; that is not an error for the responder.
            let _ = sender.send(response);
        }
        Ok(())
    }
}

#[async_trait]
impl RequestHub for CorrelationTable {
    async fn request(
        &self,
        executor_id: String,
        prompt: String,
        schema: Option<Value>,
    ) -> Result<ExternalInputResponse, WorkflowError> {
        let request_id = uuid6().to_string();
        let request = ExternalInputRequest {
            request_id: request_id.clone(),
            executor_id,
            prompt: prompt.clone(),
            schema: schema.clone(),
        };
        let rx = self.rearm(request).await;
        self.event_bus
            .publish(Event::RequestInfo {
                request_id: request_id.clone(),
                prompt,
                schema,
                correlation_token: request_id,
            })
            .await;
        // The correlation table is the only party that knows a handler has
        // actually suspended for external input (the scheduler just sees an
        // in-flight task), so it is the one that reports the status here
        // rather than the runner inferring it from queue state.
        self.event_bus.publish(Event::WorkflowStatus { state: WorkflowState::AwaitingInput }).await;
        // §4.6's second capture point: checkpoint immediately before the
        // handler actually suspends, so a crash or cancel mid-suspension is
        // resumable from here rather than only from the prior step.
        let outstanding = self.snapshot().await;
        self.checkpoint_before_suspend(outstanding).await;
        rx.await.map_err(|_| WorkflowError::Cancelled)
    }
}

/// A `Request` message handled by `request_info_executor`'s single handler.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Request {
    pub prompt: String,
    pub schema: Option<Value>,
}

/// Built-in HITL executor: accepts a `Request`, suspends via
/// `Context::request_input`, then forwards the response downstream.
pub fn request_info_executor(id: impl Into<String>) -> crate::executor::FunctionExecutor {
    ExecutorBuilder::new(id)
        .on::<Request, _, _>(|req, ctx| async move {
            let response = ctx.request_input(req.prompt.clone(), req.schema.clone()).await?;
            ctx.send_message(response, None);
            Ok(())
        })
        .build()
}
