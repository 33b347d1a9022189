//! The step-loop scheduler: drains waves of ready messages across executor
//! mailbox tasks, bounded by a `Semaphore`, collected with a `JoinSet`.
//! Drives a multi-executor message-passing graph, rather than a single-state
//! invoke loop.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::Stream;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{Checkpoint, PendingMessage};
use crate::edge::Edge;
use crate::error::WorkflowError;
use crate::event::{Event, WorkflowState};
use crate::event_bus::EventBus;
use crate::executor::{Context, Outgoing};
use crate::message::Message;
use crate::request_info::{CorrelationTable, ExternalInputResponse};
use crate::workflow::Workflow;

const DEFAULT_MAX_PARALLELISM: usize = 64;

/// A queued delivery: a message destined for one executor.
struct Queued {
    destination: String,
    message: Message,
}

/// Outcome of `Runner::run`: every `WorkflowOutput` payload yielded during
/// the run, plus the final lifecycle state.
pub struct RunResult {
    pub outputs: Vec<serde_json::Value>,
    pub final_state: WorkflowState,
}

/// Drives one workflow instance: owns the pending queue, the correlation
/// table, and the event bus consumers read from.
pub struct Runner {
    workflow: Arc<Workflow>,
    event_bus: Arc<EventBus>,
    correlation: Arc<CorrelationTable>,
    cancellation: CancellationToken,
    max_parallelism: usize,
    step: Arc<AtomicU64>,
    fan_in_buffers: std::sync::Mutex<HashMap<String, HashMap<String, VecDeque<Message>>>>,
}

impl Runner {
    pub fn new(workflow: Arc<Workflow>) -> Self {
        let event_bus = Arc::new(EventBus::new());
        let step = Arc::new(AtomicU64::new(0));
        let mut correlation = CorrelationTable::new(event_bus.clone());
        correlation.set_checkpoint_context(workflow.clone(), step.clone());
        let correlation = Arc::new(correlation);
        Self {
            workflow,
            event_bus,
            correlation,
            cancellation: CancellationToken::new(),
            max_parallelism: DEFAULT_MAX_PARALLELISM,
            step,
            fan_in_buffers: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_max_parallelism(mut self, n: usize) -> Self {
        self.max_parallelism = n.max(1);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Delivers a caller-supplied response to a suspended `request_input` call.
    pub async fn send_response(&self, response: ExternalInputResponse) -> Result<(), WorkflowError> {
        self.correlation.respond(response).await
    }

    /// Runs to completion, collecting every `WorkflowOutput` internally.
    pub async fn run<T: serde::Serialize + Send + Sync + 'static>(
        &self,
        initial_message: T,
    ) -> Result<RunResult, WorkflowError> {
        let mut subscriber = Box::pin(self.event_bus.subscribe());
        let drive = self.drive(Message::new(initial_message));
        tokio::pin!(drive);

        let mut outputs = Vec::new();
        let mut final_state = WorkflowState::Idle;
        loop {
            tokio::select! {
                biased;
                result = &mut drive => {
                    result?;
                    break;
                }
                Some(event) = futures::StreamExt::next(&mut subscriber) => {
                    match event {
                        Event::WorkflowOutput { payload, .. } => outputs.push(payload),
                        Event::WorkflowStatus { state } => final_state = state,
                        _ => {}
                    }
                }
            }
        }
        // Drain any events published right before the drive future resolved.
        while let Ok(event) = tokio::time::timeout(
            std::time::Duration::from_millis(0),
            futures::StreamExt::next(&mut subscriber),
        )
        .await
        {
            match event {
                Some(Event::WorkflowOutput { payload, .. }) => outputs.push(payload),
                Some(Event::WorkflowStatus { state }) => final_state = state,
                _ => break,
            }
        }
        Ok(RunResult { outputs, final_state })
    }

    /// Runs while exposing the raw event stream to the caller, who is then
    /// responsible for reading `WorkflowOutput`/`WorkflowStatus` themselves.
    pub fn run_streaming<T: serde::Serialize + Send + Sync + 'static>(
        self: Arc<Self>,
        initial_message: T,
    ) -> impl Stream<Item = Event> {
        let (tx, rx) = mpsc::channel(256);
        let message = Message::new(initial_message);
        tokio::spawn(async move {
            let mut subscriber = Box::pin(self.event_bus.subscribe());
            let drive = self.drive(message);
            tokio::pin!(drive);
            loop {
                tokio::select! {
                    biased;
                    result = &mut drive => {
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

    /// Resumes a suspended run from a saved checkpoint, failing fast on a
    /// graph hash mismatch with no executor invoked.
    pub async fn resume_from_checkpoint(&self, checkpoint: Checkpoint) -> Result<RunResult, WorkflowError> {
        if checkpoint.graph_hash != self.workflow.graph_hash() {
            return Err(WorkflowError::GraphMismatch {
                expected: checkpoint.graph_hash,
                actual: self.workflow.graph_hash(),
            });
        }
        self.step.store(checkpoint.step, Ordering::SeqCst);

        for (executor_id, state) in &checkpoint.per_executor_state {
            if let Some(executor) = self.workflow.executor(executor_id) {
                executor.deserialize_state(state.clone()).await?;
            }
        }
        for request in &checkpoint.outstanding_requests {
            self.correlation.rearm(request.clone()).await;
        }
        self.correlation.republish_outstanding().await;

        let mut queue: VecDeque<Queued> = VecDeque::new();
        for pending in &checkpoint.pending_queue {
            if self.workflow.executor(&pending.destination).is_none() {
                continue;
            }
            // Resumed messages carry only their JSON payload; routed as an
            // opaque JSON message tagged with the original destination.
            queue.push_back(Queued {
                destination: pending.destination.clone(),
                message: Message::new(pending.payload.clone()),
            });
        }

        let mut subscriber = Box::pin(self.event_bus.subscribe());
        let drive = self.drive_queue(queue);
        tokio::pin!(drive);

        let mut outputs = Vec::new();
        let mut final_state = WorkflowState::Idle;
        loop {
            tokio::select! {
                biased;
                result = &mut drive => {
                    result?;
                    break;
                }
                Some(event) = futures::StreamExt::next(&mut subscriber) => {
                    match event {
                        Event::WorkflowOutput { payload, .. } => outputs.push(payload),
                        Event::WorkflowStatus { state } => final_state = state,
                        _ => {}
                    }
                }
            }
        }
        Ok(RunResult { outputs, final_state })
    }

    /// Captures the current snapshot. Called automatically before a
    /// suspend-for-input point, or on every step when `checkpoint_every_step`
    /// is set.
    async fn checkpoint(&self, queue: &VecDeque<Queued>) -> Option<Checkpoint> {
        let pending_queue = queue
            .iter()
            .map(|q| PendingMessage {
                destination: q.destination.clone(),
                type_tag: q.message.type_name().to_string(),
                payload: q.message.to_json().unwrap_or(serde_json::Value::Null),
            })
            .collect();
        let outstanding_requests = self.correlation.snapshot().await;
        crate::checkpoint::capture(
            &self.workflow,
            &self.event_bus,
            self.step.load(Ordering::SeqCst),
            pending_queue,
            outstanding_requests,
        )
        .await
    }

    /// Explicit out-of-band checkpoint, e.g. between runs or from a
    /// long-lived supervisor. Captures executor state and outstanding
    /// requests but no pending queue (there is none outside an active drive).
    pub async fn checkpoint_now(&self) -> Option<Checkpoint> {
        self.checkpoint(&VecDeque::new()).await
    }

    async fn drive(&self, initial_message: Message) -> Result<(), WorkflowError> {
        let mut queue = VecDeque::new();
        queue.push_back(Queued {
            destination: self.workflow.start_id().to_string(),
            message: initial_message,
        });
        self.drive_queue(queue).await
    }

    async fn drive_queue(&self, mut queue: VecDeque<Queued>) -> Result<(), WorkflowError> {
        self.event_bus.publish(Event::WorkflowStatus { state: WorkflowState::Running }).await;
        let mut failure_counts: HashMap<String, u32> = HashMap::new();

        loop {
            if self.cancellation.is_cancelled() {
                self.event_bus.publish(Event::WorkflowStatus { state: WorkflowState::Cancelled }).await;
                return Err(WorkflowError::Cancelled);
            }

            let step = self.step.fetch_add(1, Ordering::SeqCst) + 1;
            if step > self.workflow.max_iterations() as u64 {
                self.event_bus.publish(Event::WorkflowStatus { state: WorkflowState::Failed }).await;
                return Err(WorkflowError::IterationCap(self.workflow.max_iterations()));
            }

            let ready = self.pop_ready_wave(&mut queue);
            if ready.is_empty() {
                // A handler still suspended on `request_input` publishes its
                // own `AwaitingInput` status directly (see
                // `CorrelationTable::request`). An empty wave here means the
                // queue has drained, but a fan-in that only received
                // messages from some of its sources is still blocked, not
                // done — per the fan-in strictness rule, that reports as
                // `Idle` rather than `Completed`.
                self.event_bus.publish(Event::WorkflowStatus { state: WorkflowState::Idle }).await;
                if self.has_partial_fan_in() {
                    return Ok(());
                }
                self.event_bus.publish(Event::WorkflowStatus { state: WorkflowState::Completed }).await;
                return Ok(());
            }

            let mut by_destination: HashMap<String, Vec<Message>> = HashMap::new();
            for item in ready {
                by_destination.entry(item.destination).or_default().push(item.message);
            }

            let semaphore = Arc::new(Semaphore::new(self.max_parallelism.min(by_destination.len().max(1))));
            let mut joins: JoinSet<(String, Result<(Vec<Outgoing>, Vec<serde_json::Value>), WorkflowError>)> =
                JoinSet::new();

            for (destination, messages) in by_destination {
                let Some(executor) = self.workflow.executor(&destination).cloned() else {
                    tracing::warn!(executor_id = %destination, "message routed to unknown executor");
                    continue;
                };
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
                let request_hub = self.correlation.clone();
                let cancellation = self.cancellation.clone();
                let event_bus = self.event_bus.clone();
                let strict_mode = self.workflow.strict_mode();

                joins.spawn(async move {
                    let _permit = permit;
                    let ctx = Context::new(destination.clone(), request_hub, cancellation);
                    let mut last_err = None;
                    for message in messages {
                        event_bus
                            .publish(Event::ExecutorInvoked {
                                executor_id: destination.clone(),
                                message_type: message.type_name().to_string(),
                            })
                            .await;
                        match executor.dispatch(message, ctx.clone()).await {
                            Ok(()) => {
                                event_bus
                                    .publish(Event::ExecutorCompleted {
                                        executor_id: destination.clone(),
                                        output_summary: None,
                                    })
                                    .await;
                            }
                            Err(WorkflowError::UnknownMessage(type_name)) if !strict_mode => {
                                tracing::warn!(
                                    executor_id = %destination,
                                    message_type = %type_name,
                                    "no handler matched; message dropped"
                                );
                            }
                            Err(err) => {
                                event_bus
                                    .publish(Event::ExecutorFailed {
                                        executor_id: destination.clone(),
                                        error_tag: err.error_tag().to_string(),
                                        message: err.to_string(),
                                    })
                                    .await;
                                last_err = Some(err);
                                break;
                            }
                        }
                    }
                    match last_err {
                        Some(err) => (destination, Err(err)),
                        None => (destination, Ok((ctx.take_outgoing(), ctx.take_outputs()))),
                    }
                });
            }

            while let Some(joined) = joins.join_next().await {
                let (destination, result) = joined.map_err(|e| WorkflowError::internal(e.to_string()))?;
                match result {
                    Ok((outgoing, outputs)) => {
                        failure_counts.remove(&destination);
                        for value in outputs {
                            self.event_bus
                                .publish(Event::WorkflowOutput { source_id: destination.clone(), payload: value })
                                .await;
                        }
                        for item in outgoing {
                            self.route(&destination, item, &mut queue);
                        }
                    }
                    Err(err) => {
                        let count = failure_counts.entry(destination.clone()).or_insert(0);
                        *count += 1;
                        let breaker = self.workflow.executor(&destination).and_then(|e| e.max_consecutive_failures());
                        let tripped = breaker.map(|max| *count >= max).unwrap_or(true);
                        if tripped {
                            self.event_bus.publish(Event::WorkflowStatus { state: WorkflowState::Failed }).await;
                            return Err(err);
                        }
                        tracing::warn!(executor_id = %destination, error = %err, "handler error tolerated");
                    }
                }
            }

            if self.workflow.checkpoint_every_step() {
                self.checkpoint(&queue).await;
            }
        }
    }

    /// Drains every message queued for this wave. A handler that suspends on
    /// `request_input` blocks only its own spawned task (see `drive_queue`'s
    /// `join_next` loop below) — it does not hold back delivery to other
    /// destinations already queued for the same wave.
    fn pop_ready_wave(&self, queue: &mut VecDeque<Queued>) -> Vec<Queued> {
        queue.drain(..).collect()
    }

    /// Routes one handler's outgoing message through the source's edges,
    /// honoring fan-out selection, fan-in aggregation, and conditionals.
    fn route(&self, source: &str, outgoing: Outgoing, queue: &mut VecDeque<Queued>) {
        if let Some(target) = &outgoing.target {
            queue.push_back(Queued { destination: target.clone(), message: outgoing.payload });
            return;
        }
        for edge in self.workflow.outgoing_edges(source) {
            match edge {
                Edge::Direct { target, .. } => {
                    queue.push_back(Queued { destination: target.clone(), message: outgoing.payload.clone() });
                }
                Edge::FanOut { targets, selector, .. } => {
                    let chosen: Vec<String> = match selector {
                        Some(selector) => selector(&outgoing.payload, targets)
                            .into_iter()
                            .filter(|t| targets.contains(t))
                            .collect(),
                        None => targets.clone(),
                    };
                    for target in chosen {
                        queue.push_back(Queued { destination: target, message: outgoing.payload.clone() });
                    }
                }
                Edge::FanIn { .. } => {
                    // Aggregation is driven by the fan-in buffer, handled
                    // separately from this direct per-message routing pass.
                    self.buffer_fan_in(edge, source, outgoing.payload.clone(), queue);
                }
                Edge::Conditional { predicate, true_target, false_target, .. } => {
                    if predicate(&outgoing.payload) {
                        queue.push_back(Queued { destination: true_target.clone(), message: outgoing.payload.clone() });
                    } else if let Some(target) = false_target {
                        queue.push_back(Queued { destination: target.clone(), message: outgoing.payload.clone() });
                    }
                }
            }
        }
    }

    /// True if some (but not all) sources of a fan-in join have contributed,
    /// i.e. the join is blocked waiting on the rest rather than finished.
    fn has_partial_fan_in(&self) -> bool {
        let buffers = self.fan_in_buffers.lock().unwrap();
        buffers.values().any(|per_source| {
            let contributed = per_source.values().filter(|q| !q.is_empty()).count();
            contributed > 0 && contributed < per_source.len()
        })
    }

    fn buffer_fan_in(&self, edge: &Edge, source: &str, message: Message, queue: &mut VecDeque<Queued>) {
        let Edge::FanIn { sources, target, aggregator, overflow_depth } = edge else { return };
        let mut buffers = self.fan_in_buffers.lock().unwrap();
        let key = crate::edge::fan_in_key(sources);
        let entry = buffers.entry(key).or_insert_with(|| {
            sources.iter().map(|s| (s.clone(), VecDeque::new())).collect::<HashMap<_, _>>()
        });
        if let Some(per_source) = entry.get_mut(source) {
            if per_source.len() >= *overflow_depth {
                per_source.pop_front();
            }
            per_source.push_back(message);
        }
        if sources.iter().all(|s| entry.get(s).map(|q| !q.is_empty()).unwrap_or(false)) {
            let collected: Vec<Message> = sources
                .iter()
                .filter_map(|s| entry.get_mut(s).and_then(|q| q.pop_front()))
                .collect();
            let aggregated = aggregator(collected);
            queue.push_back(Queued { destination: target.clone(), message: aggregated });
        }
    }
}
