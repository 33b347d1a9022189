//! Sub-workflow executor: wraps a child `Workflow` as an `Executor`,
//! forwarding the child's outputs and HITL requests to the parent.
//! Envelope-wraps child events with the child workflow's id, the same way
//! a session/node envelope tags protocol events with originating context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::WorkflowError;
use crate::event::Event;
use crate::executor::{Context, Executor, HandlerDescriptor};
use crate::message::Message;
use crate::runner::Runner;
use crate::workflow::Workflow;

/// A child workflow's event, tagged with the child's id so a parent caller
/// can address it by a compound correlation token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChildEvent {
    pub child_workflow_id: String,
    pub inner: Event,
}

impl ChildEvent {
    /// Compound correlation token for a `RequestInfo` raised by the child:
    /// `"{child_workflow_id}:{request_id}"`.
    pub fn correlation_token(&self) -> Option<String> {
        match &self.inner {
            Event::RequestInfo { request_id, .. } => {
                Some(format!("{}:{request_id}", self.child_workflow_id))
            }
            _ => None,
        }
    }
}

/// Wraps a child `Workflow` as a single-handler `Executor`. The handler's
/// declared input type mirrors the child's start executor's first handler.
pub struct WorkflowExecutor {
    id: String,
    child_workflow_id: String,
    child: Arc<Workflow>,
    descriptors: Vec<HandlerDescriptor>,
    reuse_child_runner: bool,
    runner: Mutex<Option<Arc<Runner>>>,
    deferred_child_output: AtomicBool,
}

impl WorkflowExecutor {
    pub fn new(id: impl Into<String>, child_workflow_id: impl Into<String>, child: Arc<Workflow>) -> Self {
        let descriptors = child
            .executor(child.start_id())
            .map(|e| e.handlers().to_vec())
            .unwrap_or_default();
        Self {
            id: id.into(),
            child_workflow_id: child_workflow_id.into(),
            child,
            descriptors,
            reuse_child_runner: false,
            runner: Mutex::new(None),
            deferred_child_output: AtomicBool::new(false),
        }
    }

    pub fn reuse_child_runner(mut self, enabled: bool) -> Self {
        self.reuse_child_runner = enabled;
        self
    }

    async fn runner_for(&self) -> Arc<Runner> {
        if self.reuse_child_runner {
            let mut slot = self.runner.lock().await;
            if slot.is_none() {
                *slot = Some(Arc::new(Runner::new(self.child.clone())));
            }
            return slot.as_ref().unwrap().clone();
        }
        Arc::new(Runner::new(self.child.clone()))
    }
}

#[async_trait]
impl Executor for WorkflowExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn handlers(&self) -> &[HandlerDescriptor] {
        &self.descriptors
    }

    async fn dispatch(&self, message: Message, ctx: Context) -> Result<(), WorkflowError> {
        let runner = self.runner_for().await;
        let mut child_events = Box::pin(runner.event_bus().subscribe());
        let child_workflow_id = self.child_workflow_id.clone();

        let input_json = message.to_json().unwrap_or(Value::Null);
        let drive = runner.run(input_json);
        tokio::pin!(drive);

        let result = loop {
            tokio::select! {
                biased;
                result = &mut drive => break result,
                Some(event) = child_events.next() => {
                    forward_child_event(&ctx, &child_workflow_id, event);
                }
            }
        };

        match result {
            Ok(run_result) => {
                for output in run_result.outputs {
                    ctx.send_message(output, None);
                }
                Ok(())
            }
            Err(err) => Err(WorkflowError::handler(self.id.clone(), ChildError(err.to_string(), err.error_tag()))),
        }
    }

    fn serialize_state(&self) -> Option<Value> {
        None
    }
}

/// Surfaces one child event to the parent as an outgoing `ChildEvent`
/// message; a parent-level `RequestInfoExecutor` or caller can pattern-match
/// `Event::RequestInfo` out of `inner` and address it by `correlation_token`.
fn forward_child_event(ctx: &Context, child_workflow_id: &str, event: Event) {
    let wrapped = ChildEvent { child_workflow_id: child_workflow_id.to_string(), inner: event };
    ctx.send_message(wrapped, None);
}

#[derive(Debug)]
struct ChildError(String, &'static str);

impl std::fmt::Display for ChildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.1, self.0)
    }
}

impl std::error::Error for ChildError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorBuilder;
    use crate::request_info::NullRequestHub;
    use crate::workflow::WorkflowBuilder;
    use tokio_util::sync::CancellationToken;

    fn child_workflow() -> Arc<Workflow> {
        let echo = Arc::new(
            ExecutorBuilder::new("echo")
                .on::<Value, _, _>(|v, ctx| async move {
                    ctx.yield_output((*v).clone());
                    Ok(())
                })
                .build(),
        );
        Arc::new(WorkflowBuilder::new().add_executor(echo).start_with("echo").build().unwrap())
    }

    #[tokio::test]
    async fn dispatch_forwards_child_output_as_outgoing_message() {
        let wrapper = WorkflowExecutor::new("child_wrapper", "child-1", child_workflow());
        let ctx = Context::new("child_wrapper", Arc::new(NullRequestHub), CancellationToken::new());
        wrapper
            .dispatch(Message::new(serde_json::json!("hello")), ctx.clone())
            .await
            .unwrap();
        let outgoing = ctx.take_outgoing();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(
            outgoing[0].payload.downcast_ref::<Value>().unwrap(),
            &serde_json::json!("hello")
        );
    }
}
