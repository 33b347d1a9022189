//! Executor contract: typed message sinks with a per-type handler table.
//!
//! A message-typed sink with an arbitrary number of handlers, one per input
//! type, reflected for the builder's validation and the workflow's graph hash.

use std::any::TypeId;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::WorkflowError;
use crate::message::{AnyMessage, Message};
use crate::request_info::RequestHub;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Reflection of one registered handler: declared input type plus metadata
/// used by the builder's validation and the workflow's graph hash.
#[derive(Clone, Debug)]
pub struct HandlerDescriptor {
    pub input_type: TypeId,
    pub input_type_name: &'static str,
    pub output_type_names: Vec<&'static str>,
    pub may_yield_output: bool,
    pub registration_order: usize,
}

/// One message queued by a handler via `Context::send_message`.
#[derive(Clone)]
pub struct Outgoing {
    pub payload: Message,
    pub target: Option<String>,
}

/// Per-dispatch handle threaded through a handler invocation. Cheap to clone
/// (all state lives behind `Arc`), so it can be moved into an `async fn` by value.
#[derive(Clone)]
pub struct Context {
    executor_id: Arc<str>,
    outgoing: Arc<Mutex<Vec<Outgoing>>>,
    outputs: Arc<Mutex<Vec<Value>>>,
    request_hub: Arc<dyn RequestHub>,
    cancellation: CancellationToken,
}

impl Context {
    pub fn new(
        executor_id: impl Into<Arc<str>>,
        request_hub: Arc<dyn RequestHub>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            executor_id: executor_id.into(),
            outgoing: Arc::new(Mutex::new(Vec::new())),
            outputs: Arc::new(Mutex::new(Vec::new())),
            request_hub,
            cancellation,
        }
    }

    pub fn executor_id(&self) -> &str {
        &self.executor_id
    }

    /// Queues a message for delivery along this executor's outgoing edges.
    /// `target`, when set, addresses one specific downstream executor id
    /// instead of the edge's declared default routing.
    pub fn send_message<T: Send + Sync + 'static>(&self, payload: T, target: Option<&str>) {
        self.outgoing.lock().unwrap().push(Outgoing {
            payload: Message::new(payload),
            target: target.map(String::from),
        });
    }

    /// Re-queues an already-built `Outgoing`, e.g. after an orchestration
    /// pattern's wrapper executor rewrites a target the inner executor chose.
    pub fn push_outgoing(&self, outgoing: Outgoing) {
        self.outgoing.lock().unwrap().push(outgoing);
    }

    /// Records a final workflow output (`Event::WorkflowOutput`).
    pub fn yield_output(&self, payload: impl Serialize) {
        let value = serde_json::to_value(payload).unwrap_or(Value::Null);
        self.outputs.lock().unwrap().push(value);
    }

    /// Suspends the calling handler until a matching `ExternalInputResponse`
    /// arrives (directly, or via `Runner::send_response` after a resume).
    pub async fn request_input(
        &self,
        prompt: impl Into<String>,
        schema: Option<Value>,
    ) -> Result<crate::request_info::ExternalInputResponse, WorkflowError> {
        self.request_hub
            .request(self.executor_id.to_string(), prompt.into(), schema)
            .await
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Drains the messages a handler queued, in the order they were sent.
    pub fn take_outgoing(&self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outgoing.lock().unwrap())
    }

    /// Drains the outputs a handler yielded, in the order they were yielded.
    pub fn take_outputs(&self) -> Vec<Value> {
        std::mem::take(&mut self.outputs.lock().unwrap())
    }
}

/// A named, typed message sink with handlers and optional state.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Stable id, used for checkpoint matching and edge wiring.
    fn id(&self) -> &str;

    /// Reflection of this executor's registered handlers.
    fn handlers(&self) -> &[HandlerDescriptor];

    /// Dispatches one message to the handler registered for its type.
    async fn dispatch(&self, message: Message, ctx: Context) -> Result<(), WorkflowError>;

    /// Called once when the executor is bound into a `Workflow`.
    async fn on_bind(&self) {}

    /// Called when the owning `Runner` shuts down.
    async fn on_shutdown(&self) {}

    /// Opt-in checkpoint hook. Executors without state return `None`.
    fn serialize_state(&self) -> Option<Value> {
        None
    }

    /// Opt-in checkpoint hook, the inverse of `serialize_state`.
    async fn deserialize_state(&self, _state: Value) -> Result<(), WorkflowError> {
        Ok(())
    }

    /// Optional per-executor circuit breaker: after this many consecutive
    /// `HandlerError`s the workflow fails regardless of `continue_on_error`.
    fn max_consecutive_failures(&self) -> Option<u32> {
        None
    }
}

type HandlerFn = Arc<
    dyn Fn(Message, Context) -> BoxFuture<'static, Result<(), WorkflowError>> + Send + Sync,
>;

struct HandlerEntry {
    descriptor: HandlerDescriptor,
    handler: HandlerFn,
}

/// Builds a stateless `Executor` from `(input type, handler fn)` pairs —
/// the function-as-executor idiom the declarative loader also targets.
pub struct ExecutorBuilder {
    id: String,
    handlers: Vec<HandlerEntry>,
    catch_all: Option<HandlerEntry>,
    max_consecutive_failures: Option<u32>,
}

impl ExecutorBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            handlers: Vec::new(),
            catch_all: None,
            max_consecutive_failures: None,
        }
    }

    /// Registers a handler for exact message type `T`.
    ///
    /// # Panics
    /// Panics if a handler for `T` is already registered on this builder —
    /// "handler input type is uniquely resolvable" is a build-time invariant.
    pub fn on<T, F, Fut>(mut self, f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), WorkflowError>> + Send + 'static,
    {
        let type_id = TypeId::of::<T>();
        assert!(
            !self.handlers.iter().any(|h| h.descriptor.input_type == type_id),
            "executor '{}' already has a handler for {}",
            self.id,
            std::any::type_name::<T>()
        );
        let order = self.handlers.len();
        let descriptor = HandlerDescriptor {
            input_type: type_id,
            input_type_name: std::any::type_name::<T>(),
            output_type_names: Vec::new(),
            may_yield_output: true,
            registration_order: order,
        };
        let f = Arc::new(f);
        let handler: HandlerFn = Arc::new(move |msg: Message, ctx: Context| {
            let f = f.clone();
            Box::pin(async move {
                match msg.downcast::<T>() {
                    Ok(payload) => f(payload, ctx).await,
                    Err(_) => Err(WorkflowError::internal("handler type mismatch")),
                }
            })
        });
        self.handlers.push(HandlerEntry { descriptor, handler });
        self
    }

    /// Registers a catch-all handler, tried only when no exact-type handler
    /// matches the incoming message.
    pub fn on_any<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Message, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), WorkflowError>> + Send + 'static,
    {
        let descriptor = HandlerDescriptor {
            input_type: TypeId::of::<AnyMessage>(),
            input_type_name: "AnyMessage",
            output_type_names: Vec::new(),
            may_yield_output: true,
            registration_order: usize::MAX,
        };
        let handler: HandlerFn = Arc::new(move |msg: Message, ctx: Context| Box::pin(f(msg, ctx)));
        self.catch_all = Some(HandlerEntry { descriptor, handler });
        self
    }

    pub fn max_consecutive_failures(mut self, n: u32) -> Self {
        self.max_consecutive_failures = Some(n);
        self
    }

    pub fn build(self) -> FunctionExecutor {
        assert!(
            !self.handlers.is_empty() || self.catch_all.is_some(),
            "executor '{}' must register at least one handler",
            self.id
        );
        let mut by_type = HashMap::new();
        let mut descriptors = Vec::new();
        for entry in self.handlers {
            descriptors.push(entry.descriptor.clone());
            by_type.insert(entry.descriptor.input_type, entry.handler);
        }
        FunctionExecutor {
            id: self.id,
            descriptors,
            by_type,
            catch_all: self.catch_all,
            max_consecutive_failures: self.max_consecutive_failures,
        }
    }
}

/// The stateless `Executor` produced by `ExecutorBuilder::build`.
pub struct FunctionExecutor {
    id: String,
    descriptors: Vec<HandlerDescriptor>,
    by_type: HashMap<TypeId, HandlerFn>,
    catch_all: Option<HandlerEntry>,
    max_consecutive_failures: Option<u32>,
}

#[async_trait]
impl Executor for FunctionExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn handlers(&self) -> &[HandlerDescriptor] {
        &self.descriptors
    }

    async fn dispatch(&self, message: Message, ctx: Context) -> Result<(), WorkflowError> {
        if let Some(handler) = self.by_type.get(&message.type_id()) {
            return handler(message, ctx).await;
        }
        if let Some(catch_all) = &self.catch_all {
            return (catch_all.handler)(message, ctx).await;
        }
        Err(WorkflowError::UnknownMessage(message.type_name().to_string()))
    }

    fn max_consecutive_failures(&self) -> Option<u32> {
        self.max_consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request_info::NullRequestHub;

    fn test_context(id: &str) -> Context {
        Context::new(id, Arc::new(NullRequestHub), CancellationToken::new())
    }

    #[tokio::test]
    async fn dispatch_routes_to_matching_handler() {
        let exec = ExecutorBuilder::new("upper")
            .on::<String, _, _>(|s, ctx| async move {
                ctx.send_message(s.to_uppercase(), None);
                Ok(())
            })
            .build();
        let ctx = test_context("upper");
        exec.dispatch(Message::new("hi".to_string()), ctx.clone())
            .await
            .unwrap();
        let out = ctx.take_outgoing();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload.downcast_ref::<String>().unwrap(), "HI");
    }

    #[tokio::test]
    async fn unknown_message_without_catch_all_is_an_error() {
        let exec = ExecutorBuilder::new("typed")
            .on::<String, _, _>(|_s, _ctx| async move { Ok(()) })
            .build();
        let ctx = test_context("typed");
        let err = exec.dispatch(Message::new(7i32), ctx).await.unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownMessage(_)));
    }

    #[tokio::test]
    async fn catch_all_handler_used_when_no_exact_match() {
        let exec = ExecutorBuilder::new("any")
            .on::<String, _, _>(|_s, _ctx| async move { Ok(()) })
            .on_any(|msg, ctx| async move {
                ctx.send_message(msg.type_name().to_string(), None);
                Ok(())
            })
            .build();
        let ctx = test_context("any");
        exec.dispatch(Message::new(7i32), ctx.clone()).await.unwrap();
        assert_eq!(ctx.take_outgoing().len(), 1);
    }

    #[test]
    #[should_panic(expected = "already has a handler")]
    fn duplicate_handler_registration_panics() {
        ExecutorBuilder::new("dup")
            .on::<String, _, _>(|_s, _ctx| async move { Ok(()) })
            .on::<String, _, _>(|_s, _ctx| async move { Ok(()) });
    }
}
