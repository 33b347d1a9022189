//! skein: a workflow orchestration runtime for agent-based computations.
//!
//! Composes independently-authored executors (agents, functions, nested
//! workflows) into a directed graph that routes typed messages, runs
//! handlers concurrently, and exposes a uniform streaming event model.
//! Supports checkpointing and resuming in-flight runs, and suspending a
//! handler for human-in-the-loop external input.
//!
//! ## Main modules
//!
//! - [`executor`]: [`Executor`] trait, [`Context`], [`ExecutorBuilder`] — the
//!   typed-message-sink contract every node in a graph implements.
//! - [`message`]: [`Message`] — the type-erased envelope routed between executors.
//! - [`edge`]: [`Edge`] — direct, fan-out, fan-in, and conditional routing.
//! - [`workflow`]: [`Workflow`], [`WorkflowBuilder`] — the immutable graph snapshot.
//! - [`runner`]: [`Runner`], [`RunResult`] — drives one workflow instance.
//! - [`event`] / [`event_bus`]: [`Event`], [`EventBus`] — the streaming event model.
//! - [`checkpoint`]: [`CheckpointStorage`] and its file/memory/SQLite backends.
//! - [`request_info`]: [`RequestHub`], [`CorrelationTable`] — human-in-the-loop suspension.
//! - [`chat_client`]: [`ChatClient`] trait — the seam an agent executor calls through.
//! - [`agent_executor`]: [`AgentExecutor`] — wraps a `ChatClient` and tools into an `Executor`.
//! - [`tool`]: [`Tool`], [`FunctionToolHandler`] — locally-executed and provider-hosted tools.
//! - [`subworkflow`]: [`WorkflowExecutor`] — nests a child `Workflow` as an `Executor`.
//! - [`patterns`]: prebuilt recipes (sequential, concurrent, handoff, group-chat, Magentic).
//! - [`loader`]: [`Loader`] — parses a declarative YAML spec into a [`WorkflowBuilder`].
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//! use skein::{ExecutorBuilder, Runner, WorkflowBuilder};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let upper = Arc::new(
//!     ExecutorBuilder::new("upper")
//!         .on::<String, _, _>(|s, ctx| async move {
//!             ctx.yield_output(s.to_uppercase());
//!             Ok(())
//!         })
//!         .build(),
//! );
//! let workflow = WorkflowBuilder::new()
//!     .add_executor(upper)
//!     .start_with("upper")
//!     .build()
//!     .unwrap();
//! let runner = Runner::new(Arc::new(workflow));
//! let result = runner.run("hello".to_string()).await.unwrap();
//! assert_eq!(result.outputs, vec![serde_json::json!("HELLO")]);
//! # }
//! ```

pub mod agent_executor;
pub mod chat_client;
pub mod checkpoint;
pub mod edge;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod executor;
pub mod loader;
pub mod message;
pub mod observability;
pub mod patterns;
pub mod request_info;
pub mod runner;
pub mod subworkflow;
pub mod tool;
pub mod uuid6;
pub mod workflow;

pub use agent_executor::{AgentExecutor, AgentTurn};
pub use chat_client::{
    ChatClient, ChatClientError, ChatMessage, ChatOptions, ChatResponse, ChatResponseChunk,
    ChatRole, MockChatClient, ToolCall,
};
pub use checkpoint::{
    Checkpoint, CheckpointStorage, CheckpointSummary, FileCheckpointStorage,
    InMemoryCheckpointStorage, PendingMessage, SqliteCheckpointStorage,
};
pub use edge::Edge;
pub use error::WorkflowError;
pub use event::{Event, WorkflowState};
pub use event_bus::EventBus;
pub use executor::{Context, Executor, ExecutorBuilder, FunctionExecutor, HandlerDescriptor, Outgoing};
pub use loader::{LoadedWorkflow, Loader, LoaderError};
pub use message::Message;
pub use patterns::{
    concurrent, group_chat, handoff, magentic, sequential, DeterministicManager, GroupChatManager,
    GroupChatTurn, ManagerDecision, PlanningManager, ProgressLedger, PromptManager, TaskLedger,
};
pub use request_info::{
    request_info_executor, CorrelationTable, ExternalInputRequest, ExternalInputResponse,
    NullRequestHub, Request, RequestHub,
};
pub use runner::{RunResult, Runner};
pub use subworkflow::{ChildEvent, WorkflowExecutor};
pub use tool::{tools_requiring_approval, ApprovalMode, FunctionToolHandler, HostedToolKind, Tool};
pub use workflow::{ValidationError, Workflow, WorkflowBuilder};

/// Initializes `tracing` from `RUST_LOG` once per test binary so unit tests
/// across `src/**` can print spans with `--nocapture`.
#[cfg(test)]
mod test_logging {
    use ctor::ctor;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::Layer;

    #[ctor]
    fn init() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_test_writer().with_filter(filter))
            .try_init();
    }
}
