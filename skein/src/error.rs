//! Workflow error taxonomy.
//!
//! One enum, one `error_tag()` accessor, matching the tag table used when an
//! error is surfaced onto the event stream as `ExecutorFailed`.

use thiserror::Error;

/// Errors raised by the workflow runtime (builder, runner, checkpoint layer).
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A user handler returned `Err`.
    #[error("handler error in {executor_id}: {source}")]
    Handler {
        executor_id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Graph or declarative spec failed validation; the workflow never runs.
    #[error("validation error: {0}")]
    Validation(#[from] crate::workflow::ValidationError),

    /// Checkpoint's graph hash does not match the current graph.
    #[error("graph hash mismatch: checkpoint was taken against {expected:x}, current graph is {actual:x}")]
    GraphMismatch { expected: u64, actual: u64 },

    /// No handler matched a message type and `strict_mode` is enabled.
    #[error("no handler for message type {0} (strict mode)")]
    UnknownMessage(String),

    /// `max_iterations` exceeded.
    #[error("iteration cap of {0} exceeded")]
    IterationCap(usize),

    /// Caller cancelled the run (or imposed an external-input timeout).
    #[error("run cancelled")]
    Cancelled,

    /// Underlying chat-client call failed inside an agent executor.
    #[error("chat client error: {0}")]
    ChatClient(String),

    /// A HITL approval request was denied.
    #[error("tool approval denied for {0}")]
    ToolApprovalDenied(String),

    /// State could not be (de)serialized for a checkpoint.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An `ExternalInputResponse` arrived for a request id with no matching entry.
    #[error("no pending request for correlation id {0}")]
    UnknownRequestId(String),

    /// Checkpoint storage failed (I/O, SQLite, etc).
    #[error("checkpoint storage error: {0}")]
    Storage(String),

    /// The declarative YAML loader rejected a spec (parse error, unknown
    /// registry name, duplicate node id, unresolved sub-workflow cycle).
    #[error("loader error: {0}")]
    Loader(#[from] crate::loader::LoaderError),

    /// Catch-all for invariants that should not be reachable through the public API.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    pub fn handler(executor_id: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Handler {
            executor_id: executor_id.into(),
            source: Box::new(source),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable tag used when this error is serialized onto the event stream.
    pub fn error_tag(&self) -> &'static str {
        match self {
            WorkflowError::Handler { .. } => "HandlerError",
            WorkflowError::Validation(_) => "ValidationError",
            WorkflowError::GraphMismatch { .. } => "GraphMismatch",
            WorkflowError::UnknownMessage(_) => "UnknownMessage",
            WorkflowError::IterationCap(_) => "IterationCap",
            WorkflowError::Cancelled => "ExternalInputTimeout",
            WorkflowError::ChatClient(_) => "ChatClientError",
            WorkflowError::ToolApprovalDenied(_) => "ToolApprovalDenied",
            WorkflowError::Serialization(_) => "SerializationError",
            WorkflowError::UnknownRequestId(_) => "HandlerError",
            WorkflowError::Storage(_) => "SerializationError",
            WorkflowError::Loader(_) => "LoaderError",
            WorkflowError::Internal(_) => "HandlerError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_tag_matches_taxonomy_table() {
        assert_eq!(WorkflowError::IterationCap(10).error_tag(), "IterationCap");
        assert_eq!(
            WorkflowError::GraphMismatch { expected: 1, actual: 2 }.error_tag(),
            "GraphMismatch"
        );
        assert_eq!(WorkflowError::Cancelled.error_tag(), "ExternalInputTimeout");
    }

    #[test]
    fn handler_error_display_includes_executor_id() {
        let err = WorkflowError::handler("echo", std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(err.to_string().contains("echo"));
    }
}
