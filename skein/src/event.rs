//! Uniform event stream emitted during a run.
//!
//! One naming convention only (`ExecutorInvoked`/`ExecutorCompleted`/`ExecutorFailed`,
//! `WorkflowOutput`, not the `...Event`-suffixed or `Invoke`/`Invoked`-split
//! conventions the original mixed) — see DESIGN.md Open Question 1.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of a workflow run, carried by `Event::WorkflowStatus`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Running,
    Idle,
    AwaitingInput,
    Completed,
    Failed,
    Cancelled,
}

/// A single event on the run's event stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ExecutorInvoked {
        executor_id: String,
        message_type: String,
    },
    ExecutorCompleted {
        executor_id: String,
        output_summary: Option<Value>,
    },
    ExecutorFailed {
        executor_id: String,
        error_tag: String,
        message: String,
    },
    AgentRunUpdate {
        executor_id: String,
        chunk: String,
    },
    WorkflowOutput {
        source_id: String,
        payload: Value,
    },
    WorkflowStatus {
        state: WorkflowState,
    },
    RequestInfo {
        request_id: String,
        prompt: String,
        schema: Option<Value>,
        correlation_token: String,
    },
    CheckpointCreated {
        checkpoint_id: String,
        step: u64,
    },
}

impl Event {
    /// Critical events must never be dropped by a slow consumer; the event
    /// bus blocks the producer instead (see `event_bus::EventBus::publish`).
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Event::WorkflowOutput { .. }
                | Event::WorkflowStatus { .. }
                | Event::ExecutorFailed { .. }
                | Event::RequestInfo { .. }
        )
    }

    /// The executor id this event is about, when applicable.
    pub fn executor_id(&self) -> Option<&str> {
        match self {
            Event::ExecutorInvoked { executor_id, .. }
            | Event::ExecutorCompleted { executor_id, .. }
            | Event::ExecutorFailed { executor_id, .. }
            | Event::AgentRunUpdate { executor_id, .. } => Some(executor_id),
            Event::WorkflowOutput { source_id, .. } => Some(source_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_output_and_status_are_critical() {
        assert!(Event::WorkflowOutput { source_id: "a".into(), payload: Value::Null }.is_critical());
        assert!(Event::WorkflowStatus { state: WorkflowState::Idle }.is_critical());
        assert!(Event::RequestInfo {
            request_id: "r".into(),
            prompt: "p".into(),
            schema: None,
            correlation_token: "t".into()
        }
        .is_critical());
    }

    #[test]
    fn agent_run_update_is_not_critical() {
        assert!(!Event::AgentRunUpdate { executor_id: "a".into(), chunk: "x".into() }.is_critical());
    }

    #[test]
    fn serializes_with_snake_case_type_tag() {
        let ev = Event::ExecutorInvoked { executor_id: "a".into(), message_type: "Foo".into() };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "executor_invoked");
        assert_eq!(v["executor_id"], "a");
    }
}
