//! Structured logging for run execution: free functions emitting
//! per-executor, per-step events on a `Runner`.

use crate::error::WorkflowError;

pub fn log_run_start(workflow_id: &str) {
    tracing::info!(workflow_id, "starting workflow run");
}

pub fn log_run_complete(workflow_id: &str, step_count: u64) {
    tracing::info!(workflow_id, step_count, "workflow run complete");
}

pub fn log_run_cancelled(workflow_id: &str, step_count: u64) {
    tracing::warn!(workflow_id, step_count, "workflow run cancelled");
}

pub fn log_run_error(workflow_id: &str, error: &WorkflowError) {
    tracing::error!(workflow_id, error_tag = error.error_tag(), %error, "workflow run failed");
}

pub fn log_executor_invoked(executor_id: &str, message_type: &str) {
    tracing::debug!(executor_id, message_type, "dispatching to executor");
}

pub fn log_executor_completed(executor_id: &str) {
    tracing::debug!(executor_id, "executor completed");
}

pub fn log_executor_failed(executor_id: &str, error: &WorkflowError) {
    tracing::warn!(executor_id, error_tag = error.error_tag(), %error, "executor failed");
}

pub fn log_checkpoint_created(checkpoint_id: &str, step: u64) {
    tracing::info!(checkpoint_id, step, "checkpoint created");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_helpers_do_not_panic() {
        log_run_start("wf-1");
        log_run_complete("wf-1", 3);
        log_run_cancelled("wf-1", 2);
        log_executor_invoked("a", "String");
        log_executor_completed("a");
        log_executor_failed("a", &WorkflowError::internal("boom"));
        log_run_error("wf-1", &WorkflowError::IterationCap(10));
        log_checkpoint_created("ckpt-1", 4);
    }
}
