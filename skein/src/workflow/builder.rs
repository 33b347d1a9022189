//! Assembles an immutable `Workflow` from executors and edges, supporting a
//! multi-edge-kind graph (direct, fan-out, fan-in, conditional, chain) rather
//! than a single linear/conditional walk.

use std::collections::HashMap;
use std::sync::Arc;

use crate::checkpoint::CheckpointStorage;
use crate::edge::Edge;
use crate::error::WorkflowError;
use crate::executor::Executor;
use crate::workflow::hash::compute_graph_hash;
use crate::workflow::validate::validate;
use crate::workflow::Workflow;

pub const DEFAULT_MAX_ITERATIONS: usize = 1000;

pub struct WorkflowBuilder {
    pub(crate) executors: HashMap<String, Arc<dyn Executor>>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) start: Option<String>,
    pub(crate) checkpoint_storage: Option<Arc<dyn CheckpointStorage>>,
    pub(crate) max_iterations: usize,
    pub(crate) strict_mode: bool,
    pub(crate) checkpoint_every_step: bool,
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
            edges: Vec::new(),
            start: None,
            checkpoint_storage: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            strict_mode: false,
            checkpoint_every_step: false,
        }
    }

    pub fn add_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executors.insert(executor.id().to_string(), executor);
        self
    }

    pub fn start_with(mut self, id: impl Into<String>) -> Self {
        self.start = Some(id.into());
        self
    }

    pub fn add_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Sugar: expands to Direct edges between each consecutive pair.
    pub fn chain(mut self, ids: &[&str]) -> Self {
        for pair in ids.windows(2) {
            self.edges.push(Edge::direct(pair[0], pair[1]));
        }
        self
    }

    pub fn checkpoint_storage(mut self, storage: Arc<dyn CheckpointStorage>) -> Self {
        self.checkpoint_storage = Some(storage);
        self
    }

    pub fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn strict_mode(mut self, enabled: bool) -> Self {
        self.strict_mode = enabled;
        self
    }

    pub fn checkpoint_every_step(mut self, enabled: bool) -> Self {
        self.checkpoint_every_step = enabled;
        self
    }

    pub fn build(self) -> Result<Workflow, WorkflowError> {
        validate(&self)?;
        let graph_hash = compute_graph_hash(&self.executors, &self.edges);
        Ok(Workflow {
            executors: self.executors,
            edges: self.edges,
            start: self.start.expect("validated: start is set"),
            checkpoint_storage: self.checkpoint_storage,
            max_iterations: self.max_iterations,
            strict_mode: self.strict_mode,
            checkpoint_every_step: self.checkpoint_every_step,
            graph_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorBuilder;

    #[test]
    fn build_succeeds_for_a_minimal_chain() {
        let a = Arc::new(ExecutorBuilder::new("a").on::<String, _, _>(|_s, _ctx| async move { Ok(()) }).build());
        let b = Arc::new(ExecutorBuilder::new("b").on::<String, _, _>(|_s, _ctx| async move { Ok(()) }).build());
        let workflow = WorkflowBuilder::new()
            .add_executor(a)
            .add_executor(b)
            .start_with("a")
            .chain(&["a", "b"])
            .build()
            .unwrap();
        assert_eq!(workflow.start_id(), "a");
        assert_eq!(workflow.edges.len(), 1);
    }

    #[test]
    fn build_fails_without_start() {
        let a = Arc::new(ExecutorBuilder::new("a").on::<String, _, _>(|_s, _ctx| async move { Ok(()) }).build());
        let err = WorkflowBuilder::new().add_executor(a).build().unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }
}
