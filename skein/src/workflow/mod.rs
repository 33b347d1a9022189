//! The immutable `Workflow` graph snapshot: executors, edges, a designated
//! start, and the resume compatibility key (graph hash).

pub mod builder;
pub mod hash;
pub mod validate;

use std::collections::HashMap;
use std::sync::Arc;

pub use builder::WorkflowBuilder;
pub use validate::ValidationError;

use crate::checkpoint::CheckpointStorage;
use crate::edge::Edge;
use crate::executor::Executor;

/// An immutable graph of executors and edges with a designated start.
/// Shared (via `Arc<Workflow>`) by every in-flight `Runner` built from it.
pub struct Workflow {
    pub(crate) executors: HashMap<String, Arc<dyn Executor>>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) start: String,
    pub(crate) checkpoint_storage: Option<Arc<dyn CheckpointStorage>>,
    pub(crate) max_iterations: usize,
    pub(crate) strict_mode: bool,
    pub(crate) checkpoint_every_step: bool,
    pub(crate) graph_hash: u64,
}

impl Workflow {
    pub fn builder() -> WorkflowBuilder {
        WorkflowBuilder::new()
    }

    pub fn graph_hash(&self) -> u64 {
        self.graph_hash
    }

    pub fn start_id(&self) -> &str {
        &self.start
    }

    pub fn executor(&self, id: &str) -> Option<&Arc<dyn Executor>> {
        self.executors.get(id)
    }

    pub fn executor_ids(&self) -> impl Iterator<Item = &str> {
        self.executors.keys().map(String::as_str)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn outgoing_edges(&self, source_id: &str) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|e| e.sources().contains(&source_id))
            .collect()
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    pub fn checkpoint_every_step(&self) -> bool {
        self.checkpoint_every_step
    }

    pub fn checkpoint_storage(&self) -> Option<&Arc<dyn CheckpointStorage>> {
        self.checkpoint_storage.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorBuilder;

    #[test]
    fn outgoing_edges_includes_fan_in_when_source_participates() {
        let a = Arc::new(ExecutorBuilder::new("a").on::<String, _, _>(|_s, _ctx| async move { Ok(()) }).build());
        let b = Arc::new(ExecutorBuilder::new("b").on::<String, _, _>(|_s, _ctx| async move { Ok(()) }).build());
        let c = Arc::new(ExecutorBuilder::new("c").on::<Vec<crate::message::Message>, _, _>(|_s, _ctx| async move { Ok(()) }).build());
        let workflow = WorkflowBuilder::new()
            .add_executor(a)
            .add_executor(b)
            .add_executor(c)
            .start_with("a")
            .add_edge(Edge::direct("a", "b"))
            .add_edge(Edge::fan_in(
                vec!["a".into(), "b".into()],
                "c",
                std::sync::Arc::new(|mut msgs: Vec<crate::message::Message>| msgs.remove(0)),
            ))
            .build()
            .unwrap();

        assert_eq!(workflow.outgoing_edges("a").len(), 2);
    }
}
