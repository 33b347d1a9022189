//! Graph hash: the resume compatibility key.
//!
//! Computed over a canonical, sorted string encoding so it is stable across
//! processes — never over pointer addresses or `HashMap` iteration order.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::edge::Edge;
use crate::executor::Executor;

pub fn compute_graph_hash(executors: &HashMap<String, Arc<dyn Executor>>, edges: &[Edge]) -> u64 {
    let mut exec_descriptors: Vec<String> = executors
        .values()
        .map(|exec| {
            let mut names: Vec<&str> = exec.handlers().iter().map(|h| h.input_type_name).collect();
            names.sort_unstable();
            format!("{}:{}", exec.id(), names.join(","))
        })
        .collect();
    exec_descriptors.sort();

    let mut edge_descriptors: Vec<String> = edges.iter().map(Edge::descriptor).collect();
    edge_descriptors.sort();

    let mut hasher = DefaultHasher::new();
    for d in &exec_descriptors {
        d.hash(&mut hasher);
    }
    "--edges--".hash(&mut hasher);
    for d in &edge_descriptors {
        d.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorBuilder;

    fn exec(id: &str) -> Arc<dyn Executor> {
        Arc::new(
            ExecutorBuilder::new(id)
                .on::<String, _, _>(|_s, _ctx| async move { Ok(()) })
                .build(),
        )
    }

    #[test]
    fn hash_is_idempotent_for_identical_graphs() {
        let mut execs = HashMap::new();
        execs.insert("a".to_string(), exec("a"));
        execs.insert("b".to_string(), exec("b"));
        let edges = vec![Edge::direct("a", "b")];

        let h1 = compute_graph_hash(&execs, &edges);
        let h2 = compute_graph_hash(&execs, &edges);
        assert_eq!(h1, h2);
    }

    #[test]
    fn hash_changes_when_an_edge_is_added() {
        let mut execs = HashMap::new();
        execs.insert("a".to_string(), exec("a"));
        execs.insert("b".to_string(), exec("b"));
        execs.insert("c".to_string(), exec("c"));

        let h1 = compute_graph_hash(&execs, &[Edge::direct("a", "b")]);
        let h2 = compute_graph_hash(&execs, &[Edge::direct("a", "b"), Edge::direct("b", "c")]);
        assert_ne!(h1, h2);
    }

    #[test]
    fn hash_is_insensitive_to_insertion_order() {
        let mut execs_a = HashMap::new();
        execs_a.insert("a".to_string(), exec("a"));
        execs_a.insert("b".to_string(), exec("b"));

        let mut execs_b = HashMap::new();
        execs_b.insert("b".to_string(), exec("b"));
        execs_b.insert("a".to_string(), exec("a"));

        let edges = vec![Edge::direct("a", "b")];
        assert_eq!(
            compute_graph_hash(&execs_a, &edges),
            compute_graph_hash(&execs_b, &edges)
        );
    }
}
