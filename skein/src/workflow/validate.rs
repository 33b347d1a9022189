//! Workflow builder validation: start-node check, dangling-edge check,
//! reachability, run over the multi-edge-kind graph.

use std::collections::{HashSet, VecDeque};

use thiserror::Error;

use crate::edge::Edge;
use crate::workflow::builder::WorkflowBuilder;

/// Sub-reasons reported under the `ValidationError` taxonomy tag.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("no start executor was set")]
    MissingStart,
    #[error("start executor '{0}' is not a registered executor")]
    StartNotFound(String),
    #[error("edge references unregistered executor '{0}'")]
    NodeNotFound(String),
    #[error("fan-in edge has no sources")]
    FanInEmptySources,
    #[error("fan-in edge has duplicate source '{0}'")]
    FanInDuplicateSource(String),
    #[error("duplicate edge: {0}")]
    DuplicateEdge(String),
}

pub fn validate(builder: &WorkflowBuilder) -> Result<(), ValidationError> {
    check_start(builder)?;
    check_edge_endpoints(builder)?;
    check_fan_in_sources(builder)?;
    check_duplicate_edges(builder)?;
    warn_unreachable(builder);
    warn_type_mismatches(builder);
    Ok(())
}

fn check_start(builder: &WorkflowBuilder) -> Result<(), ValidationError> {
    let start = builder.start.as_ref().ok_or(ValidationError::MissingStart)?;
    if !builder.executors.contains_key(start) {
        return Err(ValidationError::StartNotFound(start.clone()));
    }
    Ok(())
}

fn check_edge_endpoints(builder: &WorkflowBuilder) -> Result<(), ValidationError> {
    for edge in &builder.edges {
        for id in edge.sources().into_iter().chain(edge.targets()) {
            if !builder.executors.contains_key(id) {
                return Err(ValidationError::NodeNotFound(id.to_string()));
            }
        }
    }
    Ok(())
}

fn check_fan_in_sources(builder: &WorkflowBuilder) -> Result<(), ValidationError> {
    for edge in &builder.edges {
        if let Edge::FanIn { sources, .. } = edge {
            if sources.is_empty() {
                return Err(ValidationError::FanInEmptySources);
            }
            let mut seen = HashSet::new();
            for s in sources {
                if !seen.insert(s) {
                    return Err(ValidationError::FanInDuplicateSource(s.clone()));
                }
            }
        }
    }
    Ok(())
}

fn check_duplicate_edges(builder: &WorkflowBuilder) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for edge in &builder.edges {
        let descriptor = edge.descriptor();
        if !seen.insert(descriptor.clone()) {
            return Err(ValidationError::DuplicateEdge(descriptor));
        }
    }
    Ok(())
}

/// Unreachable non-start executors are a warning: a declarative spec may
/// register executors wired in by a later `add_edge` call in another module.
fn warn_unreachable(builder: &WorkflowBuilder) {
    let Some(start) = &builder.start else { return };
    let mut reachable: HashSet<&str> = HashSet::new();
    reachable.insert(start.as_str());
    let mut queue: VecDeque<&str> = VecDeque::new();
    queue.push_back(start.as_str());

    while let Some(id) = queue.pop_front() {
        for edge in &builder.edges {
            // A FanIn is reachable once any one of its sources is reachable.
            if edge.sources().contains(&id) {
                for target in edge.targets() {
                    if reachable.insert(target) {
                        queue.push_back(target);
                    }
                }
            }
        }
    }

    for id in builder.executors.keys() {
        if id != start && !reachable.contains(id.as_str()) {
            tracing::warn!(executor_id = %id, "executor is unreachable from the start executor");
        }
    }
}

/// Type compatibility is a warning only — dynamic JSON payloads routed
/// through the declarative loader are always considered assignable.
fn warn_type_mismatches(builder: &WorkflowBuilder) {
    for edge in &builder.edges {
        for source_id in edge.sources() {
            let Some(source) = builder.executors.get(source_id) else { continue };
            let source_outputs: HashSet<&str> = source
                .handlers()
                .iter()
                .flat_map(|h| h.output_type_names.iter().copied())
                .collect();
            if source_outputs.is_empty() {
                // The source never declared its output types; nothing to check.
                continue;
            }
            for target_id in edge.targets() {
                let Some(target) = builder.executors.get(target_id) else { continue };
                let target_inputs: HashSet<&str> =
                    target.handlers().iter().map(|h| h.input_type_name).collect();
                if source_outputs.is_disjoint(&target_inputs) {
                    tracing::warn!(
                        source = %source_id,
                        target = %target_id,
                        "edge's source output types and target input types may be incompatible"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorBuilder;
    use std::sync::Arc;

    fn builder_with(ids: &[&str]) -> WorkflowBuilder {
        let mut b = WorkflowBuilder::new();
        for id in ids {
            b = b.add_executor(Arc::new(
                ExecutorBuilder::new(*id)
                    .on::<String, _, _>(|_s, _ctx| async move { Ok(()) })
                    .build(),
            ));
        }
        b
    }

    #[test]
    fn missing_start_is_an_error() {
        let b = builder_with(&["a"]);
        assert!(matches!(validate(&b), Err(ValidationError::MissingStart)));
    }

    #[test]
    fn dangling_edge_target_is_an_error() {
        let b = builder_with(&["a"]).start_with("a").add_edge(Edge::direct("a", "missing"));
        assert!(matches!(validate(&b), Err(ValidationError::NodeNotFound(_))));
    }

    #[test]
    fn duplicate_edges_are_rejected() {
        let b = builder_with(&["a", "b"])
            .start_with("a")
            .add_edge(Edge::direct("a", "b"))
            .add_edge(Edge::direct("a", "b"));
        assert!(matches!(validate(&b), Err(ValidationError::DuplicateEdge(_))));
    }

    #[test]
    fn fan_in_with_duplicate_source_is_rejected() {
        let b = builder_with(&["a", "b", "c"]).start_with("a").add_edge(Edge::fan_in(
            vec!["a".into(), "a".into()],
            "c",
            Arc::new(|mut msgs: Vec<crate::message::Message>| msgs.remove(0)),
        ));
        assert!(matches!(validate(&b), Err(ValidationError::FanInDuplicateSource(_))));
    }

    #[test]
    fn valid_graph_passes() {
        let b = builder_with(&["a", "b"]).start_with("a").add_edge(Edge::direct("a", "b"));
        assert!(validate(&b).is_ok());
    }
}
