//! Edge variants: direct, fan-out (optional selector), fan-in (buffered
//! aggregation), conditional: four independently-typed routing rules rather
//! than a single `Next`-routed edge.

use std::sync::Arc;

use crate::message::Message;

/// Fixed, non-printable separator unlikely to appear in a user-chosen executor id.
pub const ID_SEPARATOR: char = '\u{1}';

/// Canonical id for a direct/conditional edge: `source <SEP> target`.
pub fn edge_id(source: &str, target: &str) -> String {
    format!("{source}{ID_SEPARATOR}{target}")
}

/// Canonical key for a fan-in edge: its sorted source ids joined by the separator.
pub fn fan_in_key(sources: &[String]) -> String {
    let mut sorted: Vec<&str> = sources.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(&ID_SEPARATOR.to_string())
}

/// Chooses the subset of `targets` a fan-out message should reach.
/// Must return a subset of `targets` — the edge intersects the result
/// with the declared target list, so a buggy selector cannot address
/// an unwired executor.
pub type FanOutSelector = Arc<dyn Fn(&Message, &[String]) -> Vec<String> + Send + Sync>;

/// Combines one buffered message per source into the message delivered to
/// a fan-in's target, in source-declaration order.
pub type FanInAggregator = Arc<dyn Fn(Vec<Message>) -> Message + Send + Sync>;

/// A pure routing predicate for a conditional edge. Receives only `&Message`
/// (no `Context`) so it cannot have side effects.
pub type ConditionalPredicate = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// A typed routing rule from a source executor to one or more targets.
#[derive(Clone)]
pub enum Edge {
    Direct {
        source: String,
        target: String,
    },
    FanOut {
        source: String,
        targets: Vec<String>,
        selector: Option<FanOutSelector>,
    },
    FanIn {
        sources: Vec<String>,
        target: String,
        aggregator: FanInAggregator,
        /// Bounded per-source overflow depth when a source sends a second
        /// message before the round closes (DESIGN.md Open Question 2).
        overflow_depth: usize,
    },
    Conditional {
        source: String,
        predicate: ConditionalPredicate,
        true_target: String,
        false_target: Option<String>,
    },
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Direct { source, target } => {
                f.debug_struct("Direct").field("source", source).field("target", target).finish()
            }
            Edge::FanOut { source, targets, .. } => f
                .debug_struct("FanOut")
                .field("source", source)
                .field("targets", targets)
                .finish(),
            Edge::FanIn { sources, target, .. } => f
                .debug_struct("FanIn")
                .field("sources", sources)
                .field("target", target)
                .finish(),
            Edge::Conditional { source, true_target, false_target, .. } => f
                .debug_struct("Conditional")
                .field("source", source)
                .field("true_target", true_target)
                .field("false_target", false_target)
                .finish(),
        }
    }
}

const DEFAULT_FAN_IN_OVERFLOW_DEPTH: usize = 16;

impl Edge {
    pub fn direct(source: impl Into<String>, target: impl Into<String>) -> Self {
        Edge::Direct { source: source.into(), target: target.into() }
    }

    pub fn fan_out(source: impl Into<String>, targets: Vec<String>) -> Self {
        Edge::FanOut { source: source.into(), targets, selector: None }
    }

    pub fn fan_out_with_selector(
        source: impl Into<String>,
        targets: Vec<String>,
        selector: FanOutSelector,
    ) -> Self {
        Edge::FanOut { source: source.into(), targets, selector: Some(selector) }
    }

    pub fn fan_in(sources: Vec<String>, target: impl Into<String>, aggregator: FanInAggregator) -> Self {
        Edge::FanIn {
            sources,
            target: target.into(),
            aggregator,
            overflow_depth: DEFAULT_FAN_IN_OVERFLOW_DEPTH,
        }
    }

    pub fn fan_in_with_overflow_depth(
        sources: Vec<String>,
        target: impl Into<String>,
        aggregator: FanInAggregator,
        overflow_depth: usize,
    ) -> Self {
        Edge::FanIn { sources, target: target.into(), aggregator, overflow_depth }
    }

    pub fn conditional(
        source: impl Into<String>,
        predicate: ConditionalPredicate,
        true_target: impl Into<String>,
        false_target: Option<String>,
    ) -> Self {
        Edge::Conditional {
            source: source.into(),
            predicate,
            true_target: true_target.into(),
            false_target,
        }
    }

    /// Source executor ids this edge reads from.
    pub fn sources(&self) -> Vec<&str> {
        match self {
            Edge::Direct { source, .. }
            | Edge::FanOut { source, .. }
            | Edge::Conditional { source, .. } => vec![source.as_str()],
            Edge::FanIn { sources, .. } => sources.iter().map(String::as_str).collect(),
        }
    }

    /// Target executor ids this edge can deliver to.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Edge::Direct { target, .. } => vec![target.as_str()],
            Edge::FanOut { targets, .. } => targets.iter().map(String::as_str).collect(),
            Edge::FanIn { target, .. } => vec![target.as_str()],
            Edge::Conditional { true_target, false_target, .. } => {
                let mut t = vec![true_target.as_str()];
                if let Some(f) = false_target {
                    t.push(f.as_str());
                }
                t
            }
        }
    }

    /// Stable descriptor used only by the graph hash (closures are not hashed).
    pub fn descriptor(&self) -> String {
        match self {
            Edge::Direct { source, target } => format!("direct:{source}>{target}"),
            Edge::FanOut { source, targets, .. } => {
                let mut t = targets.clone();
                t.sort();
                format!("fan_out:{source}>{}", t.join(","))
            }
            Edge::FanIn { sources, target, .. } => {
                format!("fan_in:{}>{target}", fan_in_key(sources))
            }
            Edge::Conditional { source, true_target, false_target, .. } => format!(
                "conditional:{source}>{true_target}|{}",
                false_target.as_deref().unwrap_or("")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_in_key_is_order_independent() {
        let a = fan_in_key(&["b".to_string(), "a".to_string()]);
        let b = fan_in_key(&["a".to_string(), "b".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn descriptor_sorts_fan_out_targets_for_stability() {
        let e1 = Edge::fan_out("src", vec!["b".into(), "a".into()]);
        let e2 = Edge::fan_out("src", vec!["a".into(), "b".into()]);
        assert_eq!(e1.descriptor(), e2.descriptor());
    }

    #[test]
    fn conditional_targets_include_false_branch_when_present() {
        let cond = Edge::conditional(
            "src",
            Arc::new(|_m: &Message| true),
            "yes",
            Some("no".to_string()),
        );
        assert_eq!(cond.targets(), vec!["yes", "no"]);
    }

    #[test]
    fn conditional_targets_omit_false_branch_when_absent() {
        let cond = Edge::conditional("src", Arc::new(|_m: &Message| true), "yes", None);
        assert_eq!(cond.targets(), vec!["yes"]);
    }
}
