//! Declarative YAML loader: parses a document with top-level keys
//! `kind`, `name`, `description`, `nodes`, `edges`, `variables` into a
//! [`WorkflowBuilder`]. Node kinds: `agent`, `function`, `sub-workflow`,
//! `request-info`, `set-variable`. Edge kinds mirror [`crate::edge::Edge`]:
//! `direct`, `fan-out`, `fan-in`, `conditional`, plus the `chain` sugar also
//! available to hand-written builders.
//!
//! The loader never constructs a `ChatClient`, tool handler, or function body
//! itself — those are resolved by name against caller-supplied registries
//! (see [`registry`]). It validates the document (via [`WorkflowBuilder::build`]'s
//! own validation) before handing the graph to the builder; it does not run
//! anything itself.

pub mod condition;
pub mod registry;
pub mod variables;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::agent_executor::{run_turn, AgentTurn};
use crate::chat_client::ChatOptions;
use crate::edge::{Edge, FanInAggregator};
use crate::error::WorkflowError;
use crate::executor::{Context, Executor, ExecutorBuilder};
use crate::message::Message;
use crate::subworkflow::WorkflowExecutor;
use crate::workflow::WorkflowBuilder;

pub use condition::ConditionError;
pub use registry::{AgentRegistry, FunctionRegistry, MapAgentRegistry, MapFunctionRegistry, MapSelectorRegistry, SelectorRegistry};
pub use variables::VariableScope;

const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("read '{0}': {1}")]
    Io(String, #[source] std::io::Error),
    #[error("no nodes declared")]
    EmptyGraph,
    #[error("node '{0}': missing required field '{1}'")]
    MissingField(String, &'static str),
    #[error("edge: missing required field '{0}'")]
    MissingEdgeField(&'static str),
    #[error("node '{0}': unknown kind '{1}'")]
    UnknownNodeKind(String, String),
    #[error("edge: unknown kind '{0}'")]
    UnknownEdgeKind(String),
    #[error("node '{0}': unresolved {1} '{2}'")]
    UnresolvedBinding(String, &'static str, String),
    #[error("edge from '{0}': unresolved selector '{1}'")]
    UnresolvedSelector(String, String),
    #[error("edge condition: {0}")]
    Condition(#[from] ConditionError),
    #[error("sub-workflow node '{0}': {1}")]
    SubWorkflow(String, Box<LoaderError>),
    #[error("build: {0}")]
    Build(#[from] WorkflowError),
}

#[derive(Debug, Deserialize)]
struct WorkflowSpec {
    #[allow(dead_code)]
    kind: Option<String>,
    #[allow(dead_code)]
    name: Option<String>,
    #[allow(dead_code)]
    #[serde(default)]
    description: String,
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    variables: HashMap<String, Value>,
    nodes: Vec<NodeSpec>,
    #[serde(default)]
    edges: Vec<EdgeSpec>,
}

#[derive(Debug, Deserialize)]
struct NodeSpec {
    id: String,
    kind: String,
    #[serde(default)]
    chat_client: Option<String>,
    #[serde(default)]
    instructions: Option<String>,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    max_tool_rounds: Option<usize>,
    #[serde(default)]
    function: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    reuse_child_runner: Option<bool>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    schema: Option<Value>,
    #[serde(default)]
    variable: Option<String>,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    from_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EdgeSpec {
    kind: String,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    targets: Vec<String>,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    overflow_depth: Option<usize>,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    true_target: Option<String>,
    #[serde(default)]
    false_target: Option<String>,
    #[serde(default)]
    nodes: Vec<String>,
}

enum BuiltEdge {
    Single(Edge),
    Chain(Vec<String>),
}

/// Result of loading one YAML document: the builder, ready for `.build()`
/// (or further hand-written customization such as `.checkpoint_storage`),
/// plus the ambient variable scope the graph's `conditional` edges and
/// `set-variable` nodes share for the lifetime of one run.
pub struct LoadedWorkflow {
    pub builder: WorkflowBuilder,
    pub variables: Arc<VariableScope>,
}

/// Resolves YAML-named bindings (`chat_client`, `tool`, `function`,
/// `selector` names) against caller-supplied registries and turns the
/// result into a [`WorkflowBuilder`].
pub struct Loader {
    agents: Arc<dyn AgentRegistry>,
    functions: Arc<dyn FunctionRegistry>,
    selectors: Arc<dyn SelectorRegistry>,
}

impl Loader {
    pub fn new(
        agents: Arc<dyn AgentRegistry>,
        functions: Arc<dyn FunctionRegistry>,
        selectors: Arc<dyn SelectorRegistry>,
    ) -> Self {
        Self { agents, functions, selectors }
    }

    /// Loads a YAML document with no filesystem context. `sub-workflow`
    /// nodes' `path` is resolved relative to the current directory.
    pub fn load_str(&self, yaml: &str) -> Result<LoadedWorkflow, LoaderError> {
        self.load_in_dir(yaml, Path::new("."))
    }

    /// Loads a YAML document from disk. `sub-workflow` nodes' `path` is
    /// resolved relative to this file's parent directory.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<LoadedWorkflow, LoaderError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| LoaderError::Io(path.display().to_string(), e))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        self.load_in_dir(&yaml, &base_dir)
    }

    fn load_in_dir(&self, yaml: &str, base_dir: &Path) -> Result<LoadedWorkflow, LoaderError> {
        let spec: WorkflowSpec = serde_yaml::from_str(yaml)?;
        if spec.nodes.is_empty() {
            return Err(LoaderError::EmptyGraph);
        }
        let vars = Arc::new(VariableScope::new(spec.variables.clone()));
        let ids_with_outgoing = ids_with_outgoing_edges(&spec.edges);

        let mut builder = WorkflowBuilder::new();
        for node in &spec.nodes {
            let is_terminal = !ids_with_outgoing.contains(&node.id);
            let executor = self.build_node(node, base_dir, &vars, is_terminal)?;
            builder = builder.add_executor(executor);
        }

        let start = spec.start.clone().unwrap_or_else(|| spec.nodes[0].id.clone());
        builder = builder.start_with(start);

        for edge in &spec.edges {
            match self.build_edge(edge, &vars)? {
                BuiltEdge::Single(e) => builder = builder.add_edge(e),
                BuiltEdge::Chain(ids) => {
                    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
                    builder = builder.chain(&refs);
                }
            }
        }

        Ok(LoadedWorkflow { builder, variables: vars })
    }

    fn build_node(
        &self,
        node: &NodeSpec,
        base_dir: &Path,
        vars: &Arc<VariableScope>,
        is_terminal: bool,
    ) -> Result<Arc<dyn Executor>, LoaderError> {
        match node.kind.as_str() {
            "agent" => self.build_agent_node(node, is_terminal),
            "function" => self.build_function_node(node, is_terminal),
            "sub-workflow" => self.build_subworkflow_node(node, base_dir),
            "request-info" => Ok(build_request_info_node(node, is_terminal)),
            "set-variable" => Ok(build_set_variable_node(node, vars.clone(), is_terminal)),
            other => Err(LoaderError::UnknownNodeKind(node.id.clone(), other.to_string())),
        }
    }

    fn build_agent_node(&self, node: &NodeSpec, is_terminal: bool) -> Result<Arc<dyn Executor>, LoaderError> {
        let client_name = node
            .chat_client
            .clone()
            .ok_or_else(|| LoaderError::MissingField(node.id.clone(), "chat_client"))?;
        let chat_client = self
            .agents
            .chat_client(&client_name)
            .ok_or_else(|| LoaderError::UnresolvedBinding(node.id.clone(), "chat_client", client_name.clone()))?;

        let mut tools = Vec::new();
        for name in &node.tools {
            let tool = self
                .agents
                .tool(name)
                .ok_or_else(|| LoaderError::UnresolvedBinding(node.id.clone(), "tool", name.clone()))?;
            tools.push(tool);
        }

        let options = ChatOptions {
            tools: if tools.is_empty() { None } else { Some(tools.clone()) },
            instructions: node.instructions.clone(),
            ..Default::default()
        };
        let max_rounds = node.max_tool_rounds.unwrap_or(DEFAULT_MAX_TOOL_ROUNDS).max(1);

        let executor = ExecutorBuilder::new(node.id.clone())
            .on::<Value, _, _>(move |payload: Arc<Value>, ctx: Context| {
                let chat_client = chat_client.clone();
                let options = options.clone();
                let tools = tools.clone();
                async move {
                    let turn = value_to_agent_turn(&payload);
                    let result = run_turn(&chat_client, &options, &tools, max_rounds, turn, &ctx).await?;
                    let out = agent_turn_to_value(&result);
                    if is_terminal {
                        ctx.yield_output(out.clone());
                    }
                    ctx.send_message(out, None);
                    Ok(())
                }
            })
            .build();
        Ok(Arc::new(executor))
    }

    fn build_function_node(&self, node: &NodeSpec, is_terminal: bool) -> Result<Arc<dyn Executor>, LoaderError> {
        let name = node
            .function
            .clone()
            .ok_or_else(|| LoaderError::MissingField(node.id.clone(), "function"))?;
        let f = self
            .functions
            .function(&name)
            .ok_or_else(|| LoaderError::UnresolvedBinding(node.id.clone(), "function", name.clone()))?;

        let executor = ExecutorBuilder::new(node.id.clone())
            .on::<Value, _, _>(move |payload: Arc<Value>, ctx: Context| {
                let f = f.clone();
                async move {
                    let out = f((*payload).clone()).await?;
                    if is_terminal {
                        ctx.yield_output(out.clone());
                    }
                    ctx.send_message(out, None);
                    Ok(())
                }
            })
            .build();
        Ok(Arc::new(executor))
    }

    fn build_subworkflow_node(&self, node: &NodeSpec, base_dir: &Path) -> Result<Arc<dyn Executor>, LoaderError> {
        let path_field = node
            .path
            .clone()
            .ok_or_else(|| LoaderError::MissingField(node.id.clone(), "path"))?;
        let child_path = base_dir.join(&path_field);
        let loaded = self
            .load_file(&child_path)
            .map_err(|e| LoaderError::SubWorkflow(node.id.clone(), Box::new(e)))?;
        let child = loaded.builder.build().map_err(LoaderError::Build)?;
        let reuse = node.reuse_child_runner.unwrap_or(false);
        let executor = WorkflowExecutor::new(node.id.clone(), format!("{}::child", node.id), Arc::new(child))
            .reuse_child_runner(reuse);
        Ok(Arc::new(executor))
    }

    fn build_edge(&self, edge: &EdgeSpec, vars: &Arc<VariableScope>) -> Result<BuiltEdge, LoaderError> {
        match edge.kind.as_str() {
            "direct" => {
                let from = edge.from.clone().ok_or(LoaderError::MissingEdgeField("from"))?;
                let to = edge.to.clone().ok_or(LoaderError::MissingEdgeField("to"))?;
                Ok(BuiltEdge::Single(Edge::direct(from, to)))
            }
            "fan-out" => {
                let from = edge.from.clone().ok_or(LoaderError::MissingEdgeField("from"))?;
                if edge.targets.is_empty() {
                    return Err(LoaderError::MissingEdgeField("targets"));
                }
                if let Some(name) = &edge.selector {
                    let selector = self
                        .selectors
                        .selector(name)
                        .ok_or_else(|| LoaderError::UnresolvedSelector(from.clone(), name.clone()))?;
                    Ok(BuiltEdge::Single(Edge::fan_out_with_selector(from, edge.targets.clone(), selector)))
                } else {
                    Ok(BuiltEdge::Single(Edge::fan_out(from, edge.targets.clone())))
                }
            }
            "fan-in" => {
                if edge.sources.is_empty() {
                    return Err(LoaderError::MissingEdgeField("sources"));
                }
                let to = edge.to.clone().ok_or(LoaderError::MissingEdgeField("to"))?;
                let aggregator = default_fan_in_aggregator();
                match edge.overflow_depth {
                    Some(depth) => Ok(BuiltEdge::Single(Edge::fan_in_with_overflow_depth(
                        edge.sources.clone(),
                        to,
                        aggregator,
                        depth,
                    ))),
                    None => Ok(BuiltEdge::Single(Edge::fan_in(edge.sources.clone(), to, aggregator))),
                }
            }
            "conditional" => {
                let from = edge.from.clone().ok_or(LoaderError::MissingEdgeField("from"))?;
                let expr = edge.condition.clone().ok_or(LoaderError::MissingEdgeField("condition"))?;
                let predicate = condition::compile_condition(&expr, vars.clone())?;
                let true_target = edge.true_target.clone().ok_or(LoaderError::MissingEdgeField("true_target"))?;
                Ok(BuiltEdge::Single(Edge::conditional(from, predicate, true_target, edge.false_target.clone())))
            }
            "chain" => {
                if edge.nodes.is_empty() {
                    return Err(LoaderError::MissingEdgeField("nodes"));
                }
                Ok(BuiltEdge::Chain(edge.nodes.clone()))
            }
            other => Err(LoaderError::UnknownEdgeKind(other.to_string())),
        }
    }
}

fn build_request_info_node(node: &NodeSpec, is_terminal: bool) -> Arc<dyn Executor> {
    let prompt = node.prompt.clone().unwrap_or_else(|| format!("input requested by '{}'", node.id));
    let schema = node.schema.clone();
    let executor = ExecutorBuilder::new(node.id.clone())
        .on::<Value, _, _>(move |_payload: Arc<Value>, ctx: Context| {
            let prompt = prompt.clone();
            let schema = schema.clone();
            async move {
                let response = ctx.request_input(prompt, schema).await?;
                if is_terminal {
                    ctx.yield_output(response.data.clone());
                }
                ctx.send_message(response.data, None);
                Ok(())
            }
        })
        .build();
    Arc::new(executor)
}

fn build_set_variable_node(node: &NodeSpec, vars: Arc<VariableScope>, is_terminal: bool) -> Arc<dyn Executor> {
    let variable = node.variable.clone().unwrap_or_else(|| node.id.clone());
    let literal = node.value.clone();
    let from_message = node.from_message.clone();
    let executor = ExecutorBuilder::new(node.id.clone())
        .on::<Value, _, _>(move |payload: Arc<Value>, ctx: Context| {
            let vars = vars.clone();
            let variable = variable.clone();
            let literal = literal.clone();
            let from_message = from_message.clone();
            async move {
                let value = match &from_message {
                    Some(path) => json_path_get(&payload, path).unwrap_or(Value::Null),
                    None => literal.clone().unwrap_or(Value::Null),
                };
                vars.set(variable, value);
                if is_terminal {
                    ctx.yield_output((*payload).clone());
                }
                ctx.send_message((*payload).clone(), None);
                Ok(())
            }
        })
        .build();
    Arc::new(executor)
}

/// Ids that appear as an edge's `from`/`sources`/non-final chain member —
/// i.e. have at least one declared outgoing route. A node with no outgoing
/// route is treated as a terminal node and yields its result as a workflow
/// output rather than only forwarding it.
fn ids_with_outgoing_edges(edges: &[EdgeSpec]) -> HashSet<String> {
    let mut ids = HashSet::new();
    for edge in edges {
        match edge.kind.as_str() {
            "direct" | "fan-out" | "conditional" => {
                if let Some(from) = &edge.from {
                    ids.insert(from.clone());
                }
            }
            "fan-in" => {
                for source in &edge.sources {
                    ids.insert(source.clone());
                }
            }
            "chain" => {
                if edge.nodes.len() > 1 {
                    ids.extend(edge.nodes[..edge.nodes.len() - 1].iter().cloned());
                }
            }
            _ => {}
        }
    }
    ids
}

fn default_fan_in_aggregator() -> FanInAggregator {
    Arc::new(|messages: Vec<Message>| {
        let values: Vec<Value> = messages.iter().map(|m| m.to_json().unwrap_or(Value::Null)).collect();
        Message::new(Value::Array(values))
    })
}

fn json_path_get(value: &Value, path: &str) -> Option<Value> {
    let mut current = value;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current.clone())
}

fn value_to_agent_turn(value: &Value) -> AgentTurn {
    if let Some(obj) = value.as_object() {
        if let Some(Value::String(input)) = obj.get("input") {
            let history = obj
                .get("history")
                .and_then(|h| serde_json::from_value(h.clone()).ok())
                .unwrap_or_default();
            return AgentTurn { input: input.clone(), history };
        }
    }
    if let Some(s) = value.as_str() {
        return AgentTurn { input: s.to_string(), history: Vec::new() };
    }
    AgentTurn { input: value.to_string(), history: Vec::new() }
}

fn agent_turn_to_value(turn: &AgentTurn) -> Value {
    serde_json::to_value(turn).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_client::MockChatClient;
    use crate::runner::Runner;

    fn loader_with(functions: MapFunctionRegistry) -> Loader {
        Loader::new(Arc::new(MapAgentRegistry::new()), Arc::new(functions), Arc::new(MapSelectorRegistry::new()))
    }

    #[tokio::test]
    async fn sequential_function_chain_runs_end_to_end() {
        let functions = MapFunctionRegistry::new()
            .with_function("shout", |v: Value| async move {
                Ok(Value::String(v.as_str().unwrap_or_default().to_uppercase()))
            })
            .with_function("exclaim", |v: Value| async move {
                Ok(Value::String(format!("{}!", v.as_str().unwrap_or_default())))
            });
        let loader = loader_with(functions);

        let yaml = r#"
kind: workflow
name: shout-then-exclaim
nodes:
  - id: shout
    kind: function
    function: shout
  - id: exclaim
    kind: function
    function: exclaim
edges:
  - kind: direct
    from: shout
    to: exclaim
"#;
        let loaded = loader.load_str(yaml).unwrap();
        let workflow = loaded.builder.build().unwrap();
        let runner = Runner::new(Arc::new(workflow));
        let result = runner.run(Value::String("hi".into())).await.unwrap();
        assert_eq!(result.outputs, vec![Value::String("HI!".into())]);
    }

    #[tokio::test]
    async fn conditional_edge_routes_on_vars_and_message() {
        let functions = MapFunctionRegistry::new()
            .with_function("child", |_v: Value| async move { Ok(Value::String("child-branch".into())) })
            .with_function("adult", |_v: Value| async move { Ok(Value::String("adult-branch".into())) });
        let loader = loader_with(functions);
        let yaml = r#"
kind: workflow
name: by-age
start: gate
nodes:
  - id: gate
    kind: set-variable
    variable: unused
    value: null
  - id: child
    kind: function
    function: child
  - id: adult
    kind: function
    function: adult
edges:
  - kind: conditional
    from: gate
    condition: "message.age < 18"
    true_target: child
    false_target: adult
"#;
        let loaded = loader.load_str(yaml).unwrap();
        let workflow = loaded.builder.build().unwrap();
        let runner = Runner::new(Arc::new(workflow));
        let result = runner.run(serde_json::json!({"age": 8})).await.unwrap();
        assert_eq!(result.outputs, vec![Value::String("child-branch".into())]);
    }

    #[test]
    fn unknown_node_kind_is_rejected() {
        let loader = loader_with(MapFunctionRegistry::new());
        let yaml = r#"
kind: workflow
name: bad
nodes:
  - id: a
    kind: not-a-real-kind
"#;
        let err = loader.load_str(yaml).unwrap_err();
        assert!(matches!(err, LoaderError::UnknownNodeKind(_, _)));
    }

    #[test]
    fn unresolved_chat_client_binding_is_rejected() {
        let loader = loader_with(MapFunctionRegistry::new());
        let yaml = r#"
kind: workflow
name: bad-agent
nodes:
  - id: a
    kind: agent
    chat_client: missing
"#;
        let err = loader.load_str(yaml).unwrap_err();
        assert!(matches!(err, LoaderError::UnresolvedBinding(_, "chat_client", _)));
    }

    #[tokio::test]
    async fn agent_node_drives_mock_chat_client() {
        let mut agents = MapAgentRegistry::new();
        agents = agents.with_chat_client("mock", Arc::new(MockChatClient::text("42")));
        let loader = Loader::new(Arc::new(agents), Arc::new(MapFunctionRegistry::new()), Arc::new(MapSelectorRegistry::new()));
        let yaml = r#"
kind: workflow
name: ask
nodes:
  - id: ask
    kind: agent
    chat_client: mock
"#;
        let loaded = loader.load_str(yaml).unwrap();
        let workflow = loaded.builder.build().unwrap();
        let runner = Runner::new(Arc::new(workflow));
        let result = runner.run(Value::String("what is the answer?".into())).await.unwrap();
        let out = result.outputs[0].get("input").and_then(Value::as_str).unwrap();
        assert_eq!(out, "42");
    }
}
