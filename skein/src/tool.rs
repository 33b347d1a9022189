//! Tool contract: locally-executed functions and provider-hosted tool kinds,
//! plus the approval gate: a per-tool `ApprovalMode` set at registration
//! time, rather than a policy mapped to a fixed tool name list.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WorkflowError;

/// Executes one `Tool::Function` call's arguments and returns its result.
#[async_trait]
pub trait FunctionToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> Result<Value, WorkflowError>;
}

#[async_trait]
impl<F, Fut> FunctionToolHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, WorkflowError>> + Send,
{
    async fn call(&self, arguments: Value) -> Result<Value, WorkflowError> {
        (self)(arguments).await
    }
}

/// A provider-hosted tool kind, passed through to the `ChatClient` rather
/// than executed locally.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostedToolKind {
    WebSearch,
    CodeInterpreter,
    FileSearch,
    Mcp { endpoint: String },
    CustomRemote { descriptor: Value },
}

/// Gates whether a `Tool::Function` call must be confirmed via
/// `ctx.request_input` before it runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    #[default]
    NeverRequire,
    AlwaysRequire,
}

/// A tool an agent executor may call: either a locally-executed function or
/// a kind the chat provider hosts itself.
#[derive(Clone)]
pub enum Tool {
    Function {
        name: String,
        description: String,
        parameters_schema: Value,
        handler: Arc<dyn FunctionToolHandler>,
        approval: ApprovalMode,
    },
    Hosted(HostedToolKind),
}

impl Tool {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: Value,
        handler: Arc<dyn FunctionToolHandler>,
    ) -> Self {
        Tool::Function {
            name: name.into(),
            description: description.into(),
            parameters_schema,
            handler,
            approval: ApprovalMode::NeverRequire,
        }
    }

    pub fn requiring_approval(mut self) -> Self {
        if let Tool::Function { approval, .. } = &mut self {
            *approval = ApprovalMode::AlwaysRequire;
        }
        self
    }

    pub fn name(&self) -> &str {
        match self {
            Tool::Function { name, .. } => name,
            Tool::Hosted(kind) => kind.name(),
        }
    }

    pub fn approval(&self) -> ApprovalMode {
        match self {
            Tool::Function { approval, .. } => *approval,
            Tool::Hosted(_) => ApprovalMode::NeverRequire,
        }
    }
}

impl HostedToolKind {
    pub fn name(&self) -> &'static str {
        match self {
            HostedToolKind::WebSearch => "web_search",
            HostedToolKind::CodeInterpreter => "code_interpreter",
            HostedToolKind::FileSearch => "file_search",
            HostedToolKind::Mcp { .. } => "mcp",
            HostedToolKind::CustomRemote { .. } => "custom_remote",
        }
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tool::Function { name, approval, .. } => {
                f.debug_struct("Function").field("name", name).field("approval", approval).finish()
            }
            Tool::Hosted(kind) => f.debug_tuple("Hosted").field(kind).finish(),
        }
    }
}

impl Serialize for Tool {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Tool::Function { name, description, parameters_schema, .. } => {
                serde_json::json!({
                    "type": "function",
                    "name": name,
                    "description": description,
                    "parameters": parameters_schema,
                })
                .serialize(serializer)
            }
            Tool::Hosted(kind) => kind.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Tool {
    fn deserialize<D: serde::Deserializer<'de>>(_deserializer: D) -> Result<Self, D::Error> {
        Err(serde::de::Error::custom(
            "Tool::Function carries a handler and cannot be deserialized; build it in code and register by name",
        ))
    }
}

/// Returns the names of `tools` whose `ApprovalMode` is `AlwaysRequire`.
pub fn tools_requiring_approval(tools: &[Tool]) -> Vec<&str> {
    tools.iter().filter(|t| t.approval() == ApprovalMode::AlwaysRequire).map(|t| t.name()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_handler() -> Arc<dyn FunctionToolHandler> {
        Arc::new(|_args: Value| async move { Ok(Value::Null) })
    }

    #[test]
    fn requiring_approval_only_marks_function_tools() {
        let tool = Tool::function("delete_file", "deletes a file", Value::Null, noop_handler())
            .requiring_approval();
        assert_eq!(tool.approval(), ApprovalMode::AlwaysRequire);

        let hosted = Tool::Hosted(HostedToolKind::WebSearch);
        assert_eq!(hosted.approval(), ApprovalMode::NeverRequire);
    }

    #[test]
    fn tools_requiring_approval_filters_by_mode() {
        let tools = vec![
            Tool::function("read_file", "reads a file", Value::Null, noop_handler()),
            Tool::function("delete_file", "deletes a file", Value::Null, noop_handler())
                .requiring_approval(),
        ];
        assert_eq!(tools_requiring_approval(&tools), vec!["delete_file"]);
    }
}
