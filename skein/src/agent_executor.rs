//! Agent executor: wraps a `ChatClient` and a tool set into a single
//! `Executor`, running a think -> act -> observe ReAct loop internally per
//! invocation rather than as separate graph nodes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat_client::{ChatClient, ChatMessage, ChatOptions, ChatRole};
use crate::error::WorkflowError;
use crate::executor::{Context, Executor, HandlerDescriptor};
use crate::message::Message;
use crate::tool::{ApprovalMode, Tool};

/// Inbound turn for an `AgentExecutor`: one user message plus the running
/// history (empty on the first turn of a fresh conversation).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentTurn {
    pub input: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

/// Bound for the inner think/act/observe loop: stops a runaway tool-call
/// chain from looping forever within one handler invocation.
const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

pub struct AgentExecutor {
    id: String,
    instructions: Option<String>,
    chat_client: Arc<dyn ChatClient>,
    tools: Vec<Tool>,
    max_tool_rounds: usize,
    descriptors: Vec<HandlerDescriptor>,
}

impl AgentExecutor {
    pub fn new(id: impl Into<String>, chat_client: Arc<dyn ChatClient>) -> Self {
        Self {
            id: id.into(),
            instructions: None,
            chat_client,
            tools: Vec::new(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            descriptors: vec![HandlerDescriptor {
                input_type: std::any::TypeId::of::<AgentTurn>(),
                input_type_name: std::any::type_name::<AgentTurn>(),
                output_type_names: vec![std::any::type_name::<AgentTurn>()],
                may_yield_output: true,
                registration_order: 0,
            }],
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_tool_rounds(mut self, n: usize) -> Self {
        self.max_tool_rounds = n.max(1);
        self
    }

    pub(crate) fn options(&self) -> ChatOptions {
        ChatOptions {
            tools: if self.tools.is_empty() { None } else { Some(self.tools.clone()) },
            instructions: self.instructions.clone(),
            ..Default::default()
        }
    }

    fn tool_by_name(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub(crate) fn chat_client(&self) -> &Arc<dyn ChatClient> {
        &self.chat_client
    }

    pub(crate) fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub(crate) fn max_tool_rounds(&self) -> usize {
        self.max_tool_rounds
    }
}

#[async_trait]
impl Executor for AgentExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn handlers(&self) -> &[HandlerDescriptor] {
        &self.descriptors
    }

    async fn dispatch(&self, message: Message, ctx: Context) -> Result<(), WorkflowError> {
        let turn = message
            .downcast::<AgentTurn>()
            .map_err(|_| WorkflowError::internal("AgentExecutor received a non-AgentTurn message"))?;
        let result = run_turn(
            &self.chat_client,
            &self.options(),
            &self.tools,
            self.max_tool_rounds,
            (*turn).clone(),
            &ctx,
        )
        .await?;
        ctx.send_message(result, None);
        Ok(())
    }
}

/// Drives one think -> act -> observe turn: calls the chat client, executes
/// any requested tool calls (gating `ApprovalMode::AlwaysRequire` ones on
/// `ctx.request_input`), and loops until a tool-call-free reply or
/// `max_tool_rounds` is exhausted. Shared by `AgentExecutor` and the
/// declarative loader's `agent` node, which drives the same loop over a
/// JSON-wrapped turn instead of a typed one.
pub(crate) async fn run_turn(
    chat_client: &Arc<dyn ChatClient>,
    options: &ChatOptions,
    tools: &[Tool],
    max_tool_rounds: usize,
    turn: AgentTurn,
    ctx: &Context,
) -> Result<AgentTurn, WorkflowError> {
    let mut history = turn.history.clone();
    history.push(ChatMessage { role: ChatRole::User, content: turn.input.clone(), tool_call_id: None });

    let mut final_content = String::new();

    for _ in 0..max_tool_rounds {
        let response = chat_client
            .get_response(&history, options)
            .await
            .map_err(|e| WorkflowError::ChatClient(e.to_string()))?;

        if response.tool_calls.is_empty() {
            final_content = response.content;
            history.push(ChatMessage { role: ChatRole::Assistant, content: final_content.clone(), tool_call_id: None });
            break;
        }

        history.push(ChatMessage { role: ChatRole::Assistant, content: response.content.clone(), tool_call_id: None });

        for call in &response.tool_calls {
            let Some(tool) = tools.iter().find(|t| t.name() == call.name) else {
                history.push(ChatMessage {
                    role: ChatRole::Tool,
                    content: format!("error: unknown tool '{}'", call.name),
                    tool_call_id: Some(call.call_id.clone()),
                });
                continue;
            };
            let Tool::Function { handler, approval, .. } = tool else {
                history.push(ChatMessage {
                    role: ChatRole::Tool,
                    content: format!("error: '{}' is a hosted tool with no local handler", call.name),
                    tool_call_id: Some(call.call_id.clone()),
                });
                continue;
            };

            if *approval == ApprovalMode::AlwaysRequire {
                let decision =
                    ctx.request_input(format!("approve tool call '{}'?", call.name), Some(call.arguments.clone())).await?;
                let approved = decision.data.get("approved").and_then(Value::as_bool).unwrap_or(false);
                if !approved {
                    return Err(WorkflowError::ToolApprovalDenied(call.name.clone()));
                }
            }

            let result = handler.call(call.arguments.clone()).await;
            let content = match result {
                Ok(value) => value.to_string(),
                Err(err) => format!("error: {err}"),
            };
            history.push(ChatMessage { role: ChatRole::Tool, content, tool_call_id: Some(call.call_id.clone()) });
        }
    }

    Ok(AgentTurn { input: final_content, history })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_client::MockChatClient;
    use crate::request_info::NullRequestHub;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn dispatch_forwards_final_content_as_next_turn() {
        let client = Arc::new(MockChatClient::text("42 is the answer"));
        let agent = AgentExecutor::new("agent", client);
        let ctx = Context::new("agent", Arc::new(NullRequestHub), CancellationToken::new());
        agent
            .dispatch(
                Message::new(AgentTurn { input: "what is the answer?".into(), history: Vec::new() }),
                ctx.clone(),
            )
            .await
            .unwrap();
        let outgoing = ctx.take_outgoing();
        assert_eq!(outgoing.len(), 1);
        let turn = outgoing[0].payload.downcast_ref::<AgentTurn>().unwrap();
        assert_eq!(turn.input, "42 is the answer");
        assert_eq!(turn.history.len(), 2);
    }
}
