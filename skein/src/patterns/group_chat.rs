//! Group-chat orchestration: a manager executor observes each participant's
//! turn and either selects the next speaker or ends the chat.

use std::any::TypeId;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::chat_client::{ChatClient, ChatMessage, ChatOptions, ChatRole};
use crate::edge::Edge;
use crate::error::WorkflowError;
use crate::executor::{Context, Executor, HandlerDescriptor};
use crate::message::Message;
use crate::workflow::WorkflowBuilder;

pub(crate) const MANAGER_ID: &str = "__group_chat_manager";

/// One turn in a group chat: who spoke, and what they said. Also used as the
/// manager's outgoing "it's your turn" cue — participants read `content` as
/// the most recent thing said, not necessarily by themselves.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupChatTurn {
    pub speaker_id: String,
    pub content: String,
}

/// The manager's decision after observing a turn.
pub enum ManagerDecision {
    /// Route to the named participant next.
    Continue(String),
    /// End the chat, yielding this as the workflow output.
    Finish(Value),
}

/// Chooses the next speaker (or ends the chat) given the transcript so far.
#[async_trait]
pub trait GroupChatManager: Send + Sync {
    async fn decide(&self, history: &[GroupChatTurn]) -> Result<ManagerDecision, WorkflowError>;
}

/// A manager driven by a plain Rust policy closure, no model call involved.
pub struct DeterministicManager<F>
where
    F: Fn(&[GroupChatTurn]) -> ManagerDecision + Send + Sync,
{
    policy: F,
}

impl<F> DeterministicManager<F>
where
    F: Fn(&[GroupChatTurn]) -> ManagerDecision + Send + Sync,
{
    pub fn new(policy: F) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl<F> GroupChatManager for DeterministicManager<F>
where
    F: Fn(&[GroupChatTurn]) -> ManagerDecision + Send + Sync,
{
    async fn decide(&self, history: &[GroupChatTurn]) -> Result<ManagerDecision, WorkflowError> {
        Ok((self.policy)(history))
    }
}

/// A manager that asks a `ChatClient` to choose the next speaker, expecting
/// `{"next_speaker": "<id>"}` or `{"finish": <value>}` JSON back.
pub struct PromptManager {
    chat_client: Arc<dyn ChatClient>,
    instructions: String,
    participant_ids: Vec<String>,
}

impl PromptManager {
    pub fn new(
        chat_client: Arc<dyn ChatClient>,
        instructions: impl Into<String>,
        participant_ids: Vec<String>,
    ) -> Self {
        Self { chat_client, instructions: instructions.into(), participant_ids }
    }
}

#[async_trait]
impl GroupChatManager for PromptManager {
    async fn decide(&self, history: &[GroupChatTurn]) -> Result<ManagerDecision, WorkflowError> {
        let transcript = history
            .iter()
            .map(|t| format!("{}: {}", t.speaker_id, t.content))
            .collect::<Vec<_>>()
            .join("\n");
        let messages = vec![
            ChatMessage { role: ChatRole::System, content: self.instructions.clone(), tool_call_id: None },
            ChatMessage {
                role: ChatRole::User,
                content: format!(
                    "Participants: {}\nTranscript so far:\n{}\nReply with JSON {{\"next_speaker\": \"<id>\"}} or {{\"finish\": <result>}}.",
                    self.participant_ids.join(", "),
                    transcript
                ),
                tool_call_id: None,
            },
        ];
        let response = self
            .chat_client
            .get_response(&messages, &ChatOptions::default())
            .await
            .map_err(|e| WorkflowError::ChatClient(e.to_string()))?;
        let parsed: Value = serde_json::from_str(&response.content)
            .map_err(|e| WorkflowError::ChatClient(format!("manager reply was not JSON: {e}")))?;
        if let Some(next) = parsed.get("next_speaker").and_then(Value::as_str) {
            return Ok(ManagerDecision::Continue(next.to_string()));
        }
        if let Some(finish) = parsed.get("finish") {
            return Ok(ManagerDecision::Finish(finish.clone()));
        }
        Err(WorkflowError::ChatClient("manager reply had neither next_speaker nor finish".into()))
    }
}

/// Manager-agnostic bookkeeping shared by `ManagerExecutor` and the
/// magentic manager: the accumulated transcript and direct-addressed
/// routing to a chosen participant.
pub(crate) struct Transcript {
    id: String,
    participant_ids: Vec<String>,
    history: Mutex<Vec<GroupChatTurn>>,
}

impl Transcript {
    pub(crate) fn new(id: impl Into<String>, participant_ids: Vec<String>) -> Self {
        Self { id: id.into(), participant_ids, history: Mutex::new(Vec::new()) }
    }

    /// Pushes `turn`, returns the updated transcript.
    pub(crate) async fn record_turn(&self, turn: GroupChatTurn) -> Vec<GroupChatTurn> {
        let mut history = self.history.lock().await;
        history.push(turn);
        history.clone()
    }

    /// Addresses the reply to `next`, carrying forward the last thing said
    /// so the chosen participant has something to react to.
    pub(crate) fn route_to(&self, ctx: &Context, history: &[GroupChatTurn], next: &str) -> Result<(), WorkflowError> {
        if !self.participant_ids.contains(&next.to_string()) {
            return Err(WorkflowError::internal(format!("manager selected unknown participant '{next}'")));
        }
        let cue = history
            .last()
            .cloned()
            .unwrap_or_else(|| GroupChatTurn { speaker_id: self.id.clone(), content: String::new() });
        ctx.send_message(cue, Some(next));
        Ok(())
    }

    pub(crate) fn snapshot_for_checkpoint(&self) -> Option<Value> {
        self.history.try_lock().ok().map(|h| serde_json::to_value(&*h).unwrap_or(Value::Null))
    }

    pub(crate) async fn restore_from_checkpoint(&self, turns: Vec<GroupChatTurn>) {
        *self.history.lock().await = turns;
    }
}

/// The manager executor itself: a single `GroupChatTurn` handler that holds
/// the accumulated transcript behind a `Mutex`, checkpointable via
/// `serialize_state`/`deserialize_state`.
pub(crate) struct ManagerExecutor {
    transcript: Transcript,
    manager: Arc<dyn GroupChatManager>,
    descriptors: Vec<HandlerDescriptor>,
}

impl ManagerExecutor {
    pub(crate) fn new(id: impl Into<String>, manager: Arc<dyn GroupChatManager>, participant_ids: Vec<String>) -> Self {
        Self {
            transcript: Transcript::new(id, participant_ids),
            manager,
            descriptors: vec![HandlerDescriptor {
                input_type: TypeId::of::<GroupChatTurn>(),
                input_type_name: std::any::type_name::<GroupChatTurn>(),
                output_type_names: vec![std::any::type_name::<GroupChatTurn>()],
                may_yield_output: true,
                registration_order: 0,
            }],
        }
    }
}

#[async_trait]
impl Executor for ManagerExecutor {
    fn id(&self) -> &str {
        &self.transcript.id
    }

    fn handlers(&self) -> &[HandlerDescriptor] {
        &self.descriptors
    }

    async fn dispatch(&self, message: Message, ctx: Context) -> Result<(), WorkflowError> {
        let turn = match message.downcast::<GroupChatTurn>() {
            Ok(turn) => (*turn).clone(),
            Err(message) => return Err(WorkflowError::UnknownMessage(message.type_name().to_string())),
        };
        let history = self.transcript.record_turn(turn).await;
        match self.manager.decide(&history).await? {
            ManagerDecision::Continue(next) => self.transcript.route_to(&ctx, &history, &next)?,
            ManagerDecision::Finish(value) => ctx.yield_output(value),
        }
        Ok(())
    }

    fn serialize_state(&self) -> Option<Value> {
        self.transcript.snapshot_for_checkpoint()
    }

    async fn deserialize_state(&self, state: Value) -> Result<(), WorkflowError> {
        let turns: Vec<GroupChatTurn> =
            serde_json::from_value(state).map_err(|e| WorkflowError::Serialization(e.to_string()))?;
        self.transcript.restore_from_checkpoint(turns).await;
        Ok(())
    }
}

/// Wires `participants` behind `manager`: every participant's reply routes
/// back to the manager (`Direct` edges); the manager either addresses the
/// next speaker directly or calls `Context::yield_output` to end the chat.
pub fn group_chat(manager: Arc<dyn GroupChatManager>, participants: Vec<Arc<dyn Executor>>) -> WorkflowBuilder {
    assert!(!participants.is_empty(), "group_chat requires at least one participant");
    let participant_ids: Vec<String> = participants.iter().map(|p| p.id().to_string()).collect();
    let manager_executor: Arc<dyn Executor> = Arc::new(ManagerExecutor::new(MANAGER_ID, manager, participant_ids));
    wire_manager_and_participants(manager_executor, participants)
}

pub(crate) fn wire_manager_and_participants(
    manager: Arc<dyn Executor>,
    participants: Vec<Arc<dyn Executor>>,
) -> WorkflowBuilder {
    let manager_id = manager.id().to_string();
    let mut builder = WorkflowBuilder::new().start_with(manager_id.clone()).add_executor(manager);
    for participant in &participants {
        builder = builder.add_edge(Edge::direct(participant.id(), manager_id.clone()));
    }
    for participant in participants {
        builder = builder.add_executor(participant);
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorBuilder;
    use crate::runner::Runner;

    #[tokio::test]
    async fn deterministic_manager_alternates_then_finishes() {
        let writer = Arc::new(
            ExecutorBuilder::new("writer")
                .on::<GroupChatTurn, _, _>(|_turn, ctx| async move {
                    ctx.send_message(
                        GroupChatTurn { speaker_id: "writer".into(), content: "draft".into() },
                        None,
                    );
                    Ok(())
                })
                .build(),
        );
        let editor = Arc::new(
            ExecutorBuilder::new("editor")
                .on::<GroupChatTurn, _, _>(|_turn, ctx| async move {
                    ctx.send_message(
                        GroupChatTurn { speaker_id: "editor".into(), content: "approved".into() },
                        None,
                    );
                    Ok(())
                })
                .build(),
        );

        let manager = Arc::new(DeterministicManager::new(|history: &[GroupChatTurn]| {
            if history.iter().any(|t| t.content == "approved") {
                ManagerDecision::Finish(serde_json::json!({"final": "approved"}))
            } else if history.iter().any(|t| t.speaker_id == "writer") {
                ManagerDecision::Continue("editor".to_string())
            } else {
                ManagerDecision::Continue("writer".to_string())
            }
        }));

        let workflow = Arc::new(group_chat(manager, vec![writer, editor]).build().unwrap());
        let runner = Runner::new(workflow);
        let result = runner
            .run(GroupChatTurn { speaker_id: "user".into(), content: "write a haiku".into() })
            .await
            .unwrap();
        assert_eq!(result.outputs, vec![serde_json::json!({"final": "approved"})]);
    }
}
