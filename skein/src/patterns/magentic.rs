//! Magentic orchestration: `group_chat` with a manager that also maintains a
//! structured plan and a progress ledger, and gates the first participant
//! turn on human plan approval.

use std::any::TypeId;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WorkflowError;
use crate::executor::{Context, Executor, HandlerDescriptor};
use crate::message::Message;
use crate::patterns::group_chat::{
    wire_manager_and_participants, GroupChatManager, GroupChatTurn, ManagerDecision, Transcript,
};
use crate::workflow::WorkflowBuilder;

const MANAGER_ID: &str = "__magentic_manager";

/// The plan drafted (or redrafted, after a rejected plan) before work starts.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskLedger {
    pub facts: Vec<String>,
    pub plan: Vec<String>,
}

/// Tracks which subtasks are satisfied and how many turns have passed
/// without forward progress.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProgressLedger {
    pub satisfied: Vec<String>,
    pub unsatisfied: Vec<String>,
    pub stall_count: u32,
}

/// A `GroupChatManager` that also drafts a `TaskLedger` and updates a
/// `ProgressLedger` as turns arrive.
#[async_trait]
pub trait PlanningManager: GroupChatManager {
    /// Drafts or redrafts the plan from the transcript so far.
    async fn plan(&self, history: &[GroupChatTurn]) -> Result<TaskLedger, WorkflowError>;

    /// Updates `progress` after observing `turn`.
    async fn update_progress(&self, progress: &mut ProgressLedger, turn: &GroupChatTurn);
}

struct MagenticState {
    ledger: TaskLedger,
    progress: ProgressLedger,
    plan_approved: bool,
}

/// The manager executor: delegates transcript bookkeeping and routing to a
/// shared `Transcript`, adding the plan-approval gate and ledgers.
struct MagenticManagerExecutor {
    transcript: Transcript,
    planning_manager: Arc<dyn PlanningManager>,
    state: Mutex<MagenticState>,
    descriptors: Vec<HandlerDescriptor>,
}

impl MagenticManagerExecutor {
    fn new(planning_manager: Arc<dyn PlanningManager>, participant_ids: Vec<String>) -> Self {
        Self {
            transcript: Transcript::new(MANAGER_ID, participant_ids),
            planning_manager,
            state: Mutex::new(MagenticState {
                ledger: TaskLedger::default(),
                progress: ProgressLedger::default(),
                plan_approved: false,
            }),
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
impl Executor for MagenticManagerExecutor {
    fn id(&self) -> &str {
        MANAGER_ID
    }

    fn handlers(&self) -> &[HandlerDescriptor] {
        &self.descriptors
    }

    async fn dispatch(&self, message: Message, ctx: Context) -> Result<(), WorkflowError> {
        let turn = match message.downcast::<GroupChatTurn>() {
            Ok(turn) => (*turn).clone(),
            Err(message) => return Err(WorkflowError::UnknownMessage(message.type_name().to_string())),
        };
        let history = self.transcript.record_turn(turn.clone()).await;

        // `update_progress` takes the ledger by value, not the lock guard
        // itself, so the (non-`Send`) guard is never held across its
        // `.await` — same rule the plan-approval loop below follows.
        let mut progress = self.state.lock().unwrap().progress.clone();
        self.planning_manager.update_progress(&mut progress, &turn).await;
        let plan_approved = {
            let mut state = self.state.lock().unwrap();
            state.progress = progress;
            state.plan_approved
        };

        if !plan_approved {
            loop {
                let draft = self.planning_manager.plan(&history).await?;
                let schema = serde_json::to_value(&draft).unwrap_or(Value::Null);
                // No lock held across this suspension point — a checkpoint
                // taken while awaiting needs `serialize_state` to be able
                // to acquire it.
                let response = ctx.request_input("Approve the plan?", Some(schema)).await?;
                let approved = response.data.get("approved").and_then(Value::as_bool).unwrap_or(false);

                let mut state = self.state.lock().unwrap();
                if approved {
                    state.ledger = draft;
                    state.plan_approved = true;
                    break;
                }
                // Rejected: mark a restart for observers, then redraft.
                ctx.yield_output(serde_json::json!({"reset": true}));
                state.progress = ProgressLedger::default();
            }
        }

        match self.planning_manager.decide(&history).await? {
            ManagerDecision::Continue(next) => self.transcript.route_to(&ctx, &history, &next)?,
            ManagerDecision::Finish(value) => ctx.yield_output(value),
        }
        Ok(())
    }

    fn serialize_state(&self) -> Option<Value> {
        // Never held across an `.await` (see `dispatch`), so a plain lock
        // always succeeds here — including while a handler is suspended
        // awaiting plan approval, which is exactly the window a mid-run
        // checkpoint needs to capture.
        let state = self.state.lock().unwrap();
        let history = self.transcript.snapshot_for_checkpoint()?;
        serde_json::to_value(serde_json::json!({
            "history": history,
            "ledger": state.ledger,
            "progress": state.progress,
            "plan_approved": state.plan_approved,
        }))
        .ok()
    }

    async fn deserialize_state(&self, value: Value) -> Result<(), WorkflowError> {
        let history: Vec<GroupChatTurn> = serde_json::from_value(value["history"].clone())
            .map_err(|e| WorkflowError::Serialization(e.to_string()))?;
        let ledger: TaskLedger = serde_json::from_value(value["ledger"].clone())
            .map_err(|e| WorkflowError::Serialization(e.to_string()))?;
        let progress: ProgressLedger = serde_json::from_value(value["progress"].clone())
            .map_err(|e| WorkflowError::Serialization(e.to_string()))?;
        let plan_approved = value["plan_approved"].as_bool().unwrap_or(false);
        self.transcript.restore_from_checkpoint(history).await;
        let mut state = self.state.lock().unwrap();
        state.ledger = ledger;
        state.progress = progress;
        state.plan_approved = plan_approved;
        Ok(())
    }
}

/// A `group_chat` whose manager also owns a `TaskLedger`/`ProgressLedger`
/// and requires plan approval (via the embedded HITL request/response flow)
/// before the first participant turn.
pub fn magentic(
    manager: Arc<dyn PlanningManager>,
    participants: Vec<Arc<dyn Executor>>,
) -> WorkflowBuilder {
    assert!(!participants.is_empty(), "magentic requires at least one participant");
    let participant_ids: Vec<String> = participants.iter().map(|p| p.id().to_string()).collect();
    let manager_executor: Arc<dyn Executor> = Arc::new(MagenticManagerExecutor::new(manager, participant_ids));
    wire_manager_and_participants(manager_executor, participants)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::EventBus;
    use crate::request_info::{CorrelationTable, ExternalInputResponse};
    use tokio_util::sync::CancellationToken;

    struct ScriptedPlanner;

    #[async_trait]
    impl GroupChatManager for ScriptedPlanner {
        async fn decide(&self, history: &[GroupChatTurn]) -> Result<ManagerDecision, WorkflowError> {
            if history.iter().any(|t| t.speaker_id == "worker") {
                Ok(ManagerDecision::Finish(serde_json::json!({"done": true})))
            } else {
                Ok(ManagerDecision::Continue("worker".to_string()))
            }
        }
    }

    #[async_trait]
    impl PlanningManager for ScriptedPlanner {
        async fn plan(&self, _history: &[GroupChatTurn]) -> Result<TaskLedger, WorkflowError> {
            Ok(TaskLedger { facts: vec!["one worker".into()], plan: vec!["do the task".into()] })
        }

        async fn update_progress(&self, _progress: &mut ProgressLedger, _turn: &GroupChatTurn) {}
    }

    #[tokio::test]
    async fn accepted_plan_proceeds_to_the_worker() {
        let planner: Arc<dyn PlanningManager> = Arc::new(ScriptedPlanner);
        let manager = MagenticManagerExecutor::new(planner, vec!["worker".to_string()]);

        let bus = Arc::new(EventBus::new());
        let table = Arc::new(CorrelationTable::new(bus));
        let ctx = Context::new(MANAGER_ID, table.clone(), CancellationToken::new());

        let ctx_clone = ctx.clone();
        let handle = tokio::spawn(async move {
            manager
                .dispatch(
                    Message::new(GroupChatTurn { speaker_id: "user".into(), content: "kick off".into() }),
                    ctx_clone,
                )
                .await
        });

        let request_id = loop {
            if let Some(r) = table.snapshot().await.into_iter().next() {
                break r.request_id;
            }
            tokio::task::yield_now().await;
        };
        table
            .respond(ExternalInputResponse { request_id, data: serde_json::json!({"approved": true}) })
            .await
            .unwrap();

        handle.await.unwrap().unwrap();
        let outgoing = ctx.take_outgoing();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].target.as_deref(), Some("worker"));
    }

    #[tokio::test]
    async fn rejected_plan_marks_a_reset_and_redrafts() {
        let planner: Arc<dyn PlanningManager> = Arc::new(ScriptedPlanner);
        let manager = MagenticManagerExecutor::new(planner, vec!["worker".to_string()]);

        let bus = Arc::new(EventBus::new());
        let table = Arc::new(CorrelationTable::new(bus));
        let ctx = Context::new(MANAGER_ID, table.clone(), CancellationToken::new());

        let ctx_clone = ctx.clone();
        let handle = tokio::spawn(async move {
            manager
                .dispatch(
                    Message::new(GroupChatTurn { speaker_id: "user".into(), content: "kick off".into() }),
                    ctx_clone,
                )
                .await
        });

        let first_request_id = loop {
            if let Some(r) = table.snapshot().await.into_iter().next() {
                break r.request_id;
            }
            tokio::task::yield_now().await;
        };
        table
            .respond(ExternalInputResponse {
                request_id: first_request_id,
                data: serde_json::json!({"approved": false}),
            })
            .await
            .unwrap();

        // One rejection yields a reset marker, then redrafts and asks again.
        let second_request_id = loop {
            if let Some(r) = table.snapshot().await.into_iter().next() {
                break r.request_id;
            }
            tokio::task::yield_now().await;
        };
        table
            .respond(ExternalInputResponse { request_id: second_request_id, data: serde_json::json!({"approved": true}) })
            .await
            .unwrap();

        handle.await.unwrap().unwrap();
        let outputs = ctx.take_outputs();
        assert!(outputs.contains(&serde_json::json!({"reset": true})));
    }
}
