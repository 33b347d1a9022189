//! Higher-level orchestration patterns, each a function that assembles a
//! `WorkflowBuilder` out of already-built `Executor`s. None of these add new
//! routing primitives — they are recipes over `Edge`, `Context::send_message`'s
//! explicit targeting, and `ExecutorBuilder`.

pub mod concurrent;
pub mod group_chat;
pub mod handoff;
pub mod magentic;
pub mod sequential;

pub use concurrent::concurrent;
pub use group_chat::{group_chat, DeterministicManager, GroupChatManager, GroupChatTurn, ManagerDecision, PromptManager};
pub use handoff::handoff;
pub use magentic::{magentic, PlanningManager, ProgressLedger, TaskLedger};
pub use sequential::sequential;
