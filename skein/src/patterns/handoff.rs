//! Handoff orchestration: each participant decides who speaks next by
//! addressing its reply directly — no conditional edges are wired, routing
//! is fully dynamic via `Context::send_message`'s explicit target (the
//! "next-speaker tag" of §4.9, carried as the address rather than a
//! separate field). Per §4.9, an unknown tag routes to the terminal
//! participant rather than being dropped — `HandoffRouter` below enforces
//! that by rewriting any explicit target that doesn't name a participant
//! before the runner ever sees it.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::edge::Edge;
use crate::error::WorkflowError;
use crate::executor::{Context, Executor, HandlerDescriptor, Outgoing};
use crate::message::Message;
use crate::workflow::WorkflowBuilder;

/// Wraps one participant so an explicit `send_message(_, Some(tag))` whose
/// `tag` names neither a known participant nor the terminal is redirected
/// to the terminal instead of being dropped by the runner as an unrouted
/// destination.
struct HandoffRouter {
    inner: Arc<dyn Executor>,
    known_ids: Arc<HashSet<String>>,
    terminal_id: String,
}

#[async_trait]
impl Executor for HandoffRouter {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn handlers(&self) -> &[HandlerDescriptor] {
        self.inner.handlers()
    }

    async fn dispatch(&self, message: Message, ctx: Context) -> Result<(), WorkflowError> {
        self.inner.dispatch(message, ctx.clone()).await?;
        for outgoing in ctx.take_outgoing() {
            let target = match outgoing.target {
                Some(tag) if self.known_ids.contains(&tag) => Some(tag),
                Some(_unknown_tag) => Some(self.terminal_id.clone()),
                None => None,
            };
            ctx.push_outgoing(Outgoing { payload: outgoing.payload, target });
        }
        Ok(())
    }

    fn serialize_state(&self) -> Option<Value> {
        self.inner.serialize_state()
    }

    async fn deserialize_state(&self, value: Value) -> Result<(), WorkflowError> {
        self.inner.deserialize_state(value).await
    }

    fn max_consecutive_failures(&self) -> Option<u32> {
        self.inner.max_consecutive_failures()
    }
}

/// Wires `participants` plus a `terminal` executor. A participant that
/// addresses another participant by id (`Context::send_message(_, Some(id))`)
/// hands off directly. A participant whose reply has no explicit target
/// falls through its `Direct` edge to `terminal`, which is expected to call
/// `Context::yield_output`; a participant whose explicit target names
/// neither a participant nor the terminal also forwards to `terminal`.
pub fn handoff(participants: Vec<Arc<dyn Executor>>, terminal: Arc<dyn Executor>) -> WorkflowBuilder {
    assert!(!participants.is_empty(), "handoff requires at least one participant");
    let terminal_id = terminal.id().to_string();
    let start = participants[0].id().to_string();

    let known_ids: Arc<HashSet<String>> = Arc::new(
        participants
            .iter()
            .map(|p| p.id().to_string())
            .chain(std::iter::once(terminal_id.clone()))
            .collect(),
    );

    let mut builder = WorkflowBuilder::new().start_with(start);
    for participant in &participants {
        builder = builder.add_edge(Edge::direct(participant.id(), terminal_id.clone()));
    }
    for participant in participants {
        let wrapped: Arc<dyn Executor> = Arc::new(HandoffRouter {
            known_ids: known_ids.clone(),
            terminal_id: terminal_id.clone(),
            inner: participant,
        });
        builder = builder.add_executor(wrapped);
    }
    builder.add_executor(terminal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorBuilder;
    use crate::runner::Runner;

    #[tokio::test]
    async fn unknown_next_speaker_falls_through_to_terminal() {
        let triage = Arc::new(
            ExecutorBuilder::new("triage")
                .on::<String, _, _>(|_topic, ctx| async move {
                    ctx.send_message("no specialist needed".to_string(), None);
                    Ok(())
                })
                .build(),
        );
        let specialist = Arc::new(
            ExecutorBuilder::new("specialist")
                .on::<String, _, _>(|s, ctx| async move {
                    ctx.send_message(s.to_string(), None);
                    Ok(())
                })
                .build(),
        );
        let terminal = Arc::new(
            ExecutorBuilder::new("terminal")
                .on::<String, _, _>(|s, ctx| async move {
                    ctx.yield_output(s.as_str());
                    Ok(())
                })
                .build(),
        );

        let workflow = Arc::new(handoff(vec![triage, specialist], terminal).build().unwrap());
        let runner = Runner::new(workflow);
        let result = runner.run("ticket".to_string()).await.unwrap();
        assert_eq!(result.outputs, vec![serde_json::json!("no specialist needed")]);
    }

    #[tokio::test]
    async fn unresolved_explicit_target_forwards_to_terminal() {
        let triage = Arc::new(
            ExecutorBuilder::new("triage")
                .on::<String, _, _>(|_topic, ctx| async move {
                    ctx.send_message("paged billing-team".to_string(), Some("billing-team"));
                    Ok(())
                })
                .build(),
        );
        let specialist = Arc::new(
            ExecutorBuilder::new("specialist")
                .on::<String, _, _>(|s, ctx| async move {
                    ctx.send_message(format!("handled:{s}"), None);
                    Ok(())
                })
                .build(),
        );
        let terminal = Arc::new(
            ExecutorBuilder::new("terminal")
                .on::<String, _, _>(|s, ctx| async move {
                    ctx.yield_output(s.as_str());
                    Ok(())
                })
                .build(),
        );

        // "billing-team" names neither a participant nor the terminal, so it
        // must forward to the terminal rather than being silently dropped.
        let workflow = Arc::new(handoff(vec![triage, specialist], terminal).build().unwrap());
        let runner = Runner::new(workflow);
        let result = runner.run("ticket".to_string()).await.unwrap();
        assert_eq!(result.outputs, vec![serde_json::json!("paged billing-team")]);
    }

    #[tokio::test]
    async fn explicit_target_hands_off_directly() {
        let triage = Arc::new(
            ExecutorBuilder::new("triage")
                .on::<String, _, _>(|_topic, ctx| async move {
                    ctx.send_message("escalated".to_string(), Some("specialist"));
                    Ok(())
                })
                .build(),
        );
        let specialist = Arc::new(
            ExecutorBuilder::new("specialist")
                .on::<String, _, _>(|s, ctx| async move {
                    ctx.send_message(format!("handled:{s}"), None);
                    Ok(())
                })
                .build(),
        );
        let terminal = Arc::new(
            ExecutorBuilder::new("terminal")
                .on::<String, _, _>(|s, ctx| async move {
                    ctx.yield_output(s.as_str());
                    Ok(())
                })
                .build(),
        );

        let workflow = Arc::new(handoff(vec![triage, specialist], terminal).build().unwrap());
        let runner = Runner::new(workflow);
        let result = runner.run("ticket".to_string()).await.unwrap();
        assert_eq!(result.outputs, vec![serde_json::json!("handled:escalated")]);
    }
}
