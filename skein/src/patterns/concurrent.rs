//! Concurrent fan-out/fan-in orchestration: a dispatcher broadcasts one
//! message to every participant; an aggregator waits for all of their
//! replies and yields them combined, in participant-declaration order.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::edge::Edge;
use crate::executor::{Executor, ExecutorBuilder};
use crate::message::Message;
use crate::workflow::WorkflowBuilder;

const DISPATCHER_ID: &str = "__concurrent_dispatcher";
const AGGREGATOR_ID: &str = "__concurrent_aggregator";

/// Broadcasts `T` to every participant concurrently (`FanOut`, no selector)
/// and yields their combined replies as a JSON array (`FanIn`, ordered by
/// participant declaration) once every participant has answered.
pub fn concurrent<T>(participants: Vec<Arc<dyn Executor>>) -> WorkflowBuilder
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    assert!(!participants.is_empty(), "concurrent requires at least one participant");
    let participant_ids: Vec<String> = participants.iter().map(|p| p.id().to_string()).collect();

    let dispatcher = Arc::new(
        ExecutorBuilder::new(DISPATCHER_ID)
            .on::<T, _, _>(|payload, ctx| async move {
                ctx.send_message((*payload).clone(), None);
                Ok(())
            })
            .build(),
    );
    let aggregator = Arc::new(
        ExecutorBuilder::new(AGGREGATOR_ID)
            .on::<Vec<Value>, _, _>(|replies, ctx| async move {
                ctx.yield_output((*replies).clone());
                Ok(())
            })
            .build(),
    );

    let mut builder = WorkflowBuilder::new()
        .start_with(DISPATCHER_ID)
        .add_executor(dispatcher)
        .add_executor(aggregator)
        .add_edge(Edge::fan_out(DISPATCHER_ID, participant_ids.clone()))
        .add_edge(Edge::fan_in(participant_ids, AGGREGATOR_ID, Arc::new(combine_replies)));

    for participant in participants {
        builder = builder.add_executor(participant);
    }
    builder
}

fn combine_replies(replies: Vec<Message>) -> Message {
    let values: Vec<Value> = replies.iter().map(|m| m.to_json().unwrap_or(Value::Null)).collect();
    Message::new(values)
}
