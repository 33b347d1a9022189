//! Conditional edge: routes to one of two targets based on a pure predicate
//! over the in-flight message, with no side effects.

use std::sync::Arc;

use serde_json::Value;
use skein::{Edge, ExecutorBuilder, Runner, WorkflowBuilder};

#[tokio::test]
async fn conditional_by_age_routes_adult_and_minor_differently() {
    let classify = Arc::new(
        ExecutorBuilder::new("classify")
            .on::<Value, _, _>(|v, ctx| async move {
                ctx.send_message((*v).clone(), None);
                Ok(())
            })
            .build(),
    );
    let adult = Arc::new(
        ExecutorBuilder::new("adult")
            .on::<Value, _, _>(|v, ctx| async move {
                ctx.yield_output(serde_json::json!({"branch": "adult", "person": *v}));
                Ok(())
            })
            .build(),
    );
    let minor = Arc::new(
        ExecutorBuilder::new("minor")
            .on::<Value, _, _>(|v, ctx| async move {
                ctx.yield_output(serde_json::json!({"branch": "minor", "person": *v}));
                Ok(())
            })
            .build(),
    );

    let is_adult = Arc::new(|msg: &skein::Message| {
        msg.downcast_ref::<Value>()
            .and_then(|v| v.get("age"))
            .and_then(Value::as_i64)
            .map(|age| age >= 18)
            .unwrap_or(false)
    });

    let workflow = Arc::new(
        WorkflowBuilder::new()
            .add_executor(classify)
            .add_executor(adult)
            .add_executor(minor)
            .start_with("classify")
            .add_edge(Edge::conditional("classify", is_adult, "adult", Some("minor".into())))
            .build()
            .unwrap(),
    );

    let runner = Runner::new(workflow.clone());
    let result = runner.run(serde_json::json!({"name": "Dana", "age": 30})).await.unwrap();
    assert_eq!(result.outputs[0]["branch"], "adult");

    let runner = Runner::new(workflow);
    let result = runner.run(serde_json::json!({"name": "Kim", "age": 12})).await.unwrap();
    assert_eq!(result.outputs[0]["branch"], "minor");
}
