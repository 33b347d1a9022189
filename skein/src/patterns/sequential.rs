//! Sequential orchestration: participants run one after another, each
//! feeding its reply straight to the next.

use std::sync::Arc;

use crate::executor::Executor;
use crate::workflow::WorkflowBuilder;

/// Chains `participants` with `Direct` edges, `a -> b -> c -> ...`. The
/// final participant is expected to call `Context::yield_output` rather than
/// `send_message`; nothing is wired downstream of it.
pub fn sequential(participants: Vec<Arc<dyn Executor>>) -> WorkflowBuilder {
    assert!(!participants.is_empty(), "sequential requires at least one participant");
    let ids: Vec<String> = participants.iter().map(|p| p.id().to_string()).collect();
    let start = ids[0].clone();

    let mut builder = WorkflowBuilder::new().start_with(start);
    for participant in participants {
        builder = builder.add_executor(participant);
    }
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    builder.chain(&id_refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorBuilder;
    use crate::runner::Runner;

    #[tokio::test]
    async fn three_participants_run_in_order() {
        let upper = Arc::new(
            ExecutorBuilder::new("upper")
                .on::<String, _, _>(|s, ctx| async move {
                    ctx.send_message(s.to_uppercase(), None);
                    Ok(())
                })
                .build(),
        );
        let reverse = Arc::new(
            ExecutorBuilder::new("reverse")
                .on::<String, _, _>(|s, ctx| async move {
                    ctx.send_message(s.chars().rev().collect::<String>(), None);
                    Ok(())
                })
                .build(),
        );
        let finish = Arc::new(
            ExecutorBuilder::new("finish")
                .on::<String, _, _>(|s, ctx| async move {
                    ctx.yield_output(s.as_str());
                    Ok(())
                })
                .build(),
        );

        let workflow = Arc::new(sequential(vec![upper, reverse, finish]).build().unwrap());
        let runner = Runner::new(workflow);
        let result = runner.run("abc".to_string()).await.unwrap();
        assert_eq!(result.outputs, vec![serde_json::json!("CBA")]);
    }
}
