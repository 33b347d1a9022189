//! Three hand-built executors chained with `Edge::direct`, the shape
//! `patterns::sequential` generalizes. Run with:
//!
//!   cargo run -p demos --example hand_built_chain

use std::sync::Arc;

use skein::{ExecutorBuilder, Runner, WorkflowBuilder};

#[tokio::main]
async fn main() {
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
                ctx.yield_output(s);
                Ok(())
            })
            .build(),
    );

    let workflow = WorkflowBuilder::new()
        .start_with("upper")
        .add_executor(upper)
        .add_executor(reverse)
        .add_executor(finish)
        .chain(&["upper", "reverse", "finish"])
        .build()
        .expect("workflow builds");

    let runner = Runner::new(Arc::new(workflow));
    let result = runner.run("hello world".to_string()).await.expect("run succeeds");
    println!("{:?}", result.outputs);
}
