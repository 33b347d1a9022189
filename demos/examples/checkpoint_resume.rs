//! Runs a chain with `checkpoint_every_step` against an in-memory store,
//! lists what was saved, then resumes from the latest checkpoint. Run with:
//!
//!   cargo run -p demos --example checkpoint_resume

use std::sync::Arc;

use skein::{CheckpointStorage, ExecutorBuilder, InMemoryCheckpointStorage, Runner, WorkflowBuilder};

#[tokio::main]
async fn main() {
    let storage = Arc::new(InMemoryCheckpointStorage::new());

    let upper = Arc::new(
        ExecutorBuilder::new("upper")
            .on::<String, _, _>(|s, ctx| async move {
                ctx.send_message(s.to_uppercase(), None);
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

    let workflow = Arc::new(
        WorkflowBuilder::new()
            .start_with("upper")
            .add_executor(upper)
            .add_executor(finish)
            .chain(&["upper", "finish"])
            .checkpoint_storage(storage.clone())
            .checkpoint_every_step(true)
            .build()
            .expect("workflow builds"),
    );

    let runner = Runner::new(workflow.clone());
    let result = runner.run("hello".to_string()).await.expect("run succeeds");
    println!("first run outputs: {:?}", result.outputs);

    let summaries = storage.list().await.expect("list succeeds");
    println!("checkpoints saved: {}", summaries.len());

    let latest = summaries.last().expect("at least one checkpoint was saved");
    let checkpoint = storage.load(&latest.checkpoint_id).await.expect("load succeeds").expect("checkpoint exists");

    let resumed = Runner::new(workflow);
    let result = resumed.resume_from_checkpoint(checkpoint).await.expect("resume succeeds");
    println!("resumed outputs: {:?}", result.outputs);
}
