//! `patterns::concurrent`: one message broadcast to three participants,
//! their replies collected back into a single array. Run with:
//!
//!   cargo run -p demos --example concurrent_fan_out

use std::sync::Arc;

use skein::{concurrent, ExecutorBuilder, Runner};

#[tokio::main]
async fn main() {
    let participants: Vec<_> = ["alpha", "beta", "gamma"]
        .into_iter()
        .map(|name| {
            Arc::new(
                ExecutorBuilder::new(name)
                    .on::<String, _, _>(move |s, ctx| async move {
                        ctx.send_message(format!("{name}:{s}"), None);
                        Ok(())
                    })
                    .build(),
            ) as Arc<dyn skein::Executor>
        })
        .collect();

    let workflow = concurrent::<String>(participants).build().expect("workflow builds");
    let runner = Runner::new(Arc::new(workflow));
    let result = runner.run("ping".to_string()).await.expect("run succeeds");
    println!("{:?}", result.outputs);
}
