//! Shared helpers for e2e tests: spin up the server on an ephemeral port
//! with the uppercase-reverse sequential workflow from `skein`'s own tests,
//! and parse a `text/event-stream` response body into `skein::Event`s.

use std::sync::Arc;

use skein::{Event, Executor, ExecutorBuilder, Workflow};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Loads `.env` from the current directory so config-driven tests see the
/// same environment a real deployment would.
pub fn load_dotenv() {
    let _ = dotenv::dotenv();
}

fn uppercase_reverse_workflow() -> Arc<Workflow> {
    let upper: Arc<dyn Executor> = Arc::new(
        ExecutorBuilder::new("upper")
            .on::<String, _, _>(|s, ctx| async move {
                ctx.send_message(s.to_uppercase(), None);
                Ok(())
            })
            .build(),
    );
    let reverse: Arc<dyn Executor> = Arc::new(
        ExecutorBuilder::new("reverse")
            .on::<String, _, _>(|s, ctx| async move {
                ctx.yield_output(s.chars().rev().collect::<String>());
                Ok(())
            })
            .build(),
    );
    Arc::new(skein::patterns::sequential(vec![upper, reverse]).build().unwrap())
}

/// Binds to a random port, serves `workflow` (default: uppercase-reverse),
/// and returns the base URL plus a handle that stops the server when
/// dropped or explicitly cancelled.
pub async fn spawn_server() -> (String, CancellationToken, tokio::task::JoinHandle<()>) {
    spawn_server_with(uppercase_reverse_workflow()).await
}

pub async fn spawn_server_with(
    workflow: Arc<Workflow>,
) -> (String, CancellationToken, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("http://{}", addr);
    let token = CancellationToken::new();
    let shutdown_token = token.clone();
    let (ready_tx, ready_rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        let _ = ready_tx.send(());
        let _ = skein_serve::run_serve_on_listener(listener, workflow, async move {
            shutdown_token.cancelled().await;
        })
        .await;
    });
    let _ = ready_rx.await;
    (url, token, handle)
}

/// Splits an SSE response body into `(event name, parsed Event)` pairs, in
/// arrival order. Ignores keep-alive comment lines.
pub fn parse_sse_events(body: &str) -> Vec<(String, Event)> {
    let mut out = Vec::new();
    let mut event_name: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();
    for line in body.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event_name = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim());
        } else if line.is_empty() {
            if let (Some(name), false) = (event_name.take(), data_lines.is_empty()) {
                let joined = data_lines.join("\n");
                data_lines.clear();
                if let Ok(event) = serde_json::from_str::<Event>(&joined) {
                    out.push((name, event));
                }
            } else {
                data_lines.clear();
            }
        }
    }
    out
}
