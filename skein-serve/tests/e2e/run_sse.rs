use skein::{Event, WorkflowState};

use super::common;

#[tokio::test]
async fn post_runs_streams_executor_events_and_final_output() {
    common::load_dotenv();
    let (url, shutdown, handle) = common::spawn_server().await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{url}/runs"))
        .json(&serde_json::json!({ "input": "hello world" }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers().get("content-type").and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );
    let body = resp.text().await.unwrap();
    let events = common::parse_sse_events(&body);

    assert!(events.iter().any(|(name, e)| name == "executor_invoked"
        && matches!(e, Event::ExecutorInvoked { executor_id, .. } if executor_id == "upper")));
    assert!(events
        .iter()
        .any(|(name, _)| name == "executor_completed"));

    let output = events.iter().find_map(|(_, e)| match e {
        Event::WorkflowOutput { payload, .. } => Some(payload.clone()),
        _ => None,
    });
    assert_eq!(output, Some(serde_json::json!("DLROW OLLEH")));

    let final_state = events.iter().rev().find_map(|(_, e)| match e {
        Event::WorkflowStatus { state } => Some(*state),
        _ => None,
    });
    assert_eq!(final_state, Some(WorkflowState::Completed));

    shutdown.cancel();
    let _ = handle.await;
}

#[tokio::test]
async fn respond_to_unknown_run_returns_not_found() {
    common::load_dotenv();
    let (url, shutdown, handle) = common::spawn_server().await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{url}/runs/does-not-exist/responses"))
        .json(&serde_json::json!({ "request_id": "r1", "data": "reply" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    shutdown.cancel();
    let _ = handle.await;
}
