use super::common;

#[tokio::test]
async fn malformed_run_body_is_rejected() {
    common::load_dotenv();
    let (url, shutdown, handle) = common::spawn_server().await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{url}/runs"))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_client_error());

    shutdown.cancel();
    let _ = handle.await;
}
