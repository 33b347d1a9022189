use super::common;

#[tokio::test]
async fn healthz_reports_ok() {
    common::load_dotenv();
    let (url, shutdown, handle) = common::spawn_server().await;

    let resp = reqwest::get(format!("{url}/healthz")).await.unwrap();
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    shutdown.cancel();
    let _ = handle.await;
}
