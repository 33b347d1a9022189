use super::common;

#[tokio::test]
async fn listing_checkpoints_without_storage_is_not_implemented() {
    common::load_dotenv();
    let (url, shutdown, handle) = common::spawn_server().await;

    let resp = reqwest::get(format!("{url}/checkpoints")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_IMPLEMENTED);

    shutdown.cancel();
    let _ = handle.await;
}

#[tokio::test]
async fn resuming_an_unknown_checkpoint_is_not_found() {
    common::load_dotenv();
    let (url, shutdown, handle) = common::spawn_server().await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{url}/checkpoints/does-not-exist/resume"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_IMPLEMENTED);

    shutdown.cancel();
    let _ = handle.await;
}
