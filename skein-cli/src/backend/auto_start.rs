//! Auto-start server when a remote run is requested but nothing answers at
//! the configured URL.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

const POLL_INTERVAL_MS: u64 = 200;
const MAX_WAIT_MS: u64 = 15000;

/// Spawns `skein serve <workflow_path>` in the background so the server
/// stays up for this and future runs; returns once the process is started.
pub fn spawn_serve(workflow_path: &Path, addr: &str) -> Result<std::process::Child, std::io::Error> {
    let exe = std::env::current_exe()?;
    std::process::Command::new(exe)
        .arg("serve")
        .arg(workflow_path)
        .arg("--addr")
        .arg(addr)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
}

/// Polls `{base_url}/healthz` until it answers 200 or timeout.
pub async fn wait_for_server(base_url: &str) -> bool {
    let start = std::time::Instant::now();
    let max_wait = Duration::from_millis(MAX_WAIT_MS);
    let interval = Duration::from_millis(POLL_INTERVAL_MS);
    let client = reqwest::Client::new();

    while start.elapsed() < max_wait {
        if client
            .get(format!("{base_url}/healthz"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
        {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

/// Checks `{base_url}/healthz`; on connection refused, spawns a server bound
/// to `workflow_path` on `addr` and waits for it to come up.
pub async fn ensure_server_or_spawn(base_url: &str, addr: &str, workflow_path: &Path) -> Result<(), String> {
    let client = reqwest::Client::new();
    match client.get(format!("{base_url}/healthz")).send().await {
        Ok(r) if r.status().is_success() => return Ok(()),
        Ok(_) => {}
        Err(e) if e.is_connect() => {}
        Err(e) => return Err(e.to_string()),
    }

    eprintln!("skein: remote not running, starting server...");
    spawn_serve(workflow_path, addr).map_err(|e| e.to_string())?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    if wait_for_server(base_url).await {
        Ok(())
    } else {
        Err("server failed to become ready".to_string())
    }
}
