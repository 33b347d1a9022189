//! Axum router and the state shared by every handler: the bound `Workflow`
//! and the table of in-flight runs a `request_input` response can address.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use dashmap::DashMap;
use serde::Serialize;
use skein::{Runner, Workflow};

use crate::runs;

/// Shared state, cheap to clone (every field is an `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<Workflow>,
    /// Runs currently streaming a response, keyed by run id (or, for a
    /// resumed run, by the checkpoint id it resumed from). Entries are
    /// removed when their SSE stream is dropped.
    pub runs: Arc<DashMap<String, Arc<Runner>>>,
}

impl AppState {
    pub fn new(workflow: Arc<Workflow>) -> Self {
        Self { workflow, runs: Arc::new(DashMap::new()) }
    }
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

async fn healthz() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/runs", post(runs::start_run))
        .route("/runs/:run_id/responses", post(runs::respond_to_run))
        .route("/checkpoints", get(runs::list_checkpoints))
        .route("/checkpoints/:checkpoint_id/resume", post(runs::resume_checkpoint))
        .with_state(state)
}
