mod common;
mod checkpoints;
mod health;
mod invalid_json;
mod run_sse;
