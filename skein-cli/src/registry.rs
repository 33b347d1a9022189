//! Default name bindings handed to [`skein::loader::Loader`] when running a
//! YAML workflow from the CLI. The CLI has no concrete model-provider client
//! (those are external collaborators) so `agent` nodes resolve against a
//! [`skein::MockChatClient`] unless the workflow only uses `function`/
//! `sub-workflow`/`request-info` nodes. A small set of pure string functions
//! is registered so sample workflows have something to call without writing
//! Rust.

use std::sync::Arc;

use skein::chat_client::MockChatClient;
use skein::loader::{MapAgentRegistry, MapFunctionRegistry, MapSelectorRegistry};
use skein::ChatClient;

pub fn default_agents() -> Arc<MapAgentRegistry> {
    let mock: Arc<dyn ChatClient> = Arc::new(MockChatClient::text("mock response"));
    Arc::new(MapAgentRegistry::new().with_chat_client("mock", mock))
}

pub fn default_functions() -> Arc<MapFunctionRegistry> {
    Arc::new(
        MapFunctionRegistry::new()
            .with_function("uppercase", |v: serde_json::Value| async move {
                Ok(serde_json::Value::String(v.as_str().unwrap_or_default().to_uppercase()))
            })
            .with_function("reverse", |v: serde_json::Value| async move {
                Ok(serde_json::Value::String(v.as_str().unwrap_or_default().chars().rev().collect()))
            })
            .with_function("identity", |v: serde_json::Value| async move { Ok(v) }),
    )
}

pub fn default_selectors() -> Arc<MapSelectorRegistry> {
    Arc::new(MapSelectorRegistry::new())
}
