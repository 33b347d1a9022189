//! Caller-supplied name resolution for the declarative loader. The loader
//! itself never constructs a `ChatClient`, tool handler, or function body —
//! it only resolves the names written in the YAML spec against these
//! registries, mirroring how the embedded-YAML tool specs are merged against
//! Rust-registered tool implementations rather than replacing them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::chat_client::ChatClient;
use crate::edge::FanOutSelector;
use crate::error::WorkflowError;
use crate::executor::BoxFuture;
use crate::tool::Tool;

/// A named function body a `function` node dispatches to.
pub type LoaderFunction = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, WorkflowError>> + Send + Sync>;

/// Resolves `agent` node bindings: a named `ChatClient` handle plus named tools.
pub trait AgentRegistry: Send + Sync {
    fn chat_client(&self, name: &str) -> Option<Arc<dyn ChatClient>>;
    fn tool(&self, name: &str) -> Option<Tool>;
}

/// Resolves `function` node bindings.
pub trait FunctionRegistry: Send + Sync {
    fn function(&self, name: &str) -> Option<LoaderFunction>;
}

/// Resolves `selector` names on `fan-out` edges.
pub trait SelectorRegistry: Send + Sync {
    fn selector(&self, name: &str) -> Option<FanOutSelector>;
}

/// A plain `HashMap`-backed `AgentRegistry`.
#[derive(Default)]
pub struct MapAgentRegistry {
    chat_clients: HashMap<String, Arc<dyn ChatClient>>,
    tools: HashMap<String, Tool>,
}

impl MapAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chat_client(mut self, name: impl Into<String>, client: Arc<dyn ChatClient>) -> Self {
        self.chat_clients.insert(name.into(), client);
        self
    }

    pub fn with_tool(mut self, name: impl Into<String>, tool: Tool) -> Self {
        self.tools.insert(name.into(), tool);
        self
    }
}

impl AgentRegistry for MapAgentRegistry {
    fn chat_client(&self, name: &str) -> Option<Arc<dyn ChatClient>> {
        self.chat_clients.get(name).cloned()
    }

    fn tool(&self, name: &str) -> Option<Tool> {
        self.tools.get(name).cloned()
    }
}

/// A plain `HashMap`-backed `FunctionRegistry`.
#[derive(Default)]
pub struct MapFunctionRegistry {
    functions: HashMap<String, LoaderFunction>,
}

impl MapFunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` to call `f(arguments).await` when a `function` node
    /// dispatches.
    pub fn with_function<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, WorkflowError>> + Send + 'static,
    {
        let f = Arc::new(f);
        let boxed: LoaderFunction = Arc::new(move |value| {
            let f = f.clone();
            Box::pin(async move { f(value).await })
        });
        self.functions.insert(name.into(), boxed);
        self
    }
}

impl FunctionRegistry for MapFunctionRegistry {
    fn function(&self, name: &str) -> Option<LoaderFunction> {
        self.functions.get(name).cloned()
    }
}

/// A plain `HashMap`-backed `SelectorRegistry`.
#[derive(Default)]
pub struct MapSelectorRegistry {
    selectors: HashMap<String, FanOutSelector>,
}

impl MapSelectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selector(mut self, name: impl Into<String>, selector: FanOutSelector) -> Self {
        self.selectors.insert(name.into(), selector);
        self
    }
}

impl SelectorRegistry for MapSelectorRegistry {
    fn selector(&self, name: &str) -> Option<FanOutSelector> {
        self.selectors.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn function_registry_dispatches_registered_closure() {
        let registry = MapFunctionRegistry::new()
            .with_function("double", |v: Value| async move {
                let n = v.as_i64().unwrap_or(0);
                Ok(Value::from(n * 2))
            });
        let f = registry.function("double").unwrap();
        let result = f(Value::from(21)).await.unwrap();
        assert_eq!(result, Value::from(42));
        assert!(registry.function("missing").is_none());
    }
}
