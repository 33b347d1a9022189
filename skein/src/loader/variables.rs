//! Run-scoped variable storage: one `VariableScope` instance per run, read by
//! `condition` expressions and written by `set-variable` nodes.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

/// Ambient JSON-valued scope shared by every executor in one run. Reset
/// between runs by constructing a fresh `Loader` (and thus a fresh scope)
/// per `load` call.
pub struct VariableScope {
    vars: Mutex<HashMap<String, Value>>,
}

impl VariableScope {
    pub fn new(initial: HashMap<String, Value>) -> Self {
        Self { vars: Mutex::new(initial) }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.lock().unwrap().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.vars.lock().unwrap().insert(name.into(), value);
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.vars.lock().unwrap().clone()
    }
}

impl Default for VariableScope {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let scope = VariableScope::default();
        scope.set("approved", Value::Bool(true));
        assert_eq!(scope.get("approved"), Some(Value::Bool(true)));
        assert_eq!(scope.get("missing"), None);
    }

    #[test]
    fn new_seeds_initial_values() {
        let mut initial = HashMap::new();
        initial.insert("count".to_string(), Value::from(0));
        let scope = VariableScope::new(initial);
        assert_eq!(scope.get("count"), Some(Value::from(0)));
    }
}
