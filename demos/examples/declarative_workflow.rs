//! Loads a YAML workflow spec (see `demos/workflows/shout.yaml`) and runs
//! it, resolving its `function` nodes against a `MapFunctionRegistry`. Run
//! with:
//!
//!   cargo run -p demos --example declarative_workflow

use std::sync::Arc;

use serde_json::Value;
use skein::loader::{MapAgentRegistry, MapFunctionRegistry, MapSelectorRegistry};
use skein::{Loader, Runner};

#[tokio::main]
async fn main() {
    let functions = MapFunctionRegistry::new()
        .with_function("shout", |v: Value| async move {
            Ok(Value::String(v.as_str().unwrap_or_default().to_uppercase()))
        })
        .with_function("exclaim", |v: Value| async move {
            Ok(Value::String(format!("{}!", v.as_str().unwrap_or_default())))
        });

    let loader = Loader::new(
        Arc::new(MapAgentRegistry::new()),
        Arc::new(functions),
        Arc::new(MapSelectorRegistry::new()),
    );

    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/workflows/shout.yaml");
    let loaded = loader.load_file(path).expect("workflow spec loads");
    let workflow = loaded.builder.build().expect("workflow builds");

    let runner = Runner::new(Arc::new(workflow));
    let result = runner.run(Value::String("hi there".into())).await.expect("run succeeds");
    println!("{:?}", result.outputs);
}
