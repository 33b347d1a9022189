//! Session/thread store: the `Store` trait the core's embedded agent
//! executors use to persist conversation history and opaque agent state,
//! independent of the workflow checkpoint layer.

mod store;

pub use store::{Store, StoreError, StoredMessage};
