//! Type-erased message envelope.
//!
//! A message is any `T: Serialize + Send + Sync + 'static` wrapped behind an
//! `Arc<dyn Any>` plus a cached `TypeId`/type-name tag and its JSON encoding
//! (computed eagerly, since checkpoint capture needs it and most payloads are
//! small). Handlers downcast to their declared input type; the runtime never
//! needs to know concrete payload types.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

/// Marker used to register a catch-all handler that runs when no exact-type
/// handler matches (see `Executor` dispatch rules).
pub struct AnyMessage;

/// A type-erased, cheaply-cloneable message payload routed between executors.
#[derive(Clone)]
pub struct Message {
    type_id: TypeId,
    type_name: &'static str,
    payload: Arc<dyn Any + Send + Sync>,
    json: Option<Value>,
}

impl Message {
    /// Wraps `value` as a message. The runtime tags it with `T`'s `TypeId`
    /// and eagerly encodes it to JSON for checkpoint capture.
    pub fn new<T: Serialize + Send + Sync + 'static>(value: T) -> Self {
        let json = serde_json::to_value(&value).ok();
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            payload: Arc::new(value),
            json,
        }
    }

    /// Wraps an already-shared value without cloning its contents.
    pub fn from_arc<T: Serialize + Send + Sync + 'static>(value: Arc<T>) -> Self {
        let json = serde_json::to_value(value.as_ref()).ok();
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            payload: value,
            json,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The JSON encoding captured at construction time, used by the
    /// checkpoint layer to persist the pending queue. `None` when the
    /// payload failed to serialize.
    pub fn to_json(&self) -> Option<Value> {
        self.json.clone()
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Downcasts to the shared payload. Returns `self` unchanged on mismatch
    /// so a dispatcher can try the next candidate handler without copying.
    pub fn downcast<T: Send + Sync + 'static>(self) -> Result<Arc<T>, Message> {
        if self.type_id != TypeId::of::<T>() {
            return Err(self);
        }
        let json = self.json.clone();
        match self.payload.downcast::<T>() {
            Ok(value) => Ok(value),
            Err(payload) => Err(Message {
                type_id: self.type_id,
                type_name: self.type_name,
                payload,
                json,
            }),
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message").field("type", &self.type_name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_and_downcast_ref_roundtrip() {
        let msg = Message::new(42i32);
        assert!(msg.is::<i32>());
        assert_eq!(msg.downcast_ref::<i32>(), Some(&42));
        assert_eq!(msg.downcast_ref::<String>(), None);
    }

    #[test]
    fn downcast_mismatch_returns_original_message() {
        let msg = Message::new("hello".to_string());
        let msg = match msg.downcast::<i32>() {
            Ok(_) => panic!("should not downcast"),
            Err(msg) => msg,
        };
        assert_eq!(msg.downcast_ref::<String>(), Some(&"hello".to_string()));
    }

    #[test]
    fn downcast_owned_success_consumes_message() {
        let msg = Message::new(vec![1, 2, 3]);
        let value = msg.downcast::<Vec<i32>>().unwrap();
        assert_eq!(*value, vec![1, 2, 3]);
    }
}
