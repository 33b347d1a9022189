//! Stream event protocol: type + payload + envelope.
//!
//! This crate defines the wire shape of a single stream event and envelope injection,
//! independent of any particular workflow engine's event model. A consumer bridges its
//! own event type into `ProtocolEvent` and calls `to_json` to apply envelope fields.

pub mod envelope;
pub mod event;

pub use envelope::{to_json, Envelope, EnvelopeState};
pub use event::ProtocolEvent;
