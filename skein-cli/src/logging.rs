//! Initializes `tracing`: `RUST_LOG`-driven env filter, plain-text output via
//! [`crate::log_format::TextWithSpanIds`] so trace/span ids line up with the
//! `executor_id` fields the core crate logs alongside each dispatch.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::log_format::TextWithSpanIds;

pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(TextWithSpanIds::new())
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .try_init()
        .map_err(|e| e.into())
}
