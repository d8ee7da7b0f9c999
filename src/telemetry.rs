//! Structured logging setup (SPEC_FULL §10.4).
//!
//! Grounded on `chopin-core/src/logging.rs`'s `tracing-subscriber` +
//! `EnvFilter` idiom: `RUST_LOG` controls verbosity, defaulting to `info`
//! when unset. The periodic per-worker counter log itself lives in
//! `worker::run` — this module only wires up the subscriber those log lines
//! are emitted through.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
