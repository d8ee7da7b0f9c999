//! Event-driven static/dynamic file server engine.
//!
//! See `SPEC_FULL.md` for the full module map; `main.rs` wires
//! [`config`], [`telemetry`], and [`server`] together into the binary.

pub mod aio;
pub mod conn;
pub mod config;
pub mod error;
pub mod net;
pub mod parser;
pub mod reactor;
pub mod resolver;
pub mod response;
pub mod server;
pub mod slab;
pub mod state_machine;
pub mod static_sender;
pub mod telemetry;
pub mod worker;
