use std::io;
use thiserror::Error;

use crate::parser::ParseError;

/// Central error type for the reactor engine.
///
/// Never leaked out of a connection's handling — every variant that arises
/// while driving a connection funnels into `ConnState::ConnectionClosed`
/// (see `state_machine`). This type exists for the cases that legitimately
/// propagate past a single connection: configuration, bind, and multiplexer
/// setup failures that abort the process per SPEC_FULL §6/§7.
#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("request parse error: {0:?}")]
    Parse(#[from] ParseError),

    #[error("connection slab is full")]
    SlabFull,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("worker thread panicked: {0}")]
    WorkerPanic(String),
}

pub type ReactorResult<T> = Result<T, ReactorError>;
