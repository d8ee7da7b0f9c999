//! Readiness multiplexer adapter (SPEC_FULL §4.1).
//!
//! A thin, level-triggered wrapper over epoll on Linux and kqueue on macOS
//! (the latter kept only so the engine can be developed off-target; the
//! io_uring dynamic path in `crate::aio` is Linux-only). Every registration
//! carries an opaque `u64` token — the connection's slab index, or
//! `LISTENER_TOKEN` for the listening socket — so the event loop never has
//! to look anything up by file descriptor.

#[cfg(target_os = "linux")]
mod epoll;
#[cfg(target_os = "linux")]
pub use epoll::Epoll as PlatformMultiplexer;

#[cfg(not(target_os = "linux"))]
mod kqueue;
#[cfg(not(target_os = "linux"))]
pub use kqueue::Kqueue as PlatformMultiplexer;

use std::os::unix::io::RawFd;

use crate::error::ReactorResult;

/// Sentinel token identifying the listening socket in `wait()` results.
pub const LISTENER_TOKEN: u64 = u64::MAX;

/// A single readiness notification.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub token: u64,
    pub readable: bool,
    pub writable: bool,
}

/// Registration intent: which directions a descriptor is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
    Both,
}

/// The readiness multiplexer adapter (§4.1).
///
/// Implementations must be level-triggered: a descriptor that is still
/// readable/writable after a dispatch keeps being reported on subsequent
/// `wait()` calls, so the state machine never has to fully drain a
/// descriptor within a single turn.
pub trait Multiplexer: Sized {
    fn new() -> ReactorResult<Self>;
    fn add(&self, fd: RawFd, token: u64, interest: Interest) -> ReactorResult<()>;
    fn modify(&self, fd: RawFd, token: u64, interest: Interest) -> ReactorResult<()>;
    fn remove(&self, fd: RawFd) -> ReactorResult<()>;
    /// Wait up to `timeout_ms` (negative = forever) and append ready events
    /// into `out`, returning how many were appended.
    fn wait(&self, out: &mut Vec<Event>, timeout_ms: i32) -> ReactorResult<usize>;
}
