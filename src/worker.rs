//! A single reactor instance: one accept loop, one [`Multiplexer`], one
//! [`ConnectionSlab`] (SPEC_FULL §4.1, §10.3).
//!
//! Grounded on `chopin/src/worker.rs`'s event loop shape (wait, then
//! dispatch readable/writable events by token against a slab), stripped of
//! the teacher's stale-connection sweep and keep-alive bookkeeping — both
//! exist there only to support persistent connections, which SPEC_FULL §5/§9
//! explicitly excludes (every response is `Connection: close`).

use std::os::unix::io::RawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::conn::{ConnState, Connection};
use crate::error::ReactorResult;
use crate::net::{self, accept_connection};
use crate::reactor::{Event, Interest, Multiplexer, PlatformMultiplexer, LISTENER_TOKEN};
use crate::slab::ConnectionSlab;
use crate::state_machine::{self, ReactorAction, ServingConfig};

const POLL_TIMEOUT_MS: i32 = 200;

/// How often `run`'s loop logs the counters §10.4 asks for. Driven off the
/// same wait cadence as `POLL_TIMEOUT_MS` rather than a separate timer
/// thread — checked once per wait-wakeup, which at a 200ms poll timeout is
/// frequent enough that an idle reactor still ticks this on schedule.
const STATS_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Lightweight per-worker counters (§10.4): active connections, cumulative
/// requests served, and cumulative bytes written. Plain counters, not
/// atomics — a worker's `run` loop is the only thing that ever touches its
/// own `WorkerStats`.
#[derive(Default)]
struct WorkerStats {
    requests_served: u64,
    bytes_written: u64,
}

pub struct WorkerConfig {
    pub listen_fd: RawFd,
    pub buffer_size: usize,
    pub max_connections: usize,
    pub static_prefix: String,
    pub dynamic_prefix: String,
    pub root: PathBuf,
    pub shutdown: Arc<AtomicBool>,
}

/// Run one reactor to completion (until `shutdown` is observed). Intended
/// to be the body of one worker thread in the pool `server` spawns — every
/// worker owns an entirely independent multiplexer and slab, per §10.3.
pub fn run(cfg: WorkerConfig) -> ReactorResult<()> {
    let mux = PlatformMultiplexer::new()?;
    mux.add(cfg.listen_fd, LISTENER_TOKEN, Interest::Readable)?;

    let mut slab = ConnectionSlab::new(cfg.max_connections);
    let mut events = Vec::with_capacity(cfg.max_connections.min(1024));
    let serving = ServingConfig {
        static_prefix: &cfg.static_prefix,
        dynamic_prefix: &cfg.dynamic_prefix,
        root: &cfg.root,
    };
    let mut stats = WorkerStats::default();
    let mut last_stats_log = Instant::now();

    info!(
        max_connections = cfg.max_connections,
        buffer_size = cfg.buffer_size,
        "reactor started"
    );

    while !cfg.shutdown.load(Ordering::Relaxed) {
        let n = mux.wait(&mut events, POLL_TIMEOUT_MS)?;

        for event in events.drain(..n) {
            if event.token == LISTENER_TOKEN {
                accept_all(&cfg, &mux, &mut slab)?;
                continue;
            }

            dispatch(&mux, &mut slab, &serving, event, &mut stats);
        }

        if last_stats_log.elapsed() >= STATS_LOG_INTERVAL {
            info!(
                active_connections = slab.active_count(),
                requests_served = stats.requests_served,
                bytes_written = stats.bytes_written,
                "worker stats"
            );
            last_stats_log = Instant::now();
        }
    }

    info!("reactor shutting down");
    Ok(())
}

fn accept_all(
    cfg: &WorkerConfig,
    mux: &PlatformMultiplexer,
    slab: &mut ConnectionSlab,
) -> ReactorResult<()> {
    loop {
        let client_fd = match accept_connection(cfg.listen_fd)? {
            None => return Ok(()),
            Some(fd) => fd,
        };

        let conn = Connection::new(client_fd, cfg.buffer_size);
        let Some(idx) = slab.insert(conn) else {
            warn!("connection table full, dropping new connection");
            unsafe {
                libc::close(client_fd);
            }
            continue;
        };

        if let Err(e) = mux.add(client_fd, idx as u64, Interest::Readable) {
            error!(error = %e, "failed to register new connection");
            slab.remove(idx);
        } else {
            debug!(slot = idx, "accepted connection");
        }
    }
}

fn dispatch(
    mux: &PlatformMultiplexer,
    slab: &mut ConnectionSlab,
    serving: &ServingConfig,
    event: Event,
    stats: &mut WorkerStats,
) {
    let idx = event.token as usize;

    // A completion-descriptor event is routed by fd, not by slab index, so
    // we must first check whether this token belongs to a connection at
    // all; tokens for completion descriptors are distinguished in
    // `conn_token_kind` below.
    let Some(kind) = conn_token_kind(slab, idx, event) else {
        return;
    };

    let action = match kind {
        TokenKind::Client => run_client_handlers(slab, idx, serving, event),
        TokenKind::Completion => {
            let Some(conn) = slab.get_mut(idx) else {
                return;
            };
            state_machine::on_completion(conn)
        }
    };

    apply_action(mux, slab, idx, action, stats);
}

enum TokenKind {
    Client,
    Completion,
}

/// A client fd and its connection's completion fd never collide because
/// completion descriptors are never registered with the slab index as their
/// token — `state_machine::ReactorAction::WatchCompletion` instead hands the
/// worker the raw completion fd, which we register keyed on the *same* slab
/// index (a connection is only ever in one of "waiting on client" or
/// "waiting on completion" at a time, per §4.7's at-most-one-in-flight
/// invariant), so one token always means exactly one thing for a given
/// connection's current state.
fn conn_token_kind(slab: &ConnectionSlab, idx: usize, _event: Event) -> Option<TokenKind> {
    let conn = slab.get(idx)?;
    Some(match conn.state {
        ConnState::AsyncOngoing => TokenKind::Completion,
        _ => TokenKind::Client,
    })
}

fn run_client_handlers(
    slab: &mut ConnectionSlab,
    idx: usize,
    serving: &ServingConfig,
    event: Event,
) -> ReactorResult<ReactorAction> {
    let Some(conn) = slab.get_mut(idx) else {
        return Ok(ReactorAction::None);
    };

    if event.readable {
        match conn.state {
            ConnState::Initial | ConnState::Receiving => {
                let action = state_machine::on_readable(conn, serving)?;
                if !matches!(action, ReactorAction::None) {
                    return Ok(action);
                }
            }
            _ => {}
        }
    }

    if event.writable {
        match conn.state {
            ConnState::SendingHeader
            | ConnState::Sending404
            | ConnState::SendingData
            | ConnState::DataSent => {
                return state_machine::on_writable(conn);
            }
            _ => {}
        }
    }

    Ok(ReactorAction::None)
}

fn apply_action(
    mux: &PlatformMultiplexer,
    slab: &mut ConnectionSlab,
    idx: usize,
    action: ReactorResult<ReactorAction>,
    stats: &mut WorkerStats,
) {
    let action = match action {
        Ok(action) => action,
        Err(e) => {
            warn!(error = %e, slot = idx, "connection error, closing");
            let _ = mux.remove(slab.get(idx).map(|c| c.client_fd).unwrap_or(-1));
            close_connection(slab, idx, stats);
            return;
        }
    };

    match action {
        ReactorAction::None => {
            if let Some(conn) = slab.get(idx) {
                let _ = mux.modify(conn.client_fd, idx as u64, interest_for_state(conn.state));
            }
        }
        ReactorAction::WatchCompletion(fd) => {
            // While a disk read is outstanding the client fd has nothing
            // useful to report (the response is "paused"); unregistering it
            // also frees up the token so the completion descriptor can reuse
            // the same slab index unambiguously.
            if let Some(conn) = slab.get(idx) {
                let _ = mux.remove(conn.client_fd);
            }
            let _ = mux.add(fd, idx as u64, Interest::Readable);
        }
        ReactorAction::UnwatchCompletion(fd) => {
            let _ = mux.remove(fd);
            if let Some(conn) = slab.get(idx) {
                if conn.state == ConnState::ConnectionClosed {
                    close_connection(slab, idx, stats);
                } else {
                    let _ = mux.add(conn.client_fd, idx as u64, interest_for_state(conn.state));
                }
            }
        }
        ReactorAction::Close => {
            if let Some(conn) = slab.get(idx) {
                let _ = mux.remove(conn.client_fd);
            }
            close_connection(slab, idx, stats);
        }
    }
}

/// Fold a connection's final counters into the worker's running totals
/// before freeing its slab slot (§10.4). Only a connection that reached
/// `DataSent` (a complete response — 200 or 404, both count) is tallied as
/// a served request; a connection that closed mid-receive or mid-transfer
/// never got a response out and isn't one.
fn close_connection(slab: &mut ConnectionSlab, idx: usize, stats: &mut WorkerStats) {
    if let Some(conn) = slab.get(idx) {
        if conn.state == ConnState::DataSent {
            stats.requests_served += 1;
        }
        stats.bytes_written += conn.bytes_sent;
    }
    slab.remove(idx);
}

fn interest_for_state(state: ConnState) -> Interest {
    match state {
        ConnState::Initial | ConnState::Receiving => Interest::Readable,
        ConnState::SendingHeader | ConnState::Sending404 | ConnState::SendingData | ConnState::DataSent => {
            Interest::Writable
        }
        ConnState::RequestReceived | ConnState::AsyncOngoing | ConnState::ConnectionClosed => {
            Interest::Readable
        }
    }
}

/// Small helper re-exported so `server` doesn't need to reach into `net`
/// directly for listener setup.
pub fn bind_listener(addr: std::net::SocketAddr) -> ReactorResult<RawFd> {
    net::create_listener(addr)
}

#[allow(dead_code)]
fn _poll_timeout() -> Duration {
    Duration::from_millis(POLL_TIMEOUT_MS as u64)
}
