//! The connection state machine's read/write/completion handlers (SPEC_FULL
//! §4.8).
//!
//! Grounded on `aws.c::handle_input` / `handle_output` / `update_states`:
//! those three functions are flattened here into `on_readable`,
//! `on_writable`, and `on_completion`, each a single `match` over
//! [`ConnState`] that either advances the tag or reports it needs another
//! event. The reactor-registration side effects a transition requires
//! (watching/unwatching the completion descriptor) are returned as a
//! [`ReactorAction`] rather than performed here, so this module stays free
//! of any multiplexer dependency — `worker` is the only place that holds
//! one.

use std::path::Path;

use crate::aio::AsyncIoContext;
use crate::conn::{ConnState, Connection, ResourceKind};
use crate::error::ReactorResult;
use crate::net::{read_nonblocking, write_nonblocking};
use crate::parser::{self, ParseError};
use crate::resolver;
use crate::response;
use crate::static_sender::{self, SendOutcome};

use std::os::unix::io::RawFd;

/// What the caller (`worker`) must do to the multiplexer registration after
/// a handler call returns.
pub enum ReactorAction {
    /// No registration change needed.
    None,
    /// Start watching `fd` for readability (a completion descriptor was
    /// just created).
    WatchCompletion(RawFd),
    /// Stop watching `fd` (its completion already consumed).
    UnwatchCompletion(RawFd),
    /// The connection is done; tear it down and free its slab slot.
    Close,
}

/// Static configuration every handler call needs: the URL prefixes that
/// `resolver::classify` checks and the directory resource paths resolve
/// against.
pub struct ServingConfig<'a> {
    pub static_prefix: &'a str,
    pub dynamic_prefix: &'a str,
    pub root: &'a Path,
}

/// Drive a readable `client_fd` event. Valid in [`ConnState::Initial`] and
/// [`ConnState::Receiving`]; called repeatedly as more of the request
/// arrives.
pub fn on_readable(conn: &mut Connection, cfg: &ServingConfig) -> ReactorResult<ReactorAction> {
    debug_assert!(matches!(
        conn.state,
        ConnState::Initial | ConnState::Receiving
    ));

    loop {
        if conn.recv_len == conn.recv_buffer.len() {
            // Request line + headers exceed the buffer — reject rather than
            // grow unboundedly (§7: oversized request).
            prepare_404(conn);
            return Ok(ReactorAction::None);
        }

        match read_nonblocking(conn.client_fd, &mut conn.recv_buffer[conn.recv_len..])? {
            None => {
                conn.state = ConnState::Receiving;
                return Ok(ReactorAction::None);
            }
            Some(0) => {
                conn.state = ConnState::ConnectionClosed;
                return Ok(ReactorAction::Close);
            }
            Some(n) => {
                let scanned_from = conn.headers_scanned;
                conn.recv_len += n;
                conn.headers_scanned = conn.recv_len;

                match parser::find_headers_end(&conn.recv_buffer[..conn.recv_len], scanned_from) {
                    None => {
                        conn.state = ConnState::Receiving;
                        continue;
                    }
                    Some(_) => {
                        return finish_request(conn, cfg);
                    }
                }
            }
        }
    }
}

fn finish_request(conn: &mut Connection, cfg: &ServingConfig) -> ReactorResult<ReactorAction> {
    match parser::parse_request(&conn.recv_buffer[..conn.recv_len]) {
        Err(ParseError::Incomplete) => {
            conn.state = ConnState::Receiving;
            Ok(ReactorAction::None)
        }
        Err(ParseError::InvalidFormat) => {
            prepare_404(conn);
            Ok(ReactorAction::None)
        }
        Ok(parsed) => {
            // §4.3: trailing bytes after the terminator (a pipelined second
            // request, a body, stray data) mean this isn't a single clean
            // request — reject rather than silently parsing a prefix of it.
            if parsed.consumed != conn.recv_len {
                prepare_404(conn);
                return Ok(ReactorAction::None);
            }
            conn.request_path = parsed.path.to_string();
            conn.have_path = true;
            conn.state = ConnState::RequestReceived;
            prepare_response(conn, cfg);
            Ok(ReactorAction::None)
        }
    }
}

/// §4.4: classify the path, try to open the resource, and build whichever
/// header the outcome calls for. Mirrors `connection_prepare_send_reply_header`
/// and `connection_prepare_send_404` being chosen by `connection_get_resource_type`
/// in the reference implementation.
fn prepare_response(conn: &mut Connection, cfg: &ServingConfig) {
    let kind = resolver::classify(&conn.request_path, cfg.static_prefix, cfg.dynamic_prefix);

    if kind == ResourceKind::None {
        prepare_404(conn);
        return;
    }

    match resolver::open_resource(&conn.request_path, kind, cfg.root) {
        None => prepare_404(conn),
        Some(opened) => {
            conn.resource_kind = opened.kind;
            conn.filename = opened.filename;
            conn.file_fd = opened.file_fd;
            conn.file_size = opened.file_size;
            conn.file_pos = 0;
            conn.last_modified = Some(opened.last_modified);

            let header_len =
                response::build_200_header(&mut conn.send_buffer, opened.file_size, opened.last_modified);
            conn.send_pos = 0;
            conn.send_len = header_len;
            conn.state = ConnState::SendingHeader;
        }
    }
}

fn prepare_404(conn: &mut Connection) {
    let header_len = response::build_404_header(&mut conn.send_buffer);
    conn.send_pos = 0;
    conn.send_len = header_len;
    conn.state = ConnState::Sending404;
}

/// Drive a writable `client_fd` event. Valid in every sending state.
pub fn on_writable(conn: &mut Connection) -> ReactorResult<ReactorAction> {
    match conn.state {
        ConnState::SendingHeader | ConnState::Sending404 => drain_send_buffer(conn),
        ConnState::SendingData => match conn.resource_kind {
            ResourceKind::Static => continue_static_send(conn),
            ResourceKind::Dynamic => continue_dynamic_send(conn),
            ResourceKind::None => unreachable!("SendingData only reached for Static/Dynamic"),
        },
        ConnState::AsyncOngoing => {
            // The socket became writable while we're still waiting on the
            // disk read; nothing to do until `on_completion` fires.
            Ok(ReactorAction::None)
        }
        ConnState::DataSent => Ok(ReactorAction::Close),
        other => {
            debug_assert!(false, "on_writable called in unexpected state {other:?}");
            Ok(ReactorAction::None)
        }
    }
}

fn drain_send_buffer(conn: &mut Connection) -> ReactorResult<ReactorAction> {
    loop {
        if conn.send_pos == conn.send_len {
            return after_header_sent(conn);
        }
        match write_nonblocking(
            conn.client_fd,
            &conn.send_buffer[conn.send_pos..conn.send_len],
        )? {
            None => return Ok(ReactorAction::None),
            Some(0) => return Ok(ReactorAction::None),
            Some(n) => {
                conn.send_pos += n;
                conn.bytes_sent += n as u64;
            }
        }
    }
}

fn after_header_sent(conn: &mut Connection) -> ReactorResult<ReactorAction> {
    if conn.state == ConnState::Sending404 {
        conn.state = ConnState::DataSent;
        return Ok(ReactorAction::None);
    }

    match conn.resource_kind {
        ResourceKind::Static => {
            conn.state = ConnState::SendingData;
            continue_static_send(conn)
        }
        ResourceKind::Dynamic => start_async_read(conn),
        ResourceKind::None => unreachable!("header only built for Static/Dynamic/404"),
    }
}

fn continue_static_send(conn: &mut Connection) -> ReactorResult<ReactorAction> {
    let before = conn.file_pos;
    match static_sender::send_static(conn.client_fd, conn.file_fd, conn.file_pos, conn.file_size)? {
        SendOutcome::WouldBlock => Ok(ReactorAction::None),
        SendOutcome::Progress(new_pos) => {
            conn.file_pos = new_pos;
            conn.bytes_sent += new_pos - before;
            Ok(ReactorAction::None)
        }
        SendOutcome::Complete => {
            conn.bytes_sent += conn.file_size - before;
            conn.file_pos = conn.file_size;
            conn.state = ConnState::DataSent;
            Ok(ReactorAction::None)
        }
    }
}

/// §4.7's "drain buffer, then resubmit" half of the dynamic loop: write out
/// whatever the last completed read put in `send_buffer`, and once it's
/// fully flushed either finish (if the file is exhausted) or submit the next
/// chunk and go back to waiting on the completion descriptor. Distinct from
/// `continue_static_send`, which writes straight from `file_fd` via
/// `sendfile` and never touches `send_buffer` — conflating the two was a bug
/// that shipped dynamic resources through the static (`sendfile`) path
/// instead of writing the buffer `on_completion` had already filled.
fn continue_dynamic_send(conn: &mut Connection) -> ReactorResult<ReactorAction> {
    loop {
        if conn.send_pos == conn.send_len {
            if conn.file_pos >= conn.file_size {
                conn.state = ConnState::DataSent;
                return Ok(ReactorAction::None);
            }
            return start_async_read(conn);
        }
        match write_nonblocking(
            conn.client_fd,
            &conn.send_buffer[conn.send_pos..conn.send_len],
        )? {
            None => return Ok(ReactorAction::None),
            Some(0) => return Ok(ReactorAction::None),
            Some(n) => {
                conn.send_pos += n;
                conn.bytes_sent += n as u64;
            }
        }
    }
}

/// §4.7 step 1-3: stand up this connection's `AsyncIoContext`, submit a read
/// for the next chunk (at most one outstanding at a time), and ask the
/// caller to watch its completion descriptor. Called once to start the
/// dynamic transfer and again from `continue_dynamic_send` for every
/// subsequent chunk until the file is exhausted.
fn start_async_read(conn: &mut Connection) -> ReactorResult<ReactorAction> {
    let mut ctx = AsyncIoContext::new()?;
    let remaining = conn.file_size - conn.file_pos;
    let len = remaining.min(conn.send_buffer.len() as u64) as usize;

    ctx.submit_read(conn.file_fd, &mut conn.send_buffer, len, conn.file_pos, 0)?;
    let completion_fd = ctx.completion_fd();
    conn.aio = Some(ctx);
    conn.send_pos = 0;
    conn.send_len = 0;
    conn.state = ConnState::AsyncOngoing;
    Ok(ReactorAction::WatchCompletion(completion_fd))
}

/// Drive a readable completion-descriptor event. Valid only in
/// [`ConnState::AsyncOngoing`]. Grounded on `connection_complete_async_io`:
/// a negative `io_uring` result is treated as a fatal I/O error for the
/// connection, mirroring the reference implementation's error path.
pub fn on_completion(conn: &mut Connection) -> ReactorResult<ReactorAction> {
    debug_assert!(matches!(conn.state, ConnState::AsyncOngoing));

    let completion_fd = match &conn.aio {
        Some(ctx) => ctx.completion_fd(),
        None => return Ok(ReactorAction::Close),
    };

    let result = match conn.aio.as_mut().unwrap().reap()? {
        None => return Ok(ReactorAction::None),
        Some(result) => result,
    };

    if result < 0 {
        conn.state = ConnState::ConnectionClosed;
        conn.aio = None;
        return Ok(ReactorAction::UnwatchCompletion(completion_fd));
    }

    let n = result as usize;
    conn.send_pos = 0;
    conn.send_len = n;
    conn.file_pos += n as u64;
    conn.aio = None;
    conn.state = ConnState::SendingData;
    Ok(ReactorAction::UnwatchCompletion(completion_fd))
}
