//! Per-connection record and state tag (SPEC_FULL §3, §4.8).

use std::os::unix::io::RawFd;

use crate::aio::AsyncIoContext;

pub const NONE_FD: RawFd = -1;

/// Resource classification (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Static,
    Dynamic,
    None,
}

/// Connection state tag (§4.8). The state machine in `state_machine` is a
/// `match` over this enum — kept as a tagged enumeration rather than
/// callback chains, per SPEC_FULL §9's explicit instruction to preserve the
/// tag-driven design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Initial,
    Receiving,
    RequestReceived,
    SendingHeader,
    SendingData,
    AsyncOngoing,
    Sending404,
    DataSent,
    ConnectionClosed,
}

/// The central per-connection entity (§3). One `Connection` is owned by
/// exactly one slab slot and mutated only by the reactor thread that
/// allocated it.
pub struct Connection {
    pub client_fd: RawFd,
    pub state: ConnState,

    pub recv_buffer: Vec<u8>,
    pub recv_len: usize,
    /// How many bytes of `recv_buffer[..recv_len]` have already been
    /// scanned for `\r\n\r\n` — the parser's threaded-through state (§4.3),
    /// so a byte-at-a-time client does not cause quadratic rescans.
    pub headers_scanned: usize,

    pub send_buffer: Vec<u8>,
    pub send_pos: usize,
    pub send_len: usize,

    pub request_path: String,
    pub have_path: bool,

    pub filename: String,
    pub resource_kind: ResourceKind,

    pub file_fd: RawFd,
    pub file_size: u64,
    pub file_pos: u64,

    pub aio: Option<AsyncIoContext>,

    /// Set once the resource has been opened; feeds the `Last-Modified`
    /// header (§4.5). `None` for 404 responses.
    pub last_modified: Option<std::time::SystemTime>,

    /// Total bytes written to `client_fd` so far (header + body), fed into
    /// the worker's periodic counter log (§10.4).
    pub bytes_sent: u64,
}

impl Connection {
    /// Connection record factory (§4.2). The caller (event loop, on accept)
    /// is responsible for having already set `client_fd` non-blocking.
    pub fn new(client_fd: RawFd, buffer_size: usize) -> Self {
        Self {
            client_fd,
            state: ConnState::Initial,
            recv_buffer: vec![0u8; buffer_size],
            recv_len: 0,
            headers_scanned: 0,
            send_buffer: vec![0u8; buffer_size],
            send_pos: 0,
            send_len: 0,
            request_path: String::new(),
            have_path: false,
            filename: String::new(),
            resource_kind: ResourceKind::None,
            file_fd: NONE_FD,
            file_size: 0,
            file_pos: 0,
            aio: None,
            last_modified: None,
            bytes_sent: 0,
        }
    }

    pub fn send_slice(&self) -> &[u8] {
        &self.send_buffer[self.send_pos..self.send_pos + self.send_len]
    }

    /// Release every descriptor this connection owns, in the fixed order
    /// invariant 5 (§3) requires: client socket, file, completion
    /// descriptor/async context.
    pub fn teardown(&mut self) {
        if self.client_fd != NONE_FD {
            unsafe {
                libc::close(self.client_fd);
            }
            self.client_fd = NONE_FD;
        }
        if self.file_fd != NONE_FD {
            unsafe {
                libc::close(self.file_fd);
            }
            self.file_fd = NONE_FD;
        }
        // Dropping `self.aio` closes the eventfd and destroys the io_uring
        // instance (see `aio::AsyncIoContext`'s Drop impl).
        self.aio = None;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.teardown();
    }
}
