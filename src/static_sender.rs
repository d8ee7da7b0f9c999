//! Zero-copy static file transfer (SPEC_FULL §4.6).
//!
//! Grounded on `aws.c::connection_send_static`, which calls `sendfile(2)`
//! directly from the file descriptor to the socket descriptor, tracking
//! `file_pos` as the kernel advances it. No userspace buffer is ever
//! touched for `Static` resources; `Dynamic` resources go through
//! `aio`/`send_buffer` instead (§4.7).

use std::os::unix::io::RawFd;

use crate::error::ReactorResult;

/// Outcome of one `sendfile` attempt.
pub enum SendOutcome {
    /// `n` bytes were transferred; more remain.
    Progress(u64),
    /// The transfer reached `file_size`.
    Complete,
    /// The socket isn't writable right now; wait for the next write-ready
    /// event before retrying.
    WouldBlock,
}

/// Transfer as much of `[file_pos, file_size)` as the kernel will accept in
/// one call. `file_pos` is the caller's (the `Connection`'s) running
/// offset; `sendfile` advances the file's internal offset itself via the
/// `&mut` out-parameter semantics of the raw syscall, so this function takes
/// the offset explicitly rather than relying on the fd's seek position.
pub fn send_static(
    socket_fd: RawFd,
    file_fd: RawFd,
    file_pos: u64,
    file_size: u64,
) -> ReactorResult<SendOutcome> {
    if file_pos >= file_size {
        return Ok(SendOutcome::Complete);
    }

    let remaining = file_size - file_pos;
    let mut offset = file_pos as libc::off_t;

    let sent = unsafe {
        libc::sendfile(
            socket_fd,
            file_fd,
            &mut offset as *mut libc::off_t,
            remaining as libc::size_t,
        )
    };

    if sent < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::WouldBlock {
            return Ok(SendOutcome::WouldBlock);
        }
        return Err(crate::error::ReactorError::Io(err));
    }

    let new_pos = file_pos + sent as u64;
    if new_pos >= file_size {
        Ok(SendOutcome::Complete)
    } else {
        Ok(SendOutcome::Progress(new_pos))
    }
}
