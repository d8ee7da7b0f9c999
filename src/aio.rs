//! Per-connection asynchronous disk read (SPEC_FULL §4.7).
//!
//! Grounded on `aws.c::connection_start_async_io` / `_continue_async_io` /
//! `_complete_async_io`, which drive Linux AIO (`libaio`) through a
//! process-wide `io_context_t` shared by every connection. SPEC_FULL §9
//! calls that sharing out as a latent bug (two connections can race to
//! submit/reap against the same context) and requires one context per
//! connection instead; this module gives each `Connection` its own
//! `io_uring` ring rather than hand-rolling the raw `io_submit(2)` ABI the
//! `libc` crate doesn't wrap. The eventfd-registration idiom is grounded on
//! `examples/other_examples/94f1d397_radiosilence-nano-web__src-server_uring.rs.rs`,
//! which registers an eventfd with its ring so completions can be observed
//! by a readiness multiplexer — exactly the role SPEC_FULL's "completion
//! descriptor" plays here.

use std::os::unix::io::RawFd;

use io_uring::{opcode, types, IoUring};

use crate::error::{ReactorError, ReactorResult};

/// One in-flight read, plus the completion descriptor the reactor watches
/// for readability. Capacity is fixed at one outstanding request per
/// connection (§4.7: "at most one dynamic read is ever in flight per
/// connection").
pub struct AsyncIoContext {
    ring: IoUring,
    eventfd: RawFd,
}

impl AsyncIoContext {
    /// Build a ring with room for exactly one submission/completion and
    /// register a fresh non-blocking eventfd with it, per step 1 of
    /// `start_async_io`.
    pub fn new() -> ReactorResult<Self> {
        let ring = IoUring::new(1).map_err(ReactorError::Io)?;

        let eventfd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if eventfd < 0 {
            return Err(ReactorError::Io(std::io::Error::last_os_error()));
        }

        ring.submitter()
            .register_eventfd(eventfd)
            .map_err(ReactorError::Io)?;

        Ok(Self { ring, eventfd })
    }

    pub fn completion_fd(&self) -> RawFd {
        self.eventfd
    }

    /// Submit a positional read of `len` bytes from `file_fd` at `offset`
    /// into `buf`, tagged with `token` as the completion's user-data (step 2
    /// of `start_async_io`).
    pub fn submit_read(
        &mut self,
        file_fd: RawFd,
        buf: &mut [u8],
        len: usize,
        offset: u64,
        token: u64,
    ) -> ReactorResult<()> {
        let read_e = opcode::Read::new(types::Fd(file_fd), buf.as_mut_ptr(), len as u32)
            .offset(offset)
            .build()
            .user_data(token);

        unsafe {
            self.ring
                .submission()
                .push(&read_e)
                .map_err(|_| ReactorError::Config("io_uring submission queue full".into()))?;
        }
        self.ring.submit().map_err(ReactorError::Io)?;
        Ok(())
    }

    /// Drain the eventfd's counter (it may count more than one completion if
    /// several ticks coalesced) and return the result of the single
    /// outstanding read, if the completion queue has one ready.
    ///
    /// Per `connection_complete_async_io`: a negative result is an I/O
    /// error and is surfaced as such; the caller treats any error as
    /// "close the connection", matching the reference implementation's
    /// `dlog(LOG_ERR, ...); connection_remove(conn);` path.
    pub fn reap(&mut self) -> ReactorResult<Option<i32>> {
        let mut counter = [0u8; 8];
        loop {
            match unsafe {
                libc::read(
                    self.eventfd,
                    counter.as_mut_ptr() as *mut libc::c_void,
                    counter.len(),
                )
            } {
                n if n == counter.len() as isize => break,
                n if n < 0 => {
                    let err = std::io::Error::last_os_error();
                    if err.kind() == std::io::ErrorKind::WouldBlock {
                        break;
                    }
                    return Err(ReactorError::Io(err));
                }
                _ => break,
            }
        }

        self.ring.completion().sync();
        match self.ring.completion().next() {
            Some(cqe) => Ok(Some(cqe.result())),
            None => Ok(None),
        }
    }
}

impl Drop for AsyncIoContext {
    /// Per the Open Question decision in DESIGN.md: unregister the eventfd
    /// from the ring before closing it (registering a closed fd with a live
    /// ring and then tearing the ring down in the opposite order is the bug
    /// SPEC_FULL §9 calls out), then let `IoUring`'s own drop glue release
    /// the ring's kernel resources.
    fn drop(&mut self) {
        let _ = self.ring.submitter().unregister_eventfd();
        unsafe {
            libc::close(self.eventfd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn context_creates_distinct_eventfds() {
        let a = AsyncIoContext::new().unwrap();
        let b = AsyncIoContext::new().unwrap();
        assert_ne!(a.completion_fd(), b.completion_fd());
    }

    #[test]
    fn submit_and_reap_round_trip() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello world\n").unwrap();
        let file_fd = {
            use std::os::unix::io::AsRawFd;
            tmp.as_file().as_raw_fd()
        };

        let mut ctx = AsyncIoContext::new().unwrap();
        let mut buf = [0u8; 64];
        ctx.submit_read(file_fd, &mut buf, 12, 0, 42).unwrap();

        // Poll the eventfd briefly; io_uring completions on a regular file
        // can land synchronously during submit on some kernels, so a single
        // immediate reap attempt is enough for this smoke test.
        for _ in 0..50 {
            if let Some(result) = ctx.reap().unwrap() {
                assert_eq!(result, 12);
                assert_eq!(&buf[..12], b"hello world\n");
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        panic!("io_uring read did not complete");
    }
}
