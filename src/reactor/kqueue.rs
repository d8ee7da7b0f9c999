use std::io;
use std::os::unix::io::RawFd;
use std::ptr;

use libc::{c_int, kevent, timespec, EVFILT_READ, EVFILT_WRITE, EV_ADD, EV_DELETE};

use crate::error::{ReactorError, ReactorResult};

use super::{Event, Interest, Multiplexer};

/// macOS development fallback. The dynamic (io_uring) path in `crate::aio`
/// is Linux-only, so this backend exists purely so the rest of the engine
/// (static path, parser, state machine) can be built and unit-tested off a
/// Linux box; it is not part of the spec's required deployment target.
pub struct Kqueue {
    fd: c_int,
}

impl Multiplexer for Kqueue {
    fn new() -> ReactorResult<Self> {
        let fd = unsafe { libc::kqueue() };
        if fd < 0 {
            return Err(ReactorError::Io(io::Error::last_os_error()));
        }
        Ok(Self { fd })
    }

    fn add(&self, fd: RawFd, token: u64, interest: Interest) -> ReactorResult<()> {
        // Plain EV_ADD, no EV_CLEAR: the filter must stay level-triggered so
        // a writable socket keeps reporting ready across waits, matching
        // epoll's default behavior (§4.1).
        self.change(fd, token, interest, EV_ADD)
    }

    fn modify(&self, fd: RawFd, token: u64, interest: Interest) -> ReactorResult<()> {
        // kqueue has no in-place "modify": re-adding with EV_ADD updates the
        // filter, but switching from read-interest to write-interest (or
        // vice versa) must also drop the filter no longer wanted.
        match interest {
            Interest::Readable => self.drop_filter(fd, EVFILT_WRITE)?,
            Interest::Writable => self.drop_filter(fd, EVFILT_READ)?,
            Interest::Both => {}
        }
        self.change(fd, token, interest, EV_ADD)
    }

    fn remove(&self, fd: RawFd) -> ReactorResult<()> {
        let _ = self.drop_filter(fd, EVFILT_READ);
        let _ = self.drop_filter(fd, EVFILT_WRITE);
        Ok(())
    }

    fn wait(&self, out: &mut Vec<Event>, timeout_ms: i32) -> ReactorResult<usize> {
        let mut raw: [kevent; 1024] = unsafe { std::mem::zeroed() };
        let ts = timespec {
            tv_sec: (timeout_ms.max(0) / 1000) as libc::time_t,
            tv_nsec: ((timeout_ms.max(0) % 1000) * 1_000_000) as libc::c_long,
        };
        let ts_ptr: *const timespec = if timeout_ms < 0 { ptr::null() } else { &ts };

        let n = unsafe {
            libc::kevent(
                self.fd,
                ptr::null(),
                0,
                raw.as_mut_ptr(),
                raw.len() as c_int,
                ts_ptr,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(0);
            }
            return Err(ReactorError::Io(err));
        }

        // Merge read+write events for the same token delivered in the same
        // batch into a single Event, matching epoll's combined-flags shape.
        out.clear();
        for raw_ev in &raw[..n as usize] {
            let token = raw_ev.udata as u64;
            let is_read = raw_ev.filter == EVFILT_READ;
            let is_write = raw_ev.filter == EVFILT_WRITE;
            if let Some(existing) = out.iter_mut().find(|e: &&mut Event| e.token == token) {
                existing.readable |= is_read;
                existing.writable |= is_write;
            } else {
                out.push(Event {
                    token,
                    readable: is_read,
                    writable: is_write,
                });
            }
        }
        Ok(out.len())
    }
}

impl Kqueue {
    fn change(&self, fd: RawFd, token: u64, interest: Interest, flags: u16) -> ReactorResult<()> {
        let mut changes: [kevent; 2] = unsafe { std::mem::zeroed() };
        let mut n = 0usize;

        if matches!(interest, Interest::Readable | Interest::Both) {
            changes[n] = kevent {
                ident: fd as usize,
                filter: EVFILT_READ,
                flags,
                fflags: 0,
                data: 0,
                udata: token as *mut _,
            };
            n += 1;
        }
        if matches!(interest, Interest::Writable | Interest::Both) {
            changes[n] = kevent {
                ident: fd as usize,
                filter: EVFILT_WRITE,
                flags,
                fflags: 0,
                data: 0,
                udata: token as *mut _,
            };
            n += 1;
        }

        let rc = unsafe { libc::kevent(self.fd, changes.as_ptr(), n as c_int, ptr::null_mut(), 0, ptr::null()) };
        if rc < 0 {
            return Err(ReactorError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    fn drop_filter(&self, fd: RawFd, filter: i16) -> ReactorResult<()> {
        let change = kevent {
            ident: fd as usize,
            filter,
            flags: EV_DELETE,
            fflags: 0,
            data: 0,
            udata: ptr::null_mut(),
        };
        let rc = unsafe { libc::kevent(self.fd, &change, 1, ptr::null_mut(), 0, ptr::null()) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOENT) {
                return Err(ReactorError::Io(err));
            }
        }
        Ok(())
    }
}

impl Drop for Kqueue {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
