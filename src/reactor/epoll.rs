use std::io;
use std::os::unix::io::RawFd;
use std::ptr;

use libc::{c_int, epoll_event, EPOLLIN, EPOLLOUT};

use crate::error::{ReactorError, ReactorResult};

use super::{Event, Interest, Multiplexer};

fn interest_bits(interest: Interest) -> u32 {
    match interest {
        Interest::Readable => EPOLLIN as u32,
        Interest::Writable => EPOLLOUT as u32,
        Interest::Both => (EPOLLIN | EPOLLOUT) as u32,
    }
}

/// Level-triggered epoll multiplexer. No `EPOLLET`: the event loop relies on
/// re-notification rather than having to drain every descriptor fully on a
/// single wakeup (SPEC_FULL §4.1).
pub struct Epoll {
    fd: c_int,
}

impl Multiplexer for Epoll {
    fn new() -> ReactorResult<Self> {
        let fd = unsafe { libc::epoll_create1(0) };
        if fd < 0 {
            return Err(ReactorError::Io(io::Error::last_os_error()));
        }
        Ok(Self { fd })
    }

    fn add(&self, fd: RawFd, token: u64, interest: Interest) -> ReactorResult<()> {
        let mut ev = epoll_event {
            events: interest_bits(interest),
            u64: token,
        };
        let rc = unsafe { libc::epoll_ctl(self.fd, libc::EPOLL_CTL_ADD, fd, &mut ev) };
        if rc < 0 {
            return Err(ReactorError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    fn modify(&self, fd: RawFd, token: u64, interest: Interest) -> ReactorResult<()> {
        let mut ev = epoll_event {
            events: interest_bits(interest),
            u64: token,
        };
        let rc = unsafe { libc::epoll_ctl(self.fd, libc::EPOLL_CTL_MOD, fd, &mut ev) };
        if rc < 0 {
            return Err(ReactorError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    fn remove(&self, fd: RawFd) -> ReactorResult<()> {
        let rc = unsafe { libc::epoll_ctl(self.fd, libc::EPOLL_CTL_DEL, fd, ptr::null_mut()) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            // A descriptor that's already closed (e.g. the peer vanished
            // and we're cleaning up late) is not a multiplexer failure.
            if err.raw_os_error() != Some(libc::ENOENT) && err.raw_os_error() != Some(libc::EBADF)
            {
                return Err(ReactorError::Io(err));
            }
        }
        Ok(())
    }

    fn wait(&self, out: &mut Vec<Event>, timeout_ms: i32) -> ReactorResult<usize> {
        let mut raw = [epoll_event { events: 0, u64: 0 }; 1024];
        let n = unsafe {
            libc::epoll_wait(self.fd, raw.as_mut_ptr(), raw.len() as c_int, timeout_ms)
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(0);
            }
            return Err(ReactorError::Io(err));
        }
        let n = n as usize;
        out.clear();
        for raw_ev in &raw[..n] {
            out.push(Event {
                token: raw_ev.u64,
                readable: raw_ev.events & (EPOLLIN as u32) != 0,
                writable: raw_ev.events & (EPOLLOUT as u32) != 0,
            });
        }
        Ok(n)
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
