//! Listener socket creation (SPEC_FULL §1, §10.3).
//!
//! Grounded on `chopin/src/syscalls.rs::create_listen_socket_reuseport` /
//! `accept_connection`: a raw, cfg-gated `libc` socket path rather than
//! `std::net`, so `SO_REUSEPORT` and an atomically-non-blocking `accept4`
//! are available (the reactor pool in `server.rs` relies on `SO_REUSEPORT`
//! to let the kernel load-balance across one listener per worker thread).

use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use std::ptr;

use libc::{c_int, c_void, socklen_t};

use crate::error::{ReactorError, ReactorResult};

/// Create a non-blocking, `SO_REUSEPORT` TCP listener bound to `addr`.
pub fn create_listener(addr: SocketAddr) -> ReactorResult<RawFd> {
    let domain = if addr.is_ipv6() { libc::AF_INET6 } else { libc::AF_INET };

    unsafe {
        #[cfg(target_os = "linux")]
        let fd = libc::socket(domain, libc::SOCK_STREAM | libc::SOCK_NONBLOCK, 0);
        #[cfg(not(target_os = "linux"))]
        let fd = libc::socket(domain, libc::SOCK_STREAM, 0);

        if fd < 0 {
            return Err(ReactorError::Io(io::Error::last_os_error()));
        }

        #[cfg(not(target_os = "linux"))]
        {
            let flags = libc::fcntl(fd, libc::F_GETFL, 0);
            if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(ReactorError::Io(err));
            }
        }

        let one: c_int = 1;
        for (level, name) in [
            (libc::SOL_SOCKET, libc::SO_REUSEADDR),
            (libc::SOL_SOCKET, libc::SO_REUSEPORT),
        ] {
            if libc::setsockopt(
                fd,
                level,
                name,
                &one as *const _ as *const c_void,
                mem::size_of_val(&one) as socklen_t,
            ) < 0
            {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(ReactorError::Io(err));
            }
        }

        if let Err(e) = bind_addr(fd, &addr) {
            libc::close(fd);
            return Err(e);
        }

        if libc::listen(fd, 1024) < 0 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(ReactorError::Io(err));
        }

        Ok(fd)
    }
}

unsafe fn bind_addr(fd: RawFd, addr: &SocketAddr) -> ReactorResult<()> {
    match addr {
        SocketAddr::V4(a) => {
            let sin = libc::sockaddr_in {
                #[cfg(target_os = "macos")]
                sin_len: mem::size_of::<libc::sockaddr_in>() as u8,
                sin_family: libc::AF_INET as libc::sa_family_t,
                sin_port: a.port().to_be(),
                sin_addr: libc::in_addr {
                    s_addr: u32::from_ne_bytes(a.ip().octets()),
                },
                sin_zero: [0; 8],
            };
            if libc::bind(
                fd,
                &sin as *const _ as *const libc::sockaddr,
                mem::size_of_val(&sin) as socklen_t,
            ) < 0
            {
                return Err(ReactorError::Io(io::Error::last_os_error()));
            }
        }
        SocketAddr::V6(a) => {
            let sin6 = libc::sockaddr_in6 {
                #[cfg(target_os = "macos")]
                sin6_len: mem::size_of::<libc::sockaddr_in6>() as u8,
                sin6_family: libc::AF_INET6 as libc::sa_family_t,
                sin6_port: a.port().to_be(),
                sin6_flowinfo: a.flowinfo(),
                sin6_addr: libc::in6_addr {
                    s6_addr: a.ip().octets(),
                },
                sin6_scope_id: a.scope_id(),
            };
            if libc::bind(
                fd,
                &sin6 as *const _ as *const libc::sockaddr,
                mem::size_of_val(&sin6) as socklen_t,
            ) < 0
            {
                return Err(ReactorError::Io(io::Error::last_os_error()));
            }
        }
    }
    Ok(())
}

/// Accept one pending connection, non-blocking. `Ok(None)` means the accept
/// queue is currently empty (`EAGAIN`/`EWOULDBLOCK`).
pub fn accept_connection(listen_fd: RawFd) -> ReactorResult<Option<RawFd>> {
    #[cfg(target_os = "linux")]
    unsafe {
        let fd = libc::accept4(listen_fd, ptr::null_mut(), ptr::null_mut(), libc::SOCK_NONBLOCK);
        if fd < 0 {
            let err = io::Error::last_os_error();
            return if err.kind() == io::ErrorKind::WouldBlock {
                Ok(None)
            } else {
                Err(ReactorError::Io(err))
            };
        }
        Ok(Some(fd))
    }

    #[cfg(not(target_os = "linux"))]
    unsafe {
        let fd = libc::accept(listen_fd, ptr::null_mut(), ptr::null_mut());
        if fd < 0 {
            let err = io::Error::last_os_error();
            return if err.kind() == io::ErrorKind::WouldBlock {
                Ok(None)
            } else {
                Err(ReactorError::Io(err))
            };
        }
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(ReactorError::Io(err));
        }
        Ok(Some(fd))
    }
}

pub fn read_nonblocking(fd: RawFd, buf: &mut [u8]) -> ReactorResult<Option<usize>> {
    let res = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut c_void, buf.len()) };
    if res < 0 {
        let err = io::Error::last_os_error();
        return if err.kind() == io::ErrorKind::WouldBlock {
            Ok(None)
        } else {
            Err(ReactorError::Io(err))
        };
    }
    Ok(Some(res as usize))
}

pub fn write_nonblocking(fd: RawFd, buf: &[u8]) -> ReactorResult<Option<usize>> {
    let res = unsafe { libc::write(fd, buf.as_ptr() as *const c_void, buf.len()) };
    if res < 0 {
        let err = io::Error::last_os_error();
        return if err.kind() == io::ErrorKind::WouldBlock {
            Ok(None)
        } else {
            Err(ReactorError::Io(err))
        };
    }
    Ok(Some(res as usize))
}
