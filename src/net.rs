//! Basic TCP socket stuff made a bit less boring.

use std::{mem::{size_of, size_of_val, zeroed}, net::Ipv4Addr};
use libc::{bind, c_void, close, connect, fcntl, getsockopt, listen, setsockopt, sockaddr, sockaddr_in, socket, socklen_t, strerror, AF_INET, EINPROGRESS, EINTR, FD_CLOEXEC, F_GETFD, F_GETFL, F_SETFD, F_SETFL, INADDR_ANY, IPPROTO_TCP, O_NONBLOCK, SOCK_STREAM, SOL_SOCKET, SO_ERROR, SO_REUSEADDR, TCP_NODELAY};
use crate::util::error;

/// Pending-connection queue of the listening socket.
const LISTEN_BACKLOG: i32 = 3;

fn strerror_string() -> String {
    unsafe { std::ffi::CStr::from_ptr(strerror(error())).to_string_lossy().to_string() }
}

fn fill_sockaddr(sa: &mut sockaddr_in, port: u16, addr: &str) -> Result<(), String> {
    #[cfg(target_os = "linux")]
    {
        sa.sin_family = AF_INET as u16;
    }
    #[cfg(target_os = "macos")]
    {
        sa.sin_family = AF_INET as u8;
    }
    sa.sin_port = port.to_be(); // Network byte order is big endian
    sa.sin_addr.s_addr = INADDR_ANY.to_be();
    if !addr.is_empty() {
        match addr.parse::<Ipv4Addr>() {
            Ok(a) => {
                sa.sin_addr.s_addr = u32::from(a).to_be();
            },
            Err(e) => {
                return Err(format!("Invalid address '{}': {}", addr, e));
            },
        }
    }
    Ok(())
}

pub fn tcp_server(port: u16, bindaddr: &str) -> Result<i32, String> {
    let mut _sock = -1;
    let on = 1;
    let mut sa: sockaddr_in;

    unsafe {
        _sock = socket(AF_INET, SOCK_STREAM, 0);
        if _sock == -1 {
            return Err(format!("socket: {}", strerror_string()));
        }
        if setsockopt(_sock, SOL_SOCKET, SO_REUSEADDR, &on as *const _ as *const c_void, size_of::<i32>() as socklen_t) == -1 {
            close(_sock);
            return Err(format!("setsockopt SO_REUSEADDR: {}", strerror_string()));
        }
        sa = zeroed();
        if let Err(e) = fill_sockaddr(&mut sa, port, bindaddr) {
            close(_sock);
            return Err(e);
        }

        if bind(_sock, &sa as *const _ as *const sockaddr, size_of::<sockaddr_in>() as socklen_t) == -1 {
            close(_sock);
            return Err(format!("bind: {}", strerror_string()));
        }

        if listen(_sock, LISTEN_BACKLOG) == -1 {
            close(_sock);
            return Err(format!("listen: {}", strerror_string()));
        }
    }
    Ok(_sock)
}

/// Accept one connection. The returned socket is non-blocking and
/// close-on-exec. Gives back (fd, peer ip, peer port).
pub fn accept(serversock: i32) -> Result<(i32, u32, u16), String> {
    let mut _fd = -1;
    let mut sa: sockaddr_in;
    loop {
        unsafe {
            sa = zeroed();
            let mut len = size_of::<sockaddr_in>() as socklen_t;
            _fd = libc::accept(serversock, &mut sa as *mut _ as *mut sockaddr, &mut len);
            if _fd == -1 {
                if error() == EINTR {
                    continue;
                } else {
                    return Err(format!("accept: {}", strerror_string()));
                }
            }
            break;
        }
    }
    if let Err(e) = nonblock(_fd) {
        unsafe { close(_fd) };
        return Err(e);
    }
    if let Err(e) = cloexec(_fd) {
        unsafe { close(_fd) };
        return Err(e);
    }

    let c_ip = u32::from_be(sa.sin_addr.s_addr);
    let c_port = u16::from_be(sa.sin_port);
    Ok((_fd, c_ip, c_port))
}

pub fn nonblock(fd: i32) -> Result<(), String> {
    // Note that fcntl(2) for F_GETFL and F_SETFL can't be
    // interrupted by a signal.
    unsafe {
        let flag = fcntl(fd, F_GETFL);
        if flag == -1 {
            return Err(format!("fcntl(F_GETFL): {}", strerror_string()));
        }
        if fcntl(fd, F_SETFL, flag | O_NONBLOCK) == -1 {
            return Err(format!("fcntl(F_SETFL,O_NONBLOCK): {}", strerror_string()));
        }
    }
    Ok(())
}

pub fn cloexec(fd: i32) -> Result<(), String> {
    unsafe {
        let flag = fcntl(fd, F_GETFD);
        if flag == -1 {
            return Err(format!("fcntl(F_GETFD): {}", strerror_string()));
        }
        if fcntl(fd, F_SETFD, flag | FD_CLOEXEC) == -1 {
            return Err(format!("fcntl(F_SETFD,FD_CLOEXEC): {}", strerror_string()));
        }
    }
    Ok(())
}

pub fn tcp_no_delay(fd: i32) -> Result<(), String> {
    let yes = 1;
    unsafe {
        if setsockopt(fd, IPPROTO_TCP, TCP_NODELAY, &yes as *const _ as *const c_void, size_of_val(&yes) as socklen_t) == -1 {
            return Err(format!("setsockopt TCP_NODELAY: {}", strerror_string()));
        }
    }
    Ok(())
}

/// Create a non-blocking socket, optionally bind it to a local address,
/// and start connecting. EINPROGRESS is the expected outcome; readiness is
/// delivered through the event loop as a writable event.
pub fn tcp_bind_and_connect(remote_addr: &str, remote_port: u16, local: Option<(&str, u16)>) -> Result<i32, String> {
    let mut _sock = -1;
    let mut sa: sockaddr_in;
    unsafe {
        _sock = socket(AF_INET, SOCK_STREAM, 0);
        if _sock == -1 {
            return Err(format!("socket: {}", strerror_string()));
        }
    }
    nonblock(_sock)?;
    if let Some((local_addr, local_port)) = local {
        unsafe {
            sa = zeroed();
            if let Err(e) = fill_sockaddr(&mut sa, local_port, local_addr) {
                close(_sock);
                return Err(e);
            }
            if bind(_sock, &sa as *const _ as *const sockaddr, size_of::<sockaddr_in>() as socklen_t) == -1 {
                close(_sock);
                return Err(format!("bind: {}", strerror_string()));
            }
        }
    }
    unsafe {
        sa = zeroed();
        if let Err(e) = fill_sockaddr(&mut sa, remote_port, remote_addr) {
            close(_sock);
            return Err(e);
        }
        if connect(_sock, &sa as *const _ as *const sockaddr, size_of::<sockaddr_in>() as socklen_t) == -1 && error() != EINPROGRESS {
            close(_sock);
            return Err(format!("connect: {}", strerror_string()));
        }
    }
    Ok(_sock)
}

/// Probe SO_ERROR after a non-blocking connect resolved.
pub fn is_socket_error(fd: i32) -> bool {
    let mut err: i32 = 0;
    let mut len = size_of::<i32>() as socklen_t;
    let r = unsafe { getsockopt(fd, SOL_SOCKET, SO_ERROR, &mut err as *mut _ as *mut c_void, &mut len) };
    r == -1 || err != 0
}

pub fn close_fd(fd: i32) {
    unsafe {
        close(fd); // May be already closed, just ignore errors
    }
}
