//! Socket lifecycle and handler slots.
//!
//! A connection owns its fd and the read/write handlers installed on it;
//! the event loop only keeps the fd-indexed dispatch procs, which resolve
//! the connection through the fd-keyed registry. A read of zero bytes
//! moves the state to Closed, EAGAIN/EINTR leave it alone, and any other
//! failure moves a connected socket to Error. The fd is closed exactly
//! once, on drop.

use std::{collections::HashMap, sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard}};
use libc::{c_void, EAGAIN, EINTR};
use once_cell::sync::Lazy;
use crate::{ae::{ae_wait, create_file_event, delete_file_event, Mask}, net::{accept, close_fd, is_socket_error, tcp_bind_and_connect, tcp_server}, util::{error, log, LogLevel}};

const BATCH_READ_CHUNK: usize = 1024;

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ConnState {
    Connect,
    Connecting,
    Accepting,
    Handshake,
    Connected,
    Error,
    Closed,
}

/// Capability interface of connection callbacks: the read and write
/// handlers installed by the networking layer.
pub trait ConnHandler: Sync + Send {
    fn handle(&self, conn: &Arc<RwLock<Connection>>);
}

/// fd -> Connection registry, resolved by the event loop dispatch procs.
pub static CONNS: Lazy<RwLock<HashMap<i32, Arc<RwLock<Connection>>>>> = Lazy::new(|| RwLock::new(HashMap::new()));
pub fn conns_read() -> RwLockReadGuard<'static, HashMap<i32, Arc<RwLock<Connection>>>> {
    CONNS.read().unwrap()
}
pub fn conns_write() -> RwLockWriteGuard<'static, HashMap<i32, Arc<RwLock<Connection>>>> {
    CONNS.write().unwrap()
}

pub fn lookup_conn(fd: i32) -> Option<Arc<RwLock<Connection>>> {
    conns_read().get(&fd).cloned()
}

pub fn register_conn(conn: Arc<RwLock<Connection>>) {
    let fd = conn.read().unwrap().fd;
    conns_write().insert(fd, conn);
}

pub fn unregister_conn(fd: i32) {
    conns_write().remove(&fd);
}

pub struct Connection {
    fd: i32,
    state: ConnState,
    // write barrier: run the write handler before the read handler
    barrier: bool,
    read_handler: Option<Arc<dyn ConnHandler>>,
    write_handler: Option<Arc<dyn ConnHandler>>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        // a connection still in Accepting state borrows the listening fd
        // and must not close it
        if self.fd != -1 && self.state != ConnState::Accepting {
            close_fd(self.fd);
        }
        self.fd = -1;
    }
}

impl Connection {
    pub fn new(fd: i32) -> Connection {
        Connection {
            fd,
            state: ConnState::Connect,
            barrier: false,
            read_handler: None,
            write_handler: None,
        }
    }

    pub fn fd(&self) -> i32 {
        self.fd
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn set_state(&mut self, state: ConnState) {
        self.state = state;
    }

    pub fn has_read_handler(&self) -> bool {
        self.read_handler.is_some()
    }

    pub fn has_write_handler(&self) -> bool {
        self.write_handler.is_some()
    }

    /// Create the listening socket.
    pub fn bind_and_listen(&mut self, addr: &str, port: u16) -> Result<(), String> {
        let fd = tcp_server(port, addr)?;
        self.fd = fd;
        Ok(())
    }

    /// Accept the pending connection of the listening fd this connection
    /// was primed with; the connection takes over the accepted socket.
    pub fn accept(&mut self) -> Result<(u32, u16), String> {
        if self.fd < 0 || self.state != ConnState::Accepting {
            return Err("connection not in accepting state".to_string());
        }
        let (fd, c_ip, c_port) = accept(self.fd)?;
        self.fd = fd;
        self.state = ConnState::Connected;
        Ok((c_ip, c_port))
    }

    /// Non-blocking read. Returns the byte count, 0 on a clean peer close
    /// (state moves to Closed), -1 on EAGAIN or error.
    pub fn read(&mut self, buf: &mut [u8]) -> isize {
        let r = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut c_void, buf.len()) };
        if r < 0 && error() != EAGAIN {
            if error() != EINTR && self.state == ConnState::Connected {
                self.state = ConnState::Error;
            }
            return -1;
        } else if r == 0 {
            self.state = ConnState::Closed;
        }
        r
    }

    /// Drain everything currently readable into `s`.
    pub fn batch_read(&mut self, s: &mut Vec<u8>) -> isize {
        let mut buf = [0u8; BATCH_READ_CHUNK];
        let start = s.len();
        loop {
            let r = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut c_void, BATCH_READ_CHUNK) };
            if r > 0 {
                s.extend_from_slice(&buf[..r as usize]);
                continue;
            }
            if s.len() == start && r < 0 && error() != EAGAIN {
                if error() != EINTR && self.state == ConnState::Connected {
                    self.state = ConnState::Error;
                }
                return -1;
            }
            if s.len() == start && r == 0 {
                self.state = ConnState::Closed;
            }
            break;
        }
        (s.len() - start) as isize
    }

    /// Optimistic read, then wait up to `timeout_ms` for readiness.
    pub fn sync_read(&mut self, buf: &mut [u8], timeout_ms: i64) -> isize {
        let r = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut c_void, buf.len()) };
        if r > 0 {
            return r;
        } else if r == 0 {
            self.state = ConnState::Closed;
            return 0;
        } else if r < 0 && error() != EAGAIN {
            return -1;
        }
        if ae_wait(self.fd, Mask::readable(), timeout_ms) <= 0 {
            return -1;
        }
        self.read(buf)
    }

    /// Read one line (up to a '\n', not included) within the timeout.
    pub fn sync_readline(&mut self, s: &mut String, timeout_ms: i64) -> isize {
        if ae_wait(self.fd, Mask::readable(), timeout_ms) <= 0 {
            return -1;
        }
        let mut byte = [0u8; 1];
        loop {
            let r = unsafe { libc::read(self.fd, byte.as_mut_ptr() as *mut c_void, 1) };
            if r < 0 {
                if error() == EAGAIN {
                    break;
                }
                if error() != EINTR && self.state == ConnState::Connected {
                    self.state = ConnState::Error;
                }
                return -1;
            }
            if r == 0 {
                if s.is_empty() {
                    self.state = ConnState::Closed;
                }
                break;
            }
            if byte[0] == b'\n' {
                break;
            }
            if byte[0] != b'\r' {
                s.push(byte[0] as char);
            }
        }
        s.len() as isize
    }

    pub fn write(&mut self, buf: &[u8]) -> isize {
        let n = unsafe { libc::write(self.fd, buf.as_ptr() as *const c_void, buf.len()) };
        if n < 0 && error() != EAGAIN {
            if error() != EINTR && self.state == ConnState::Connected {
                self.state = ConnState::Error;
            }
            return -1;
        }
        n
    }

    /// Optimistic write, waiting for writability to finish the tail.
    pub fn sync_write(&mut self, buf: &[u8], timeout_ms: i64) -> isize {
        let mut written = 0usize;
        let r = unsafe { libc::write(self.fd, buf.as_ptr() as *const c_void, buf.len()) };
        if r > 0 {
            written = r as usize;
        } else if r < 0 && error() != EAGAIN {
            return -1;
        }
        if written == buf.len() {
            return written as isize;
        }
        if ae_wait(self.fd, Mask::writable(), timeout_ms) <= 0 {
            return -1;
        }
        let n = self.write(&buf[written..]);
        if n < 0 {
            return -1;
        }
        (written + n as usize) as isize
    }

    /// Vectored write of (segment, length) pairs.
    pub fn writev(&mut self, mem_blocks: &[(&[u8], usize)]) -> isize {
        let iovs: Vec<libc::iovec> = mem_blocks
            .iter()
            .map(|(b, l)| libc::iovec { iov_base: b.as_ptr() as *mut c_void, iov_len: *l })
            .collect();
        let n = unsafe { libc::writev(self.fd, iovs.as_ptr(), iovs.len() as i32) };
        if n < 0 && error() != EAGAIN {
            if error() != EINTR && self.state == ConnState::Connected {
                self.state = ConnState::Error;
            }
            return -1;
        }
        n
    }
}

/// Start a non-blocking connect. The writable event resolves the
/// Connecting state once the kernel settles the handshake.
pub fn bind_and_connect(conn: &Arc<RwLock<Connection>>, remote: (&str, u16), local: Option<(&str, u16)>) -> Result<(), String> {
    let fd = tcp_bind_and_connect(remote.0, remote.1, local)?;
    {
        let mut c = conn.write().unwrap();
        c.fd = fd;
        c.state = ConnState::Connecting;
    }
    register_conn(conn.clone());
    create_file_event(fd, Mask::writable(), Arc::new(conn_write_event_proc))?;
    Ok(())
}

/// Blocking flavor: wait for the connect to settle within the timeout.
pub fn bind_and_blocking_connect(conn: &Arc<RwLock<Connection>>, remote: (&str, u16), local: Option<(&str, u16)>, timeout_ms: i64) -> Result<(), String> {
    let fd = tcp_bind_and_connect(remote.0, remote.1, local)?;
    if ae_wait(fd, Mask::writable(), timeout_ms) <= 0 {
        close_fd(fd);
        return Err("connect wait failed".to_string());
    }
    if is_socket_error(fd) {
        close_fd(fd);
        return Err("connect failed".to_string());
    }
    {
        let mut c = conn.write().unwrap();
        c.fd = fd;
        c.state = ConnState::Connected;
    }
    register_conn(conn.clone());
    Ok(())
}

/// Install (or with None, uninstall) the read handler.
pub fn set_read_handler(conn: &Arc<RwLock<Connection>>, handler: Option<Arc<dyn ConnHandler>>) -> bool {
    let fd = conn.read().unwrap().fd;
    match handler {
        None => {
            delete_file_event(fd, Mask::readable());
            conn.write().unwrap().read_handler = None;
            true
        },
        Some(h) => {
            if let Err(e) = create_file_event(fd, Mask::readable(), Arc::new(conn_read_event_proc)) {
                log(LogLevel::Warning, &format!("failed to set read handler: {}", e));
                return false;
            }
            conn.write().unwrap().read_handler = Some(h);
            true
        },
    }
}

/// Install (or uninstall) the write handler. With `barrier` the write
/// handler runs before the read handler in a dispatch, so replies leave
/// before new input is consumed.
pub fn set_write_handler(conn: &Arc<RwLock<Connection>>, handler: Option<Arc<dyn ConnHandler>>, barrier: bool) -> bool {
    let fd = conn.read().unwrap().fd;
    conn.write().unwrap().barrier = barrier;
    match handler {
        None => {
            delete_file_event(fd, Mask::writable() | Mask::barrier());
            conn.write().unwrap().write_handler = None;
            true
        },
        Some(h) => {
            let mask = if barrier {
                Mask::writable() | Mask::barrier()
            } else {
                delete_file_event(fd, Mask::barrier());
                Mask::writable()
            };
            if let Err(e) = create_file_event(fd, mask, Arc::new(conn_write_event_proc)) {
                log(LogLevel::Warning, &format!("failed to set write handler: {}", e));
                return false;
            }
            conn.write().unwrap().write_handler = Some(h);
            true
        },
    }
}

/// Tear the connection out of the registry and the event loop. The fd
/// closes when the last holder drops the Arc.
pub fn close_conn(fd: i32) {
    delete_file_event(fd, Mask::readable() | Mask::writable() | Mask::barrier());
    unregister_conn(fd);
}

/// Event loop proc for readable events: dispatch to the installed handler.
pub fn conn_read_event_proc(fd: i32, _mask: Mask) {
    let conn = match lookup_conn(fd) {
        Some(c) => c,
        None => return,
    };
    let handler = conn.read().unwrap().read_handler.clone();
    if let Some(h) = handler {
        h.handle(&conn);
    }
}

/// Event loop proc for writable events. Resolves a pending non-blocking
/// connect first, then dispatches to the installed handler.
pub fn conn_write_event_proc(fd: i32, _mask: Mask) {
    let conn = match lookup_conn(fd) {
        Some(c) => c,
        None => return,
    };
    {
        let mut c = conn.write().unwrap();
        if c.state == ConnState::Connecting {
            if is_socket_error(fd) {
                c.state = ConnState::Error;
                return;
            }
            c.state = ConnState::Connected;
        }
    }
    let handler = conn.read().unwrap().write_handler.clone();
    if let Some(h) = handler {
        h.handle(&conn);
    }
}
