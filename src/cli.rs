//! The interactive client: connect, queue commands, fetch replies.
//!
//! Commands accumulate in a query buffer and are flushed in one write when
//! a reply is requested; replies accumulate in a reply buffer and are
//! parsed out one at a time, so pipelining any number of commands before
//! the first `get_reply` works. The async variant wraps `get_reply` in a
//! thread-backed future with synchronous and asynchronous chaining.

use std::{sync::{Arc, RwLock}, thread};
use crate::{
    buffer::QueryBuffer,
    connection::{bind_and_blocking_connect, ConnState, Connection},
    resp,
};

pub const ERR_RESP: &str = "+error";
pub const NO_REPLY_RESP: &str = "+no_reply";

const CONNECT_TIMEOUT_MS: i64 = 1000;
const IO_TIMEOUT_MS: i64 = 1000;

pub struct RedisCli {
    conn: Option<Arc<RwLock<Connection>>>,
    query_buf: QueryBuffer,
    reply_buf: Vec<u8>,
}

impl RedisCli {
    pub fn new() -> RedisCli {
        RedisCli {
            conn: None,
            query_buf: QueryBuffer::new(),
            reply_buf: Vec::new(),
        }
    }

    /// Blocking connect to the server.
    pub fn connect(&mut self, ip: &str, port: u16) -> Result<(), String> {
        let conn = Arc::new(RwLock::new(Connection::new(-1)));
        bind_and_blocking_connect(&conn, (ip, port), None, CONNECT_TIMEOUT_MS)?;
        self.conn = Some(conn);
        Ok(())
    }

    /// Wire an already connected socket in; used by tests and by callers
    /// managing their own connect.
    pub fn with_connection(conn: Arc<RwLock<Connection>>) -> RedisCli {
        RedisCli {
            conn: Some(conn),
            query_buf: QueryBuffer::new(),
            reply_buf: Vec::new(),
        }
    }

    /// Queue one command line; nothing is sent yet.
    pub fn add_command(&mut self, cmd: &str) {
        self.query_buf.write(cmd.as_bytes());
        if !cmd.ends_with('\n') {
            self.query_buf.write(b"\r\n");
        }
    }

    /// Fetch the next pending reply, flushing queued commands first.
    pub fn get_reply(&mut self) -> String {
        if let Some(reply) = self.next_parsed_reply() {
            return reply;
        }
        if self.query_buf.is_empty() && self.reply_buf.is_empty() {
            return NO_REPLY_RESP.to_string();
        }
        if !self.query_buf.is_empty() {
            if self.flush_commands().is_err() {
                return ERR_RESP.to_string();
            }
        }
        // keep pulling from the socket until one full reply parses
        loop {
            if let Some(reply) = self.next_parsed_reply() {
                return reply;
            }
            let conn = match &self.conn {
                Some(c) => c.clone(),
                None => return ERR_RESP.to_string(),
            };
            let mut c = conn.write().unwrap();
            let mut chunk = [0u8; 4096];
            let nread = c.sync_read(&mut chunk, IO_TIMEOUT_MS);
            if nread <= 0 {
                return ERR_RESP.to_string();
            }
            self.reply_buf.extend_from_slice(&chunk[..nread as usize]);
        }
    }

    /// `get_reply` hoisted onto a worker thread.
    pub fn get_reply_async(&mut self) -> CompletableFuture<String> {
        // fetch synchronously if everything is already buffered; otherwise
        // move the socket wait off-thread
        if let Some(reply) = self.next_parsed_reply() {
            return CompletableFuture::completed(reply);
        }
        let conn = self.conn.clone();
        let pending: Vec<u8> = {
            let mut bytes = Vec::new();
            while self.query_buf.processed() < self.query_buf.nread() {
                match self.query_buf.process_inline() {
                    Some(line) => {
                        bytes.extend_from_slice(line.as_bytes());
                        bytes.extend_from_slice(b"\r\n");
                    },
                    None => break,
                }
            }
            self.query_buf.clear();
            bytes
        };
        CompletableFuture::supply(move || {
            let conn = match conn {
                Some(c) => c,
                None => return ERR_RESP.to_string(),
            };
            let mut c = conn.write().unwrap();
            if !pending.is_empty() && c.sync_write(&pending, IO_TIMEOUT_MS) < 0 {
                return ERR_RESP.to_string();
            }
            let mut buf: Vec<u8> = Vec::new();
            loop {
                let mut reply = Vec::new();
                if let Some(_) = resp::parse(&buf, &mut reply) {
                    return reply.join(" ");
                }
                let mut chunk = [0u8; 4096];
                let nread = c.sync_read(&mut chunk, IO_TIMEOUT_MS);
                if nread <= 0 {
                    return ERR_RESP.to_string();
                }
                buf.extend_from_slice(&chunk[..nread as usize]);
            }
        })
    }

    fn flush_commands(&mut self) -> Result<(), ()> {
        let bytes: Vec<u8> = {
            let mut out = Vec::new();
            while let Some(line) = self.query_buf.process_inline() {
                out.extend_from_slice(line.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            self.query_buf.clear();
            out
        };
        if bytes.is_empty() {
            return Ok(());
        }
        let conn = match &self.conn {
            Some(c) => c.clone(),
            None => return Err(()),
        };
        let mut c = conn.write().unwrap();
        if c.state() != ConnState::Connected {
            return Err(());
        }
        if c.sync_write(&bytes, IO_TIMEOUT_MS) < 0 {
            return Err(());
        }
        Ok(())
    }

    /// Pop one complete reply off the reply buffer, if any.
    fn next_parsed_reply(&mut self) -> Option<String> {
        if self.reply_buf.is_empty() {
            return None;
        }
        let mut reply = Vec::new();
        match resp::parse(&self.reply_buf, &mut reply) {
            Some(consumed) => {
                self.reply_buf.drain(..consumed);
                Some(reply.join(" "))
            },
            None => None,
        }
    }
}

enum FutureState<T> {
    Ready(T),
    Pending(thread::JoinHandle<T>),
}

/// A minimal one-shot future over a worker thread, with synchronous and
/// asynchronous continuation chaining.
pub struct CompletableFuture<T> {
    state: FutureState<T>,
}

impl<T: Send + 'static> CompletableFuture<T> {
    pub fn completed(value: T) -> CompletableFuture<T> {
        CompletableFuture { state: FutureState::Ready(value) }
    }

    pub fn supply<F>(f: F) -> CompletableFuture<T>
    where F: FnOnce() -> T + Send + 'static {
        CompletableFuture { state: FutureState::Pending(thread::spawn(f)) }
    }

    /// Wait for the value, apply the continuation, hand back a completed
    /// future.
    pub fn then_apply<U, F>(self, cb: F) -> CompletableFuture<U>
    where U: Send + 'static, F: FnOnce(T) -> U + Send + 'static {
        CompletableFuture::completed(cb(self.get()))
    }

    /// Chain the continuation on another worker thread.
    pub fn then_apply_async<U, F>(self, cb: F) -> CompletableFuture<U>
    where U: Send + 'static, F: FnOnce(T) -> U + Send + 'static {
        CompletableFuture::supply(move || cb(self.get()))
    }

    pub fn get(self) -> T {
        match self.state {
            FutureState::Ready(v) => v,
            FutureState::Pending(handle) => handle.join().unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::zeroed;

    fn socketpair() -> (i32, i32) {
        let mut fds: [i32; 2] = unsafe { zeroed() };
        let r = unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()) };
        assert_eq!(r, 0);
        (fds[0], fds[1])
    }

    fn cli_over_socketpair() -> (RedisCli, i32) {
        let (a, b) = socketpair();
        let mut conn = Connection::new(a);
        conn.set_state(ConnState::Connected);
        (RedisCli::with_connection(Arc::new(RwLock::new(conn))), b)
    }

    fn peer_write(fd: i32, bytes: &[u8]) {
        let n = unsafe { libc::write(fd, bytes.as_ptr() as *const libc::c_void, bytes.len()) };
        assert_eq!(n as usize, bytes.len());
    }

    fn peer_read(fd: i32) -> Vec<u8> {
        let mut buf = [0u8; 4096];
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        assert!(n >= 0);
        buf[..n as usize].to_vec()
    }

    #[test]
    fn pipelined_commands_and_replies() {
        let (mut cli, peer) = cli_over_socketpair();
        cli.add_command("SET key val");
        cli.add_command("GET key");
        // the server side answers both before the client asks
        peer_write(peer, b":0\r\n$3\r\nval\r\n");

        assert_eq!(cli.get_reply(), "0");
        let sent = peer_read(peer);
        assert_eq!(sent, b"SET key val\r\nGET key\r\n");
        assert_eq!(cli.get_reply(), "val");
    }

    #[test]
    fn no_reply_without_commands() {
        let (mut cli, _peer) = cli_over_socketpair();
        assert_eq!(cli.get_reply(), NO_REPLY_RESP);
    }

    #[test]
    fn null_reply_renders_nil() {
        let (mut cli, peer) = cli_over_socketpair();
        cli.add_command("GET missing");
        peer_write(peer, b"$-1\r\n");
        assert_eq!(cli.get_reply(), "(nil)");
    }

    #[test]
    fn future_chaining() {
        let fut = CompletableFuture::supply(|| "reply".to_string());
        let processed = fut
            .then_apply(|r| r + "_processed")
            .then_apply_async(|r| r + "_twice")
            .get();
        assert_eq!(processed, "reply_processed_twice");
    }

    #[test]
    fn completed_future_is_immediate() {
        let fut = CompletableFuture::completed(41);
        assert_eq!(fut.then_apply(|v| v + 1).get(), 42);
    }
}
