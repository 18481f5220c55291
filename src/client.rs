//! Per-connection client state and the input/output pipelines.
//!
//! The read handler pulls bytes into the query buffer and chews through
//! complete inline lines: split on spaces, uppercase the verb, look the
//! command up, execute, append the RESP reply to the reply buffer. When
//! replies are pending a write handler drains them through writev until
//! empty or the socket would block.

use std::sync::{Arc, RwLock};
use crate::{
    buffer::{QueryBuffer, ReplyBuffer},
    cmd::{call, lookup_command, RedisCommand},
    connection::{set_read_handler, set_write_handler, ConnHandler, ConnState, Connection},
    db::RedisDb,
    net::tcp_no_delay,
    reply::{from_int64, REPLY_ERR},
    server::{free_client, lookup_client, server_read, IO_BUF_LEN},
    util::{log, timestamp, LogLevel},
};

pub struct Client {
    fd: i32,
    conn: Arc<RwLock<Connection>>,
    db: Arc<RwLock<RedisDb>>,
    query_buf: QueryBuffer,
    reply: ReplyBuffer,
    argv: Vec<String>,
    cmd: Option<Arc<RedisCommand>>,
    // time of the last interaction, used for timeout (in seconds)
    pub last_interaction: u64,
}

impl Client {
    /// Wrap an accepted connection. Installs the read handler.
    pub fn create(conn: Arc<RwLock<Connection>>) -> Result<Arc<RwLock<Client>>, String> {
        let fd = conn.read().unwrap().fd();
        tcp_no_delay(fd)?;
        let client = Arc::new(RwLock::new(Client {
            fd,
            conn: conn.clone(),
            db: server_read().db(),
            query_buf: QueryBuffer::new(),
            reply: ReplyBuffer::new(),
            argv: Vec::new(),
            cmd: None,
            last_interaction: timestamp().as_secs(),
        }));
        if !set_read_handler(&conn, Some(Arc::new(ReadFromClientHandler))) {
            return Err("failed to install read handler".to_string());
        }
        Ok(client)
    }

    pub fn fd(&self) -> i32 {
        self.fd
    }

    pub fn db(&self) -> Arc<RwLock<RedisDb>> {
        self.db.clone()
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn add_reply(&mut self, s: &str) {
        self.reply.add_str(s);
    }

    pub fn has_pending_replies(&self) -> bool {
        !self.reply.is_empty()
    }

    /// Pull one chunk from the socket into the query buffer.
    pub fn read_query(&mut self) -> isize {
        let mut buf = [0u8; IO_BUF_LEN];
        let nread = self.conn.write().unwrap().read(&mut buf);
        if nread <= 0 {
            return nread;
        }
        self.query_buf.write(&buf[..nread as usize]);
        self.last_interaction = timestamp().as_secs();
        nread
    }

    /// Consume every complete line currently buffered, then compact.
    pub fn process_input_buffer(&mut self) {
        while self.query_buf.processed() < self.query_buf.nread() {
            if !self.process_inline_buffer() {
                break;
            }
            self.process_command();
        }
        self.query_buf.trim_processed();
    }

    /// Parse the next inline command into argv + command. False stops the
    /// processing loop: no complete line, an empty line, or an unknown
    /// command (which is skipped without a reply).
    fn process_inline_buffer(&mut self) -> bool {
        let line = match self.query_buf.process_inline() {
            Some(l) => l,
            None => return false,
        };
        let args: Vec<String> = line.split(' ').filter(|a| !a.is_empty()).map(|a| a.to_string()).collect();
        if args.is_empty() {
            return false;
        }
        let name = args[0].to_uppercase();
        let cmd = match lookup_command(&name) {
            Some(c) => c,
            None => {
                log(LogLevel::Verbose, &format!("unknown command '{}'", name));
                return false;
            },
        };
        self.argv = args;
        self.cmd = Some(cmd);
        true
    }

    fn process_command(&mut self) {
        let cmd = match self.cmd.take() {
            Some(c) => c,
            None => return,
        };
        // positive arity must match exactly, negative arity is a minimum
        if (cmd.arity() > 0 && cmd.arity() != self.argv.len() as i32)
            || (self.argv.len() as i32) < -cmd.arity()
        {
            self.add_reply(&from_int64(REPLY_ERR));
            return;
        }
        call(self, cmd);
    }

    /// Push pending reply bytes to the socket. Returns the bytes written,
    /// -1 on error, 0 when the socket would block.
    pub fn send_reply(&mut self) -> isize {
        let nwritten = if self.reply.reply_len() > 0 {
            self.sendv_reply()
        } else {
            self.send_inline_reply()
        };
        if nwritten > 0 {
            self.reply.clear_processed(nwritten as usize);
            self.last_interaction = timestamp().as_secs();
        }
        nwritten
    }

    fn send_inline_reply(&mut self) -> isize {
        let vec = self.reply.memvec();
        if vec.is_empty() {
            return 0;
        }
        self.conn.write().unwrap().write(vec[0].0)
    }

    fn sendv_reply(&mut self) -> isize {
        let vec = self.reply.memvec();
        self.conn.write().unwrap().writev(&vec)
    }
}

/// Read handler: feed the query buffer, run the pipeline, and make sure a
/// write handler is installed while replies are pending.
pub struct ReadFromClientHandler;

impl ConnHandler for ReadFromClientHandler {
    fn handle(&self, conn: &Arc<RwLock<Connection>>) {
        let fd = conn.read().unwrap().fd();
        let client_r = match lookup_client(fd) {
            Some(c) => c,
            None => return,
        };
        let mut client = client_r.write().unwrap();
        let nread = client.read_query();
        if nread <= 0 {
            let state = conn.read().unwrap().state();
            if state != ConnState::Connected {
                log(LogLevel::Verbose, "Client closed connection");
                drop(client);
                free_client(fd);
            }
            return;
        }
        client.process_input_buffer();
        let pending = client.has_pending_replies();
        drop(client);
        if pending && !conn.read().unwrap().has_write_handler() {
            set_write_handler(conn, Some(Arc::new(WriteToClientHandler)), false);
        }
    }
}

/// Write handler: drain until the buffer empties or the write would block,
/// then uninstall.
pub struct WriteToClientHandler;

impl ConnHandler for WriteToClientHandler {
    fn handle(&self, conn: &Arc<RwLock<Connection>>) {
        let fd = conn.read().unwrap().fd();
        let client_r = match lookup_client(fd) {
            Some(c) => c,
            None => return,
        };
        let mut client = client_r.write().unwrap();
        let mut r: isize = 0;
        while client.has_pending_replies() {
            r = client.send_reply();
            if r <= 0 {
                break;
            }
        }
        if r == -1 && conn.read().unwrap().state() != ConnState::Connected {
            drop(client);
            free_client(fd);
            return;
        }
        let pending = client.has_pending_replies();
        drop(client);
        if !pending {
            set_write_handler(conn, None, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::register_conn;
    use crate::server::{clients_write, init_server_state_for_tests};
    use std::mem::zeroed;

    fn socketpair() -> (i32, i32) {
        let mut fds: [i32; 2] = unsafe { zeroed() };
        let r = unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()) };
        assert_eq!(r, 0);
        (fds[0], fds[1])
    }

    fn connected_client() -> (Arc<RwLock<Client>>, i32) {
        init_server_state_for_tests();
        let (a, b) = socketpair();
        crate::net::nonblock(a).unwrap();
        let mut conn = Connection::new(a);
        conn.set_state(ConnState::Connected);
        let conn = Arc::new(RwLock::new(conn));
        register_conn(conn.clone());
        let client = Client::create(conn).unwrap();
        clients_write().insert(a, client.clone());
        (client, b)
    }

    fn drain(client: &Arc<RwLock<Client>>) -> Vec<u8> {
        let mut c = client.write().unwrap();
        let mut out = Vec::new();
        for (seg, _) in c.reply.memvec() {
            out.extend_from_slice(seg);
        }
        let total = out.len();
        c.reply.clear_processed(total);
        out
    }

    fn feed(client: &Arc<RwLock<Client>>, peer: i32, bytes: &[u8]) {
        let n = unsafe { libc::write(peer, bytes.as_ptr() as *const libc::c_void, bytes.len()) };
        assert_eq!(n as usize, bytes.len());
        let mut c = client.write().unwrap();
        assert!(c.read_query() > 0);
        c.process_input_buffer();
    }

    #[test]
    fn set_then_get_round_trip() {
        let (client, peer) = connected_client();
        feed(&client, peer, b"SET a 1\r\nGET a\r\n");
        assert_eq!(drain(&client), b":0\r\n$1\r\n1\r\n");
    }

    #[test]
    fn pipelined_commands_reply_in_order() {
        let (client, peer) = connected_client();
        feed(&client, peer, b"GET missing\r\nSET k v\r\n");
        assert_eq!(drain(&client), b"$-1\r\n:0\r\n");
    }

    #[test]
    fn unknown_command_gets_no_reply() {
        let (client, peer) = connected_client();
        feed(&client, peer, b"BOGUS x\r\n");
        assert!(drain(&client).is_empty());
        // the connection stays usable
        feed(&client, peer, b"SET k v\r\n");
        assert_eq!(drain(&client), b":0\r\n");
    }

    #[test]
    fn wrong_arity_is_a_protocol_error() {
        let (client, peer) = connected_client();
        feed(&client, peer, b"GET\r\n");
        assert_eq!(drain(&client), b":-1\r\n");
    }

    #[test]
    fn bare_newline_terminator_accepted() {
        let (client, peer) = connected_client();
        feed(&client, peer, b"SET nlkey nlval\nGET nlkey\n");
        assert_eq!(drain(&client), b":0\r\n$5\r\nnlval\r\n");
    }

    #[test]
    fn ttl_expires_the_key() {
        let (client, peer) = connected_client();
        feed(&client, peer, b"SET ttlkey 1 500\r\nGET ttlkey\r\n");
        assert_eq!(drain(&client), b":0\r\n$1\r\n1\r\n");

        std::thread::sleep(std::time::Duration::from_millis(600));
        feed(&client, peer, b"GET ttlkey\r\n");
        assert_eq!(drain(&client), b"$-1\r\n");
    }

    #[test]
    fn set_commands_over_the_wire() {
        let (client, peer) = connected_client();
        feed(&client, peer, b"SADD wireset 1\r\nSADD wireset 2\r\nSADD wireset hello\r\nSMEMBERS wireset\r\n");
        assert_eq!(
            drain(&client),
            b":1\r\n:1\r\n:1\r\n*3\r\n$1\r\n1\r\n$1\r\n2\r\n$5\r\nhello\r\n"
        );
        feed(&client, peer, b"SCARD wireset\r\nSISMEMBER wireset hello\r\nSREM wireset hello\r\nSISMEMBER wireset hello\r\n");
        assert_eq!(drain(&client), b":3\r\n:1\r\n:1\r\n:0\r\n");
    }

    #[test]
    fn zset_tie_break_over_the_wire() {
        let (client, peer) = connected_client();
        feed(&client, peer, b"ZADD wirez 1 a\r\nZADD wirez 2 b\r\nZADD wirez 2 a\r\nZRANGE wirez 0 -1\r\n");
        assert_eq!(drain(&client), b":1\r\n:1\r\n:0\r\n*2\r\n$1\r\na\r\n$1\r\nb\r\n");
    }

    #[test]
    fn zset_promotion_over_the_wire() {
        let (client, peer) = connected_client();
        for i in 0..130 {
            feed(&client, peer, format!("ZADD bigz {} member-{:03}\r\n", i, i).as_bytes());
            assert_eq!(drain(&client), b":1\r\n");
        }
        feed(&client, peer, b"ZCARD bigz\r\n");
        assert_eq!(drain(&client), b":130\r\n");

        feed(&client, peer, b"ZRANGE bigz 0 -1\r\n");
        let reply = drain(&client);
        // 130 members, in score order
        let mut expected = Vec::new();
        expected.extend_from_slice(format!("*{}\r\n", 130).as_bytes());
        for i in 0..130 {
            let member = format!("member-{:03}", i);
            expected.extend_from_slice(format!("${}\r\n{}\r\n", member.len(), member).as_bytes());
        }
        assert_eq!(reply, expected);
    }

    #[test]
    fn large_reply_concatenates_byte_exact() {
        let (client, peer) = connected_client();
        for i in 0..200 {
            feed(&client, peer, format!("ZADD hugz {} m{:03}\r\n", i, i).as_bytes());
        }
        {
            // consume the 200 :1 replies
            let _ = drain(&client);
        }
        feed(&client, peer, b"ZRANGE hugz 0 -1\r\n");
        // the reply spills past the inline page into the node list; its
        // segment concatenation must equal the single-buffer encoding
        let mut expected = Vec::new();
        expected.extend_from_slice(b"*200\r\n");
        for i in 0..200 {
            let member = format!("m{:03}", i);
            expected.extend_from_slice(format!("${}\r\n{}\r\n", member.len(), member).as_bytes());
        }
        assert_eq!(drain(&client), expected);
    }

    #[test]
    fn zrange_byscore_and_flags_over_the_wire() {
        let (client, peer) = connected_client();
        feed(&client, peer, b"ZADD zr 1 a\r\nZADD zr 2 b\r\nZADD zr 2 c\r\nZADD zr 3 d\r\n");
        let _ = drain(&client);

        feed(&client, peer, b"ZRANGE zr -inf +inf BYSCORE\r\n");
        assert_eq!(drain(&client), b"*4\r\n$1\r\na\r\n$1\r\nb\r\n$1\r\nc\r\n$1\r\nd\r\n");

        feed(&client, peer, b"ZRANGE zr (1 3 BYSCORE\r\n");
        assert_eq!(drain(&client), b"*3\r\n$1\r\nb\r\n$1\r\nc\r\n$1\r\nd\r\n");

        feed(&client, peer, b"ZRANGE zr 0 -1 REV\r\n");
        assert_eq!(drain(&client), b"*4\r\n$1\r\nd\r\n$1\r\nc\r\n$1\r\nb\r\n$1\r\na\r\n");

        feed(&client, peer, b"ZRANGE zr 0 -1 LIMIT 1 2\r\n");
        assert_eq!(drain(&client), b"*2\r\n$1\r\nb\r\n$1\r\nc\r\n");

        feed(&client, peer, b"ZRANGE zr 0 -1 LIMIT x 2\r\n");
        assert_eq!(drain(&client), b":-1\r\n");
    }

    #[test]
    fn list_commands_over_the_wire() {
        let (client, peer) = connected_client();
        feed(&client, peer, b"RPUSH wirelist b\r\nRPUSH wirelist c\r\nLPUSH wirelist a\r\n");
        assert_eq!(drain(&client), b":1\r\n:2\r\n:3\r\n");
        feed(&client, peer, b"LPOP wirelist\r\nRPOP wirelist\r\nLPOP wirelist\r\nLPOP wirelist\r\n");
        assert_eq!(drain(&client), b"$1\r\na\r\n$1\r\nc\r\n$1\r\nb\r\n$-1\r\n");
    }

    #[test]
    fn type_errors_reply_with_the_sentinel() {
        let (client, peer) = connected_client();
        feed(&client, peer, b"SET strkey v\r\nSADD strkey m\r\nZADD strkey 1 m\r\nLPUSH strkey v\r\n");
        assert_eq!(drain(&client), b":0\r\n:-1\r\n:-1\r\n:-1\r\n");

        feed(&client, peer, b"SADD setk m\r\nGET setk\r\n");
        assert_eq!(drain(&client), b":1\r\n:-1\r\n");
    }

    #[test]
    fn zscore_and_zrank_reply_null_when_missing() {
        let (client, peer) = connected_client();
        feed(&client, peer, b"ZADD zs 1.5 m\r\nZSCORE zs m\r\nZSCORE zs nope\r\nZRANK zs nope\r\nZRANK nozset m\r\n");
        assert_eq!(drain(&client), b":1\r\n$8\r\n1.500000\r\n$-1\r\n$-1\r\n$-1\r\n");
    }

    #[test]
    fn del_removes_the_key() {
        let (client, peer) = connected_client();
        feed(&client, peer, b"SET delk v\r\nDEL delk\r\nGET delk\r\nDEL delk\r\n");
        assert_eq!(drain(&client), b":0\r\n:0\r\n$-1\r\n:-1\r\n");
    }
}
