//!
//! The server: one long-lived process-wide value.
//!
//! Holds the listening socket, the keyspace handle and the stats; commands
//! reach it through the shared accessors. `init_server` wires the accept
//! handler into the event loop and starts the cron time event.

use std::{collections::{HashMap, HashSet}, net::Ipv4Addr, sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard}};
use once_cell::sync::Lazy;
use crate::{
    ae::{create_file_event, create_time_event, Mask},
    client::Client,
    connection::{close_conn, register_conn, ConnState, Connection},
    db::RedisDb,
    expire::active_expire_cycle,
    util::{log, timestamp, LogLevel},
};

pub const IO_BUF_LEN: usize = 4096;
const DEFAULT_PORT: u16 = 6379;
const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
const CRON_PERIOD_MS: u64 = 1000;

/// Server state.
pub static SERVER: Lazy<Arc<RwLock<RedisServer>>> = Lazy::new(|| Arc::new(RwLock::new(RedisServer::new())));
pub fn server_read() -> RwLockReadGuard<'static, RedisServer> {
    SERVER.read().unwrap()
}
pub fn server_write() -> RwLockWriteGuard<'static, RedisServer> {
    SERVER.write().unwrap()
}

/// Connected clients, fd keyed.
pub static CLIENTS: Lazy<RwLock<HashMap<i32, Arc<RwLock<Client>>>>> = Lazy::new(|| RwLock::new(HashMap::new()));
pub fn clients_read() -> RwLockReadGuard<'static, HashMap<i32, Arc<RwLock<Client>>>> {
    CLIENTS.read().unwrap()
}
pub fn clients_write() -> RwLockWriteGuard<'static, HashMap<i32, Arc<RwLock<Client>>>> {
    CLIENTS.write().unwrap()
}

/// Clients waiting to be reclaimed at the top of the next loop pass.
/// Freeing in place would pull a client out from under its own handler.
pub static DELETED_CLIENTS: Lazy<RwLock<HashSet<i32>>> = Lazy::new(|| RwLock::new(HashSet::new()));

pub fn lookup_client(fd: i32) -> Option<Arc<RwLock<Client>>> {
    clients_read().get(&fd).cloned()
}

pub fn free_client(fd: i32) {
    DELETED_CLIENTS.write().unwrap().insert(fd);
}

pub struct RedisServer {
    port: u16,
    bind_addr: String,
    pub fd: i32,
    db: Arc<RwLock<RedisDb>>,
    // Configuration
    verbosity: LogLevel,
    log_file: String,
    // changes to the DB from the last start
    pub dirty: u64,
    cron_loops: u64,
    // Fields used only for stats
    stat_starttime: u64,
    pub stat_numcommands: u64,
    pub stat_numconnections: u64,
}

impl RedisServer {
    pub fn new() -> RedisServer {
        RedisServer {
            port: DEFAULT_PORT,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            fd: -1,
            db: Arc::new(RwLock::new(RedisDb::new())),
            verbosity: LogLevel::Verbose,
            log_file: String::new(), // "" = log on standard output
            dirty: 0,
            cron_loops: 0,
            stat_starttime: timestamp().as_secs(),
            stat_numcommands: 0,
            stat_numconnections: 0,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub fn bind_addr(&self) -> &str {
        &self.bind_addr
    }

    pub fn db(&self) -> Arc<RwLock<RedisDb>> {
        self.db.clone()
    }

    pub fn verbosity(&self) -> LogLevel {
        self.verbosity.clone()
    }

    pub fn log_file(&self) -> &str {
        &self.log_file
    }
}

/// Create the listening socket and wire it into the event loop together
/// with the cron time event.
pub fn init_server() -> Result<(), String> {
    let (addr, port) = {
        let server = server_read();
        (server.bind_addr().to_string(), server.port())
    };
    let mut conn = Connection::new(-1);
    conn.bind_and_listen(&addr, port)?;
    let fd = conn.fd();
    server_write().fd = fd;
    // the listening connection stays registered for the lifetime of the
    // process; dropping it would close the socket
    register_conn(Arc::new(RwLock::new(conn)));
    create_file_event(fd, Mask::readable(), Arc::new(accept_handler))?;
    create_time_event(CRON_PERIOD_MS, Arc::new(server_cron), None, None);
    Ok(())
}

/// File event handler: accept a connection request and attach a client.
pub fn accept_handler(fd: i32, _mask: Mask) {
    let mut conn = Connection::new(fd);
    conn.set_state(ConnState::Accepting);
    let (c_ip, c_port) = match conn.accept() {
        Ok(peer) => peer,
        Err(e) => {
            log(LogLevel::Warning, &format!("Accepting client connection: {}", e));
            return;
        },
    };
    log(LogLevel::Verbose, &format!("Accepted {}:{}", Ipv4Addr::from(c_ip), c_port));

    let c_fd = conn.fd();
    let conn = Arc::new(RwLock::new(conn));
    register_conn(conn.clone());
    match Client::create(conn) {
        Ok(client) => {
            clients_write().insert(c_fd, client);
            server_write().stat_numconnections += 1;
        },
        Err(e) => {
            log(LogLevel::Warning, &format!("Error allocating resources for the client: {}", e));
            close_conn(c_fd);
        },
    }
}

/// Time event handler: server cron tasks.
pub fn server_cron(_id: i64, _client_data: Option<Arc<dyn std::any::Any + Sync + Send>>) -> i64 {
    let loops = {
        let mut server = server_write();
        server.cron_loops += 1;
        server.cron_loops
    };

    // Show some info about the keyspace, now and then
    if loops % 5 == 0 {
        let db = { server_read().db() };
        let (used, vkeys) = {
            let d = db.read().unwrap();
            (d.size(), d.expires_size())
        };
        if used != 0 || vkeys != 0 {
            log(LogLevel::Verbose, &format!("DB: {} keys ({} volatile)", used, vkeys));
        }
        let connections = clients_read().len();
        log(LogLevel::Verbose, &format!("{} clients connected", connections));
    }

    // Try to expire a few timed out keys
    active_expire_cycle();

    1
}

/// Runs before every poll: reclaim clients marked for deletion, tearing
/// their events and registry entries down so the fds close.
pub fn before_sleep() {
    let deleted: Vec<i32> = {
        let set = DELETED_CLIENTS.read().unwrap();
        if set.is_empty() {
            return;
        }
        set.iter().copied().collect()
    };
    for fd in deleted {
        clients_write().remove(&fd);
        close_conn(fd);
    }
    DELETED_CLIENTS.write().unwrap().clear();
}

/// Touch the lazy globals so unit tests run against initialized state.
#[cfg(test)]
pub fn init_server_state_for_tests() {
    drop(server_read());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let server = RedisServer::new();
        assert_eq!(server.port(), DEFAULT_PORT);
        assert_eq!(server.bind_addr(), DEFAULT_BIND_ADDR);
        assert_eq!(server.fd, -1);
        assert!(server.log_file().is_empty());
    }

    #[test]
    fn deleted_clients_are_swept() {
        free_client(99999); // no such client: the sweep must tolerate it
        before_sleep();
        assert!(DELETED_CLIENTS.read().unwrap().is_empty());
    }
}
