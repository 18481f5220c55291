//!
//! The command table and the command procs.
//!
//! Every proc parses its own arguments, consults the keyspace, and appends
//! a RESP reply: `:0` for plain success, `:-1` for protocol or type
//! errors, `$-1` for missing values where the protocol calls for a null.
//! Data errors never tear the connection down.

use std::{collections::HashMap, sync::Arc};
use once_cell::sync::Lazy;
use crate::{
    client::Client,
    list::List,
    obj::RedisObject,
    reply::{from_array, from_bulk_string, from_float, from_int64, null, REPLY_ERR, REPLY_OK},
    server::server_write,
    set::Set,
    util::{add_ms_to_now, to_int64},
    zset::{LimitSpec, RangeByRankSpec, RangeByScoreSpec, ZSet, ZSetEntry},
};

type CommandProc = Arc<dyn Fn(&mut Client) + Sync + Send>;

pub struct RedisCommand {
    name: &'static str,
    proc: CommandProc,
    arity: i32,
}

impl RedisCommand {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn arity(&self) -> i32 {
        self.arity
    }

    pub fn proc(&self) -> CommandProc {
        self.proc.clone()
    }
}

/// Command Table
static CMD_TABLE: Lazy<HashMap<&'static str, Arc<RedisCommand>>> = Lazy::new(|| {
    HashMap::from([
        ("set", Arc::new(RedisCommand { name: "set", proc: Arc::new(set_command) as CommandProc, arity: -3 })),
        ("get", Arc::new(RedisCommand { name: "get", proc: Arc::new(get_command) as CommandProc, arity: 2 })),
        ("del", Arc::new(RedisCommand { name: "del", proc: Arc::new(del_command) as CommandProc, arity: 2 })),

        ("sadd", Arc::new(RedisCommand { name: "sadd", proc: Arc::new(sadd_command) as CommandProc, arity: -3 })),
        ("srem", Arc::new(RedisCommand { name: "srem", proc: Arc::new(srem_command) as CommandProc, arity: -3 })),
        ("sismember", Arc::new(RedisCommand { name: "sismember", proc: Arc::new(sismember_command) as CommandProc, arity: 3 })),
        ("smembers", Arc::new(RedisCommand { name: "smembers", proc: Arc::new(smembers_command) as CommandProc, arity: 2 })),
        ("scard", Arc::new(RedisCommand { name: "scard", proc: Arc::new(scard_command) as CommandProc, arity: 2 })),

        ("zadd", Arc::new(RedisCommand { name: "zadd", proc: Arc::new(zadd_command) as CommandProc, arity: -4 })),
        ("zrem", Arc::new(RedisCommand { name: "zrem", proc: Arc::new(zrem_command) as CommandProc, arity: -3 })),
        ("zrank", Arc::new(RedisCommand { name: "zrank", proc: Arc::new(zrank_command) as CommandProc, arity: 3 })),
        ("zscore", Arc::new(RedisCommand { name: "zscore", proc: Arc::new(zscore_command) as CommandProc, arity: 3 })),
        ("zcard", Arc::new(RedisCommand { name: "zcard", proc: Arc::new(zcard_command) as CommandProc, arity: 2 })),
        ("zrange", Arc::new(RedisCommand { name: "zrange", proc: Arc::new(zrange_command) as CommandProc, arity: -4 })),

        ("lpush", Arc::new(RedisCommand { name: "lpush", proc: Arc::new(lpush_command) as CommandProc, arity: 3 })),
        ("rpush", Arc::new(RedisCommand { name: "rpush", proc: Arc::new(rpush_command) as CommandProc, arity: 3 })),
        ("lpop", Arc::new(RedisCommand { name: "lpop", proc: Arc::new(lpop_command) as CommandProc, arity: 2 })),
        ("rpop", Arc::new(RedisCommand { name: "rpop", proc: Arc::new(rpop_command) as CommandProc, arity: 2 })),
    ])
});

pub fn lookup_command(name: &str) -> Option<Arc<RedisCommand>> {
    let name = name.to_lowercase();
    CMD_TABLE.get(&name[..]).cloned()
}

/// call() is the core of the execution of a command.
pub fn call(c: &mut Client, cmd: Arc<RedisCommand>) {
    let f = cmd.proc();
    f(c);
    server_write().stat_numcommands += 1;
}

fn add_reply_err(c: &mut Client) {
    c.add_reply(&from_int64(REPLY_ERR));
}

fn add_reply_ok(c: &mut Client) {
    c.add_reply(&from_int64(REPLY_OK));
}

// -------------------------------- strings ---------------------------------

fn set_command(c: &mut Client) {
    let argv = c.argv().to_vec();
    let mut expire = 0u64;
    if argv.len() > 3 {
        match to_int64(&argv[3]) {
            Some(ttl) if ttl > 0 => {
                expire = add_ms_to_now(ttl as u64);
            },
            _ => {
                add_reply_err(c);
                return;
            },
        }
    }
    let db = c.db();
    db.write().unwrap().set_key(&argv[1], RedisObject::create_string(&argv[2]), expire, 0);
    server_write().dirty += 1;
    add_reply_ok(c);
}

fn get_command(c: &mut Client) {
    let argv = c.argv().to_vec();
    let db = c.db();
    let obj = db.write().unwrap().lookup_key(&argv[1]);
    match obj {
        None => c.add_reply(&null()),
        Some(obj) => match obj.string() {
            Some(s) => c.add_reply(&from_bulk_string(s)),
            None => add_reply_err(c),
        },
    }
}

fn del_command(c: &mut Client) {
    let argv = c.argv().to_vec();
    let db = c.db();
    let deleted = db.write().unwrap().delete_key(&argv[1]);
    if deleted {
        server_write().dirty += 1;
        add_reply_ok(c);
    } else {
        add_reply_err(c);
    }
}

// --------------------------------- sets -----------------------------------

fn sadd_command(c: &mut Client) {
    let argv = c.argv().to_vec();
    let db = c.db();
    let mut d = db.write().unwrap();
    let obj = match d.lookup_key(&argv[1]) {
        Some(obj) => {
            if obj.set().is_none() {
                drop(d);
                add_reply_err(c);
                return;
            }
            obj
        },
        None => {
            let obj = RedisObject::create_set(Set::new());
            d.set_key(&argv[1], obj.clone(), 0, 0);
            obj
        },
    };
    let mut added = 0i64;
    {
        let set_lock = obj.set().unwrap();
        let mut set = set_lock.write().unwrap();
        for member in &argv[2..] {
            if set.add(member) {
                added += 1;
            }
        }
    }
    drop(d);
    server_write().dirty += added as u64;
    c.add_reply(&from_int64(added));
}

fn srem_command(c: &mut Client) {
    let argv = c.argv().to_vec();
    let db = c.db();
    let mut d = db.write().unwrap();
    let obj = match d.lookup_key(&argv[1]) {
        Some(obj) if obj.set().is_some() => obj,
        _ => {
            drop(d);
            add_reply_err(c);
            return;
        },
    };
    let mut removed = 0i64;
    {
        let set_lock = obj.set().unwrap();
        let mut set = set_lock.write().unwrap();
        for member in &argv[2..] {
            if set.remove(member) {
                removed += 1;
            }
        }
    }
    drop(d);
    server_write().dirty += removed as u64;
    c.add_reply(&from_int64(removed));
}

fn sismember_command(c: &mut Client) {
    let argv = c.argv().to_vec();
    let db = c.db();
    let mut d = db.write().unwrap();
    let obj = match d.lookup_key(&argv[1]) {
        Some(obj) if obj.set().is_some() => obj,
        _ => {
            drop(d);
            add_reply_err(c);
            return;
        },
    };
    let is_member = obj.set().unwrap().write().unwrap().contains(&argv[2]);
    drop(d);
    c.add_reply(&from_int64(if is_member { 1 } else { 0 }));
}

fn smembers_command(c: &mut Client) {
    let argv = c.argv().to_vec();
    let db = c.db();
    let mut d = db.write().unwrap();
    let obj = match d.lookup_key(&argv[1]) {
        Some(obj) if obj.set().is_some() => obj,
        _ => {
            drop(d);
            add_reply_err(c);
            return;
        },
    };
    let members = obj.set().unwrap().read().unwrap().members();
    drop(d);
    c.add_reply(&from_array(&members));
}

fn scard_command(c: &mut Client) {
    let argv = c.argv().to_vec();
    let db = c.db();
    let mut d = db.write().unwrap();
    let obj = match d.lookup_key(&argv[1]) {
        Some(obj) if obj.set().is_some() => obj,
        _ => {
            drop(d);
            add_reply_err(c);
            return;
        },
    };
    let size = obj.set().unwrap().read().unwrap().size();
    drop(d);
    c.add_reply(&from_int64(size as i64));
}

// ------------------------------ sorted sets --------------------------------

fn zadd_command(c: &mut Client) {
    let argv = c.argv().to_vec();
    if (argv.len() - 2) % 2 != 0 {
        add_reply_err(c);
        return;
    }
    // parse every (score, member) pair before touching the keyspace
    let mut pairs: Vec<(f64, &String)> = Vec::new();
    let mut i = 2;
    while i + 1 < argv.len() {
        let score: f64 = match argv[i].parse() {
            Ok(s) => s,
            Err(_) => {
                add_reply_err(c);
                return;
            },
        };
        pairs.push((score, &argv[i + 1]));
        i += 2;
    }
    let db = c.db();
    let mut d = db.write().unwrap();
    let obj = match d.lookup_key(&argv[1]) {
        Some(obj) => {
            if obj.zset().is_none() {
                drop(d);
                add_reply_err(c);
                return;
            }
            obj
        },
        None => {
            let obj = RedisObject::create_zset(ZSet::new());
            d.set_key(&argv[1], obj.clone(), 0, 0);
            obj
        },
    };
    let mut added = 0i64;
    {
        let zset_lock = obj.zset().unwrap();
        let mut zset = zset_lock.write().unwrap();
        for (score, member) in pairs {
            if zset.insert_or_update(member, score) {
                added += 1;
            }
        }
    }
    drop(d);
    server_write().dirty += 1;
    c.add_reply(&from_int64(added));
}

fn zrem_command(c: &mut Client) {
    let argv = c.argv().to_vec();
    let db = c.db();
    let mut d = db.write().unwrap();
    let obj = match d.lookup_key(&argv[1]) {
        Some(obj) if obj.zset().is_some() => obj,
        _ => {
            drop(d);
            add_reply_err(c);
            return;
        },
    };
    let mut removed = 0i64;
    {
        let zset_lock = obj.zset().unwrap();
        let mut zset = zset_lock.write().unwrap();
        for member in &argv[2..] {
            if zset.delete(member) {
                removed += 1;
            }
        }
    }
    drop(d);
    server_write().dirty += removed as u64;
    c.add_reply(&from_int64(removed));
}

fn zrank_command(c: &mut Client) {
    let argv = c.argv().to_vec();
    let db = c.db();
    let mut d = db.write().unwrap();
    let rank = match d.lookup_key(&argv[1]) {
        Some(obj) => match obj.zset() {
            Some(zset) => zset.write().unwrap().rank_of(&argv[2]),
            None => None,
        },
        None => None,
    };
    drop(d);
    match rank {
        Some(r) => c.add_reply(&from_int64(r as i64)),
        None => c.add_reply(&null()),
    }
}

fn zscore_command(c: &mut Client) {
    let argv = c.argv().to_vec();
    let db = c.db();
    let mut d = db.write().unwrap();
    let score = match d.lookup_key(&argv[1]) {
        Some(obj) => match obj.zset() {
            Some(zset) => zset.write().unwrap().score_of(&argv[2]),
            None => None,
        },
        None => None,
    };
    drop(d);
    match score {
        Some(s) => c.add_reply(&from_float(s)),
        None => c.add_reply(&null()),
    }
}

fn zcard_command(c: &mut Client) {
    let argv = c.argv().to_vec();
    let db = c.db();
    let mut d = db.write().unwrap();
    let obj = match d.lookup_key(&argv[1]) {
        Some(obj) if obj.zset().is_some() => obj,
        _ => {
            drop(d);
            add_reply_err(c);
            return;
        },
    };
    let size = obj.zset().unwrap().read().unwrap().size();
    drop(d);
    c.add_reply(&from_int64(size as i64));
}

const FLAG_BY_SCORE: &str = "BYSCORE";
const FLAG_REVERSE: &str = "REV";
const FLAG_LIMIT: &str = "LIMIT";
const FLAG_WITH_SCORES: &str = "WITHSCORES";
const MAX_SCORE: &str = "+inf";
const MIN_SCORE: &str = "-inf";

/// Flags start after `key start stop`.
fn has_flag(argv: &[String], flag: &str) -> bool {
    argv.iter().skip(4).any(|a| a.eq_ignore_ascii_case(flag))
}

/// `LIMIT offset count`; count < 0 means unbounded. Err on a malformed
/// number, Ok(None) when the flag is absent.
fn parse_limit(argv: &[String]) -> Result<Option<LimitSpec>, ()> {
    for i in 4..argv.len() {
        if argv[i].eq_ignore_ascii_case(FLAG_LIMIT) {
            if i + 2 >= argv.len() {
                return Err(());
            }
            let offset = to_int64(&argv[i + 1]).ok_or(())?;
            let count = to_int64(&argv[i + 2]).ok_or(())?;
            if offset < 0 {
                return Err(());
            }
            return Ok(Some(LimitSpec { offset: offset as usize, count }));
        }
    }
    Ok(None)
}

/// Rank range term: an integer, `(n` for exclusive, with the infinities
/// mapping to the index extremes.
fn parse_rank_term(term: &str) -> Option<(i64, bool)> {
    if term == MIN_SCORE {
        return Some((0, false));
    }
    if term == MAX_SCORE {
        return Some((i64::MAX, false));
    }
    if let Some(rest) = term.strip_prefix('(') {
        return to_int64(rest).map(|v| (v, true));
    }
    to_int64(term).map(|v| (v, false))
}

/// Score range term: a double, `(x` for exclusive, `-inf`/`+inf` sentinels.
fn parse_score_term(term: &str) -> Option<(f64, bool)> {
    if term == MIN_SCORE {
        return Some((f64::NEG_INFINITY, false));
    }
    if term == MAX_SCORE || term == "inf" {
        return Some((f64::INFINITY, false));
    }
    if let Some(rest) = term.strip_prefix('(') {
        return rest.parse().ok().map(|v| (v, true));
    }
    term.parse().ok().map(|v| (v, false))
}

fn zrange_command(c: &mut Client) {
    let argv = c.argv().to_vec();
    let by_score = has_flag(&argv, FLAG_BY_SCORE);
    let reverse = has_flag(&argv, FLAG_REVERSE);
    let with_scores = has_flag(&argv, FLAG_WITH_SCORES);
    let limit = match parse_limit(&argv) {
        Ok(l) => l,
        Err(_) => {
            add_reply_err(c);
            return;
        },
    };

    let db = c.db();
    let mut d = db.write().unwrap();
    let obj = match d.lookup_key(&argv[1]) {
        Some(obj) if obj.zset().is_some() => obj,
        _ => {
            drop(d);
            add_reply_err(c);
            return;
        },
    };
    let entries: Option<Vec<ZSetEntry>> = {
        let zset_lock = obj.zset().unwrap();
        let zset = zset_lock.read().unwrap();
        if by_score {
            match (parse_score_term(&argv[2]), parse_score_term(&argv[3])) {
                (Some((min, minex)), Some((max, maxex))) => {
                    let spec = RangeByScoreSpec { min, max, minex, maxex, limit, reverse };
                    Some(zset.range_by_score(&spec))
                },
                _ => None,
            }
        } else {
            match (parse_rank_term(&argv[2]), parse_rank_term(&argv[3])) {
                (Some((min, minex)), Some((max, maxex))) => {
                    let spec = RangeByRankSpec { min, max, minex, maxex, limit, reverse };
                    Some(zset.range_by_rank(&spec))
                },
                _ => None,
            }
        }
    };
    drop(d);
    match entries {
        None => add_reply_err(c),
        Some(entries) => {
            let mut members: Vec<String> = Vec::with_capacity(entries.len());
            for entry in &entries {
                members.push(entry.key.clone());
                if with_scores {
                    members.push(crate::util::float_to_string(entry.score));
                }
            }
            c.add_reply(&from_array(&members));
        },
    }
}

// --------------------------------- lists -----------------------------------

fn push_generic_command(c: &mut Client, tail: bool) {
    let argv = c.argv().to_vec();
    let db = c.db();
    let mut d = db.write().unwrap();
    let obj = match d.lookup_key(&argv[1]) {
        Some(obj) => {
            if obj.list().is_none() {
                drop(d);
                add_reply_err(c);
                return;
            }
            obj
        },
        None => {
            let obj = RedisObject::create_list(List::new());
            d.set_key(&argv[1], obj.clone(), 0, 0);
            obj
        },
    };
    let len = {
        let list_lock = obj.list().unwrap();
        let mut list = list_lock.write().unwrap();
        if tail {
            list.rpush(&argv[2]);
        } else {
            list.lpush(&argv[2]);
        }
        list.size()
    };
    drop(d);
    server_write().dirty += 1;
    c.add_reply(&from_int64(len as i64));
}

fn lpush_command(c: &mut Client) {
    push_generic_command(c, false);
}

fn rpush_command(c: &mut Client) {
    push_generic_command(c, true);
}

fn pop_generic_command(c: &mut Client, tail: bool) {
    let argv = c.argv().to_vec();
    let db = c.db();
    let mut d = db.write().unwrap();
    let obj = match d.lookup_key(&argv[1]) {
        Some(obj) => obj,
        None => {
            drop(d);
            c.add_reply(&null());
            return;
        },
    };
    if obj.list().is_none() {
        drop(d);
        add_reply_err(c);
        return;
    }
    let (popped, remaining) = {
        let list_lock = obj.list().unwrap();
        let mut list = list_lock.write().unwrap();
        let popped = if tail { list.rpop() } else { list.lpop() };
        (popped, list.size())
    };
    if remaining == 0 {
        d.delete_key(&argv[1]);
    }
    drop(d);
    match popped {
        Some(v) => {
            server_write().dirty += 1;
            c.add_reply(&from_bulk_string(&v));
        },
        None => c.add_reply(&null()),
    }
}

fn lpop_command(c: &mut Client) {
    pop_generic_command(c, false);
}

fn rpop_command(c: &mut Client) {
    pop_generic_command(c, true);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lookup_is_case_insensitive() {
        assert!(lookup_command("SET").is_some());
        assert!(lookup_command("set").is_some());
        assert!(lookup_command("ZrAnGe").is_some());
        assert!(lookup_command("nope").is_none());
        assert_eq!(lookup_command("GET").unwrap().arity(), 2);
    }

    #[test]
    fn rank_terms() {
        assert_eq!(parse_rank_term("5"), Some((5, false)));
        assert_eq!(parse_rank_term("-2"), Some((-2, false)));
        assert_eq!(parse_rank_term("(3"), Some((3, true)));
        assert_eq!(parse_rank_term("-inf"), Some((0, false)));
        assert_eq!(parse_rank_term("+inf"), Some((i64::MAX, false)));
        assert_eq!(parse_rank_term("abc"), None);
    }

    #[test]
    fn score_terms() {
        assert_eq!(parse_score_term("1.5"), Some((1.5, false)));
        assert_eq!(parse_score_term("(2"), Some((2.0, true)));
        assert_eq!(parse_score_term("-inf"), Some((f64::NEG_INFINITY, false)));
        assert_eq!(parse_score_term("+inf"), Some((f64::INFINITY, false)));
        assert_eq!(parse_score_term("x"), None);
    }

    #[test]
    fn limit_parsing() {
        let argv: Vec<String> = ["zrange", "z", "0", "-1", "LIMIT", "2", "5"]
            .iter().map(|s| s.to_string()).collect();
        let limit = parse_limit(&argv).unwrap().unwrap();
        assert_eq!(limit.offset, 2);
        assert_eq!(limit.count, 5);

        let argv: Vec<String> = ["zrange", "z", "0", "-1"].iter().map(|s| s.to_string()).collect();
        assert!(parse_limit(&argv).unwrap().is_none());

        let argv: Vec<String> = ["zrange", "z", "0", "-1", "LIMIT", "x", "5"]
            .iter().map(|s| s.to_string()).collect();
        assert!(parse_limit(&argv).is_err());

        let argv: Vec<String> = ["zrange", "z", "0", "-1", "LIMIT", "2"]
            .iter().map(|s| s.to_string()).collect();
        assert!(parse_limit(&argv).is_err());
    }

    #[test]
    fn flag_detection_skips_positional_args() {
        let argv: Vec<String> = ["zrange", "REV", "0", "-1"].iter().map(|s| s.to_string()).collect();
        // "REV" in key position is not a flag
        assert!(!has_flag(&argv, FLAG_REVERSE));
        let argv: Vec<String> = ["zrange", "z", "0", "-1", "rev"].iter().map(|s| s.to_string()).collect();
        assert!(has_flag(&argv, FLAG_REVERSE));
    }
}
