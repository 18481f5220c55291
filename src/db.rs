//! The keyspace: a dict of key -> value object next to a parallel dict of
//! key -> absolute expiration deadline (milliseconds). Every key with a
//! deadline also lives in the main dict. Reads expire lazily; the cron
//! drives the active cycle through `scan_expires`.

use std::sync::Arc;
use crate::{dict::Dict, obj::RedisObject, util::{get_time_ms, log, LogLevel}};

pub const SET_KEY_KEEP_TTL: u8 = 1;

pub struct RedisDb {
    dict: Dict<String, Arc<RedisObject>>,
    expires: Dict<String, u64>,
    expire_cursor: usize,
}

impl RedisDb {
    pub fn new() -> RedisDb {
        RedisDb {
            dict: Dict::new(),
            expires: Dict::new(),
            expire_cursor: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.dict.size()
    }

    pub fn expires_size(&self) -> usize {
        self.expires.size()
    }

    /// Look the key up, deleting it first if its deadline has passed.
    pub fn lookup_key(&mut self, key: &str) -> Option<Arc<RedisObject>> {
        let key = key.to_string();
        if self.is_key_expired(&key) {
            log(LogLevel::Debug, &format!("lookup key: '{}' expired", key));
            self.dict.delete(&key);
            self.expires.delete(&key);
            return None;
        }
        self.dict.get(&key).cloned()
    }

    /// Install the value under the key, releasing any previous value. The
    /// prior expiration is cleared unless KEEP_TTL is given; a positive
    /// `expire_ms` deadline (absolute) installs a new one.
    pub fn set_key(&mut self, key: &str, val: Arc<RedisObject>, expire_ms: u64, flags: u8) {
        self.dict.replace(key.to_string(), val);
        if flags & SET_KEY_KEEP_TTL == 0 {
            self.expires.delete(&key.to_string());
        }
        if expire_ms > 0 {
            self.expires.replace(key.to_string(), expire_ms);
        }
    }

    /// Remove the key from both tables. False if it was absent.
    pub fn delete_key(&mut self, key: &str) -> bool {
        let key = key.to_string();
        if !self.dict.delete(&key) {
            return false;
        }
        if self.expires.size() > 0 {
            self.expires.delete(&key);
        }
        true
    }

    /// One scan step over the expires table from the stored cursor. The
    /// callback sees every (key, deadline) pair of the visited bucket; the
    /// cursor wraps to zero when the table has been covered.
    pub fn scan_expires<F>(&mut self, f: F)
    where F: FnMut(&String, &u64) {
        self.expire_cursor = self.expires.scan(self.expire_cursor, f);
    }

    /// Fraction of the keyspace carrying a deadline.
    pub fn expired_percentage(&self) -> f64 {
        if self.dict.size() > 0 {
            self.expires.size() as f64 / self.dict.size() as f64
        } else {
            0.0
        }
    }

    pub fn is_key_expired(&mut self, key: &String) -> bool {
        if self.expires.size() == 0 {
            return false;
        }
        match self.expires.get(key) {
            Some(&when) => when <= get_time_ms(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::add_ms_to_now;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn set_and_lookup() {
        let mut db = RedisDb::new();
        db.set_key("k", RedisObject::create_string("v"), 0, 0);
        let obj = db.lookup_key("k").unwrap();
        assert_eq!(obj.string(), Some(&"v".to_string()));
        assert!(db.lookup_key("missing").is_none());
    }

    #[test]
    fn overwrite_releases_old_value() {
        let mut db = RedisDb::new();
        let old = RedisObject::create_string("v1");
        db.set_key("k", old.clone(), 0, 0);
        db.set_key("k", RedisObject::create_string("v2"), 0, 0);
        // the keyspace dropped its reference to the old object
        assert_eq!(Arc::strong_count(&old), 1);
        assert_eq!(db.lookup_key("k").unwrap().string(), Some(&"v2".to_string()));
        assert_eq!(db.size(), 1);
    }

    #[test]
    fn delete_clears_both_tables() {
        let mut db = RedisDb::new();
        db.set_key("k", RedisObject::create_string("v"), add_ms_to_now(10_000), 0);
        assert_eq!(db.expires_size(), 1);
        assert!(db.delete_key("k"));
        assert!(!db.delete_key("k"));
        assert_eq!(db.size(), 0);
        assert_eq!(db.expires_size(), 0);
    }

    #[test]
    fn lazy_expiration() {
        let mut db = RedisDb::new();
        db.set_key("k", RedisObject::create_string("v"), add_ms_to_now(30), 0);
        assert!(db.lookup_key("k").is_some());
        sleep(Duration::from_millis(60));
        assert!(db.lookup_key("k").is_none());
        // the expired key is gone from both tables
        assert_eq!(db.size(), 0);
        assert_eq!(db.expires_size(), 0);
    }

    #[test]
    fn keep_ttl_flag() {
        let mut db = RedisDb::new();
        let deadline = add_ms_to_now(10_000);
        db.set_key("k", RedisObject::create_string("v1"), deadline, 0);
        db.set_key("k", RedisObject::create_string("v2"), 0, SET_KEY_KEEP_TTL);
        assert_eq!(db.expires_size(), 1);

        // without the flag the overwrite clears the deadline
        db.set_key("k", RedisObject::create_string("v3"), 0, 0);
        assert_eq!(db.expires_size(), 0);
    }

    #[test]
    fn expires_contained_in_main() {
        let mut db = RedisDb::new();
        for i in 0..64 {
            let key = format!("k{}", i);
            let expire = if i % 2 == 0 { add_ms_to_now(10_000) } else { 0 };
            db.set_key(&key, RedisObject::create_string("v"), expire, 0);
        }
        let mut expire_keys = Vec::new();
        // a full scan pass collects every expires entry
        loop {
            db.scan_expires(|k, _| expire_keys.push(k.clone()));
            if db.expire_cursor == 0 {
                break;
            }
        }
        assert_eq!(expire_keys.len(), 32);
        for k in expire_keys {
            assert!(db.lookup_key(&k).is_some());
        }
    }
}
