//! Reference counted value objects stored in the keyspace.
//!
//! One tag, one payload. Objects are shared as `Arc<RedisObject>`: cloning
//! the Arc is the incref, dropping it the decref, and the payload is
//! destroyed when the last holder lets go. Collection payloads sit behind a
//! `RwLock` because commands mutate them through the shared handle.

use std::sync::{Arc, RwLock};
use crate::{list::List, set::Set, zset::ZSet};

pub enum RedisObject {
    String(String),
    Set(RwLock<Set>),
    ZSet(RwLock<ZSet>),
    List(RwLock<List>),
}

impl RedisObject {
    pub fn create_string(val: &str) -> Arc<RedisObject> {
        Arc::new(RedisObject::String(val.to_string()))
    }

    pub fn create_set(set: Set) -> Arc<RedisObject> {
        Arc::new(RedisObject::Set(RwLock::new(set)))
    }

    pub fn create_zset(zset: ZSet) -> Arc<RedisObject> {
        Arc::new(RedisObject::ZSet(RwLock::new(zset)))
    }

    pub fn create_list(list: List) -> Arc<RedisObject> {
        Arc::new(RedisObject::List(RwLock::new(list)))
    }

    /// Typed accessors: None is the wrong-type signal the command layer
    /// translates into an error reply.
    pub fn string(&self) -> Option<&String> {
        match self {
            RedisObject::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn set(&self) -> Option<&RwLock<Set>> {
        match self {
            RedisObject::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn zset(&self) -> Option<&RwLock<ZSet>> {
        match self {
            RedisObject::ZSet(z) => Some(z),
            _ => None,
        }
    }

    pub fn list(&self) -> Option<&RwLock<List>> {
        match self {
            RedisObject::List(l) => Some(l),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_access() {
        let obj = RedisObject::create_string("v");
        assert_eq!(obj.string(), Some(&"v".to_string()));
        assert!(obj.set().is_none());
        assert!(obj.zset().is_none());
        assert!(obj.list().is_none());

        let obj = RedisObject::create_set(Set::new());
        assert!(obj.string().is_none());
        assert!(obj.set().is_some());
    }

    #[test]
    fn payload_shared_until_last_release() {
        let obj = RedisObject::create_set(Set::new());
        let holder = obj.clone();
        assert_eq!(Arc::strong_count(&obj), 2);
        obj.set().unwrap().write().unwrap().add("1");
        drop(holder);
        assert_eq!(Arc::strong_count(&obj), 1);
        assert_eq!(obj.set().unwrap().read().unwrap().size(), 1);
    }
}
