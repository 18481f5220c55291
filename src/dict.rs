//! Generic hash table with incremental rehashing.
//!
//! Two bucket arrays coexist: ht[0] is the live table, ht[1] the rehash
//! target. Every find/add/delete pays for one step of the migration so a
//! resize never stalls the event loop. Collisions chain through boxed
//! entries; bucket counts are powers of two tracked as exponents.

use std::{collections::hash_map::DefaultHasher, hash::{Hash, Hasher}, sync::Arc};

const HT_INIT_SIZE: usize = 2;
const HT_INIT_EXP: i32 = 1;
const FORCE_RESIZE_RATIO: f64 = 2.0;

pub type HashFunction<K> = Arc<dyn Fn(&K) -> u64 + Sync + Send>;

pub struct DictEntry<K, V> {
    pub key: K,
    pub val: V,
    next: Option<Box<DictEntry<K, V>>>,
}

pub struct Dict<K, V> {
    ht: [Vec<Option<Box<DictEntry<K, V>>>>; 2],
    ht_used: [usize; 2],
    ht_size_exp: [i32; 2],
    // index of the next ht[0] bucket to migrate, -1 when no rehash is running
    rehash_idx: i64,
    pause_rehash: i64,
    hash_function: Option<HashFunction<K>>,
}

impl<K: Hash + Eq + Clone, V> Dict<K, V> {
    pub fn new() -> Dict<K, V> {
        let mut d = Dict {
            ht: [Vec::new(), Vec::new()],
            ht_used: [0, 0],
            ht_size_exp: [-1, -1],
            rehash_idx: -1,
            pause_rehash: 0,
            hash_function: None,
        };
        d.expand(HT_INIT_SIZE);
        d
    }

    /// Override the default hasher. The customization point mirrors the
    /// optional hash hook of the dict type table; key duplication and value
    /// destruction are covered by Clone and Drop.
    pub fn with_hash_function(hash_function: HashFunction<K>) -> Dict<K, V> {
        let mut d = Dict::new();
        d.hash_function = Some(hash_function);
        d
    }

    pub fn size(&self) -> usize {
        self.ht_used[0] + self.ht_used[1]
    }

    pub fn is_rehashing(&self) -> bool {
        self.rehash_idx >= 0
    }

    pub fn find(&mut self, key: &K) -> Option<&DictEntry<K, V>> {
        self.rehash_step();
        if self.size() == 0 {
            return None;
        }
        for i in 0..2 {
            if self.ht_size_exp[i] < 0 {
                break;
            }
            let idx = self.key_hash_index(key, i);
            let mut entry = self.ht[i][idx].as_ref();
            while let Some(e) = entry {
                if e.key == *key {
                    return Some(e);
                }
                entry = e.next.as_ref();
            }
            if !self.is_rehashing() {
                break;
            }
        }
        None
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.find(key).map(|e| &e.val)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.rehash_step();
        if self.size() == 0 {
            return None;
        }
        // locate the entry first, then take the mutable borrow exactly once
        let mut target: Option<(usize, usize)> = None;
        for i in 0..2 {
            if self.ht_size_exp[i] < 0 {
                break;
            }
            let idx = self.key_hash_index(key, i);
            let mut entry = self.ht[i][idx].as_ref();
            while let Some(e) = entry {
                if e.key == *key {
                    target = Some((i, idx));
                    break;
                }
                entry = e.next.as_ref();
            }
            if target.is_some() || !self.is_rehashing() {
                break;
            }
        }
        let (i, idx) = target?;
        let mut entry = self.ht[i][idx].as_mut();
        while let Some(e) = entry {
            if e.key == *key {
                return Some(&mut e.val);
            }
            entry = e.next.as_mut();
        }
        None
    }

    pub fn contains(&mut self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Add a new key. Fails (returns false) if the key already exists.
    pub fn add(&mut self, key: K, val: V) -> bool {
        self.rehash_step();
        if self.key_exists(&key) {
            return false;
        }
        self.add_raw(key, val);
        true
    }

    /// Idempotent upsert: insert the key or overwrite the value of an
    /// existing entry.
    pub fn replace(&mut self, key: K, val: V) -> bool {
        self.rehash_step();
        if let Some(v) = self.get_mut(&key) {
            *v = val;
            return true;
        }
        self.add_raw(key, val);
        true
    }

    /// Delete the key. Fails if the key is absent.
    pub fn delete(&mut self, key: &K) -> bool {
        self.unlink(key).is_some()
    }

    /// Remove the entry from the table and hand it back to the caller, for
    /// deferred destruction.
    pub fn unlink(&mut self, key: &K) -> Option<(K, V)> {
        self.rehash_step();
        if self.size() == 0 {
            return None;
        }
        for i in 0..2 {
            if self.ht_size_exp[i] < 0 {
                break;
            }
            let idx = self.key_hash_index(key, i);
            // walk the chain re-linking around the match
            let mut found = false;
            let mut slot = &mut self.ht[i][idx];
            loop {
                match slot {
                    None => break,
                    Some(e) if e.key == *key => {
                        found = true;
                        break;
                    },
                    Some(e) => {
                        slot = &mut e.next;
                    },
                }
            }
            if found {
                let mut removed = slot.take().unwrap();
                *slot = removed.next.take();
                self.ht_used[i] -= 1;
                return Some((removed.key, removed.val));
            }
            if !self.is_rehashing() {
                break;
            }
        }
        None
    }

    /// Stateless iteration: visit every entry of bucket `cursor` in both
    /// tables and return the advanced cursor, 0 once the table has been
    /// covered. Rehashing is paused for the duration of the visit so a
    /// migration cannot move a chain out from under the callback.
    pub fn scan<F>(&mut self, cursor: usize, mut f: F) -> usize
    where F: FnMut(&K, &V) {
        self.pause_rehash += 1;
        if self.ht_size_exp[0] >= 0 && cursor < self.ht[0].len() {
            let mut entry = self.ht[0][cursor].as_ref();
            while let Some(e) = entry {
                f(&e.key, &e.val);
                entry = e.next.as_ref();
            }
        }
        if self.is_rehashing() && cursor < self.ht[1].len() {
            let mut entry = self.ht[1][cursor].as_ref();
            while let Some(e) = entry {
                f(&e.key, &e.val);
                entry = e.next.as_ref();
            }
        }
        if self.pause_rehash > 0 {
            self.pause_rehash -= 1;
        }
        let max_size = self.ht[0].len().max(self.ht[1].len());
        if cursor + 1 >= max_size {
            return 0;
        }
        cursor + 1
    }

    /// Collect every key, in no particular order.
    pub fn keys(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.size());
        for i in 0..2 {
            for bucket in &self.ht[i] {
                let mut entry = bucket.as_ref();
                while let Some(e) = entry {
                    keys.push(e.key.clone());
                    entry = e.next.as_ref();
                }
            }
        }
        keys
    }

    pub fn clear(&mut self) {
        self.ht = [Vec::new(), Vec::new()];
        self.ht_used = [0, 0];
        self.ht_size_exp = [-1, -1];
        self.rehash_idx = -1;
        self.pause_rehash = 0;
        self.expand(HT_INIT_SIZE);
    }

    fn key_exists(&mut self, key: &K) -> bool {
        if self.size() == 0 {
            return false;
        }
        for i in 0..2 {
            if self.ht_size_exp[i] < 0 {
                break;
            }
            let idx = self.key_hash_index(key, i);
            let mut entry = self.ht[i][idx].as_ref();
            while let Some(e) = entry {
                if e.key == *key {
                    return true;
                }
                entry = e.next.as_ref();
            }
            if !self.is_rehashing() {
                break;
            }
        }
        false
    }

    /// The caller must have checked the key is absent. While a rehash is
    /// running every insert targets ht[1] so ht[0] can only shrink.
    fn add_raw(&mut self, key: K, val: V) {
        self.expand_if_needed();
        let i = if self.is_rehashing() { 1 } else { 0 };
        let idx = self.key_hash_index(&key, i);
        let entry = Box::new(DictEntry { key, val, next: self.ht[i][idx].take() });
        self.ht[i][idx] = Some(entry);
        self.ht_used[i] += 1;
    }

    fn hash(&self, key: &K) -> u64 {
        match &self.hash_function {
            Some(f) => f(key),
            None => {
                let mut h = DefaultHasher::new();
                key.hash(&mut h);
                h.finish()
            },
        }
    }

    fn ht_mask(&self, i: usize) -> usize {
        if self.ht_size_exp[i] == -1 {
            0
        } else {
            (1usize << self.ht_size_exp[i]) - 1
        }
    }

    fn key_hash_index(&self, key: &K, i: usize) -> usize {
        (self.hash(key) as usize) & self.ht_mask(i)
    }

    fn ht_size(exp: i32) -> usize {
        if exp < 0 {
            0
        } else {
            1usize << exp
        }
    }

    fn next_exp(val: usize) -> i32 {
        if val == 0 {
            return HT_INIT_EXP;
        }
        let mut i = 1;
        while (1usize << i) < val {
            i += 1;
        }
        i
    }

    fn expand_if_needed(&mut self) {
        if self.ht_size_exp[0] < 0 {
            self.expand(HT_INIT_SIZE);
            return;
        }
        let size = Self::ht_size(self.ht_size_exp[0]);
        if (self.ht_used[0] as f64) / (size as f64) >= FORCE_RESIZE_RATIO {
            self.expand(self.ht_used[0] + 1);
        }
    }

    fn expand(&mut self, size: usize) -> bool {
        if self.is_rehashing() || size < self.ht_used[0] {
            return false;
        }
        let new_exp = Self::next_exp(size);
        if new_exp <= self.ht_size_exp[0] {
            return false;
        }
        let new_size = Self::ht_size(new_exp);
        if self.ht_size_exp[0] < 0 {
            // first allocation, not a rehash
            self.ht_size_exp[0] = new_exp;
            self.ht[0] = Self::alloc_table(new_size);
            self.ht_used[0] = 0;
            self.rehash_idx = -1;
            return true;
        }
        self.ht_size_exp[1] = new_exp;
        self.ht[1] = Self::alloc_table(new_size);
        self.ht_used[1] = 0;
        self.rehash_idx = 0;
        true
    }

    fn alloc_table(size: usize) -> Vec<Option<Box<DictEntry<K, V>>>> {
        let mut table = Vec::with_capacity(size);
        for _ in 0..size {
            table.push(None);
        }
        table
    }

    fn rehash_step(&mut self) {
        if self.pause_rehash == 0 {
            self.rehash(1);
        }
    }

    /// Perform n steps of rehashing. A step moves one whole non-empty ht[0]
    /// bucket to ht[1]; at most n*10 empty buckets are skipped so a sparse
    /// table cannot turn a step into a full scan. Returns true while keys
    /// remain to migrate.
    fn rehash(&mut self, n: usize) -> bool {
        if !self.is_rehashing() {
            return false;
        }
        let mut n = n;
        let mut empty_visits = n * 10;
        let dict_size = Self::ht_size(self.ht_size_exp[0]);
        while n > 0 && (self.rehash_idx as usize) < dict_size && self.ht_used[0] > 0 && empty_visits > 0 {
            let idx = self.rehash_idx as usize;
            if self.ht[0][idx].is_none() {
                empty_visits -= 1;
                self.rehash_idx += 1;
                continue;
            }
            let mut entry = self.ht[0][idx].take();
            while let Some(mut e) = entry {
                entry = e.next.take();
                let target = self.key_hash_index(&e.key, 1);
                e.next = self.ht[1][target].take();
                self.ht[1][target] = Some(e);
                self.ht_used[0] -= 1;
                self.ht_used[1] += 1;
            }
            n -= 1;
            self.rehash_idx += 1;
        }
        if self.ht_used[0] == 0 {
            self.ht[0] = std::mem::take(&mut self.ht[1]);
            self.ht_size_exp[0] = self.ht_size_exp[1];
            self.ht_used[0] = self.ht_used[1];
            self.ht[1] = Vec::new();
            self.ht_used[1] = 0;
            self.ht_size_exp[1] = -1;
            self.rehash_idx = -1;
            return false;
        }
        true
    }

    #[cfg(test)]
    fn used(&self, i: usize) -> usize {
        self.ht_used[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_find() {
        let mut dict: Dict<String, i32> = Dict::new();
        assert!(dict.add("key1".to_string(), 1));
        assert!(dict.add("key2".to_string(), 2));
        assert!(!dict.add("key1".to_string(), 3));
        assert_eq!(dict.size(), 2);

        assert_eq!(dict.get(&"key1".to_string()), Some(&1));
        assert_eq!(dict.get(&"key2".to_string()), Some(&2));
        assert_eq!(dict.get(&"key3".to_string()), None);
    }

    #[test]
    fn replace_overwrites() {
        let mut dict: Dict<String, i32> = Dict::new();
        assert!(dict.replace("key".to_string(), 1));
        assert!(dict.replace("key".to_string(), 2));
        assert_eq!(dict.size(), 1);
        assert_eq!(dict.get(&"key".to_string()), Some(&2));
    }

    #[test]
    fn delete_and_unlink() {
        let mut dict: Dict<String, i32> = Dict::new();
        assert!(dict.add("key1".to_string(), 1));
        assert!(dict.add("key2".to_string(), 2));

        assert!(dict.delete(&"key1".to_string()));
        assert!(!dict.delete(&"key1".to_string()));
        assert_eq!(dict.size(), 1);

        let unlinked = dict.unlink(&"key2".to_string());
        assert_eq!(unlinked, Some(("key2".to_string(), 2)));
        assert_eq!(dict.size(), 0);
        assert!(dict.unlink(&"key2".to_string()).is_none());
    }

    #[test]
    fn size_counts_both_tables() {
        let mut dict: Dict<String, usize> = Dict::new();
        // enough inserts to force several expansions mid-flight
        for i in 0..1024 {
            assert!(dict.add(format!("key{}", i), i));
            assert_eq!(dict.size(), i + 1);
        }
        for i in 0..1024 {
            assert_eq!(dict.get(&format!("key{}", i)), Some(&i));
        }
        // drain the rehash; once it settles ht[1] must be empty
        while dict.rehash(1) {}
        assert!(!dict.is_rehashing());
        assert_eq!(dict.used(1), 0);
        assert_eq!(dict.size(), 1024);
    }

    #[test]
    fn coverage_during_rehash() {
        let mut dict: Dict<String, usize> = Dict::new();
        for i in 0..64 {
            dict.add(format!("key{}", i), i);
        }
        // step the rehash by hand and verify no key is lost at any point
        while dict.is_rehashing() {
            dict.rehash(1);
            for i in 0..64 {
                assert!(dict.key_exists(&format!("key{}", i)));
            }
        }
    }

    #[test]
    fn scan_visits_every_stable_entry() {
        let mut dict: Dict<String, usize> = Dict::new();
        for i in 0..100 {
            dict.add(format!("key{}", i), i);
        }
        let mut seen = std::collections::HashSet::new();
        let mut cursor = 0;
        loop {
            cursor = dict.scan(cursor, |k, _| {
                seen.insert(k.clone());
            });
            if cursor == 0 {
                break;
            }
        }
        assert_eq!(seen.len(), 100);
    }

    #[test]
    fn custom_hash_function() {
        // a pathological hasher forces every key into one chain
        let mut dict: Dict<String, i32> = Dict::with_hash_function(Arc::new(|_| 0));
        for i in 0..32 {
            assert!(dict.add(format!("key{}", i), i));
        }
        for i in 0..32 {
            assert_eq!(dict.get(&format!("key{}", i)), Some(&i));
        }
        assert!(dict.delete(&"key7".to_string()));
        assert_eq!(dict.size(), 31);
    }
}
