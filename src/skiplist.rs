//! Ordered probabilistic list with span-indexed random access.
//!
//! Every forward pointer carries the number of bottom-level hops it stands
//! for, so rank queries walk top-down in O(log n). Level 0 is doubly linked
//! (weak back pointers) for reverse iteration. Keys are unique under the
//! configured comparator; the zset composite layers (score, member)
//! ordering on top through a custom comparator.

use std::{cmp::Ordering, sync::{Arc, RwLock, Weak}};
use rand::Rng;

const INIT_LEVEL: usize = 2;
const MAX_LEVEL: usize = 16;

pub type Compare<K> = Arc<dyn Fn(&K, &K) -> Ordering + Sync + Send>;

pub struct SkiplistLevel<K> {
    next: Option<Arc<RwLock<SkiplistNode<K>>>>,
    span: usize,
}

pub struct SkiplistNode<K> {
    // None marks the head sentinel
    key: Option<K>,
    levels: Vec<SkiplistLevel<K>>,
    prev: Option<Weak<RwLock<SkiplistNode<K>>>>,
}

/// Limit applied after range filtering: skip `offset` qualifying keys, then
/// yield at most `count` (negative count = unbounded).
pub struct SkiplistLimitSpec {
    pub offset: usize,
    pub count: i64,
}

/// Rank range, 0-based and already rebased to non-negative indices.
pub struct SkiplistRangeByRankSpec {
    pub min: i64,
    pub max: i64,
    pub minex: bool,
    pub maxex: bool,
    pub limit: Option<SkiplistLimitSpec>,
}

/// Key range in comparator order.
pub struct SkiplistRangeByKeySpec<K> {
    pub min: K,
    pub max: K,
    pub minex: bool,
    pub maxex: bool,
    pub limit: Option<SkiplistLimitSpec>,
}

pub struct Skiplist<K> {
    head: Arc<RwLock<SkiplistNode<K>>>,
    compare: Compare<K>,
    level: usize,
    size: usize,
}

impl<K: Ord + Clone> Skiplist<K> {
    pub fn new() -> Skiplist<K> {
        Self::with_comparator(Arc::new(|k1: &K, k2: &K| k1.cmp(k2)))
    }
}

impl<K: Clone> Skiplist<K> {
    pub fn with_comparator(compare: Compare<K>) -> Skiplist<K> {
        Skiplist {
            head: Arc::new(RwLock::new(SkiplistNode::head(INIT_LEVEL))),
            compare,
            level: INIT_LEVEL,
            size: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Insert the key. Returns false if an equal key is already present.
    pub fn insert(&mut self, key: K) -> bool {
        let (mut update, mut rank) = self.find_update(&key);
        if let Some(next) = self.next_of(&update[0], 0) {
            if self.key_eq(&next, &key) {
                return false;
            }
        }

        let insert_level = self.random_level();
        if insert_level > self.level {
            {
                let mut head = self.head.write().unwrap();
                for _ in self.level..insert_level {
                    // span of a fresh head level covers the whole list
                    head.levels.push(SkiplistLevel { next: None, span: self.size });
                }
            }
            for _ in self.level..insert_level {
                update.push(self.head.clone());
                rank.push(0);
            }
            self.level = insert_level;
        }

        let node = Arc::new(RwLock::new(SkiplistNode::new(key, insert_level)));
        for i in 0..insert_level {
            let (upd_next, upd_span) = {
                let u = update[i].read().unwrap();
                (u.levels[i].next.clone(), u.levels[i].span)
            };
            {
                let mut n = node.write().unwrap();
                n.levels[i].next = upd_next;
                n.levels[i].span = upd_span - (rank[0] - rank[i]);
            }
            let mut u = update[i].write().unwrap();
            u.levels[i].next = Some(node.clone());
            u.levels[i].span = rank[0] - rank[i] + 1;
        }
        // levels the new node does not reach just got one hop longer
        for i in insert_level..self.level {
            update[i].write().unwrap().levels[i].span += 1;
        }

        if Arc::ptr_eq(&update[0], &self.head) {
            node.write().unwrap().prev = None;
        } else {
            node.write().unwrap().prev = Some(Arc::downgrade(&update[0]));
        }
        let next0 = node.read().unwrap().levels[0].next.clone();
        if let Some(nx) = next0 {
            nx.write().unwrap().prev = Some(Arc::downgrade(&node));
        }
        self.size += 1;
        true
    }

    pub fn contains(&self, key: &K) -> bool {
        let (update, _) = self.find_update(key);
        match self.next_of(&update[0], 0) {
            Some(next) => self.key_eq(&next, key),
            None => false,
        }
    }

    /// Delete the key. Returns false if it was absent.
    pub fn delete(&mut self, key: &K) -> bool {
        let (update, _) = self.find_update(key);
        let node = match self.next_of(&update[0], 0) {
            Some(n) => n,
            None => return false,
        };
        if !self.key_eq(&node, key) {
            return false;
        }
        self.delete_node(&node, &update);
        true
    }

    /// Change a key in place when its ordering position is unaffected,
    /// otherwise delete and re-insert at the new position.
    pub fn update(&mut self, key: &K, new_key: K) -> bool {
        let (update, _) = self.find_update(key);
        let node = match self.next_of(&update[0], 0) {
            Some(n) => n,
            None => return false,
        };
        if !self.key_eq(&node, key) {
            return false;
        }
        let prev_ok = Arc::ptr_eq(&update[0], &self.head) || {
            let prev_key = update[0].read().unwrap().key.clone().unwrap();
            (self.compare)(&new_key, &prev_key) != Ordering::Less
        };
        let next_ok = match self.next_of(&node, 0) {
            None => true,
            Some(nn) => {
                let next_key = nn.read().unwrap().key.clone().unwrap();
                (self.compare)(&new_key, &next_key) != Ordering::Greater
            },
        };
        if prev_ok && next_ok {
            node.write().unwrap().key = Some(new_key);
            true
        } else {
            self.delete_node(&node, &update);
            self.insert(new_key)
        }
    }

    /// 0-based rank of the key.
    pub fn rank_of(&self, key: &K) -> Option<usize> {
        let mut rank = 0usize;
        let mut node = self.head.clone();
        for i in (0..self.level).rev() {
            loop {
                let (next, span) = {
                    let n = node.read().unwrap();
                    (n.levels[i].next.clone(), n.levels[i].span)
                };
                match next {
                    Some(nx) => {
                        let k = nx.read().unwrap().key.clone().unwrap();
                        match (self.compare)(&k, key) {
                            Ordering::Less => {
                                rank += span;
                                node = nx;
                            },
                            Ordering::Equal => {
                                return Some(rank + span - 1);
                            },
                            Ordering::Greater => break,
                        }
                    },
                    None => break,
                }
            }
        }
        None
    }

    /// Key at the given rank; negative ranks rebase against the size.
    pub fn at_rank(&self, rank: i64) -> Option<K> {
        let mut r = rank;
        if r < 0 {
            r += self.size as i64;
        }
        if r < 0 {
            return None;
        }
        self.node_at_rank(r as usize).map(|n| n.read().unwrap().key.clone().unwrap())
    }

    pub fn first(&self) -> Option<K> {
        self.next_of(&self.head, 0).map(|n| n.read().unwrap().key.clone().unwrap())
    }

    pub fn last(&self) -> Option<K> {
        let node = self.find_last();
        if Arc::ptr_eq(&node, &self.head) {
            None
        } else {
            Some(node.read().unwrap().key.clone().unwrap())
        }
    }

    /// All keys in comparator order.
    pub fn keys(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.size);
        let mut node = self.next_of(&self.head, 0);
        while let Some(n) = node {
            keys.push(n.read().unwrap().key.clone().unwrap());
            node = self.next_of(&n, 0);
        }
        keys
    }

    pub fn range_by_rank(&self, spec: &SkiplistRangeByRankSpec) -> Vec<K> {
        let mut keys = Vec::new();
        let (start, end_excl) = match self.resolve_rank_bounds(spec) {
            Some(bounds) => bounds,
            None => return keys,
        };
        let (offset, count) = Self::resolve_limit(&spec.limit);
        let mut node = match self.node_at_rank(start) {
            Some(n) => n,
            None => return keys,
        };
        let mut idx = start;
        let mut skipped = 0usize;
        loop {
            if idx >= end_excl {
                break;
            }
            if skipped < offset {
                skipped += 1;
            } else {
                if count >= 0 && keys.len() as i64 >= count {
                    break;
                }
                keys.push(node.read().unwrap().key.clone().unwrap());
            }
            idx += 1;
            node = match self.next_of(&node, 0) {
                Some(n) => n,
                None => break,
            };
        }
        keys
    }

    /// Rank range counted from the tail: reverse rank 0 is the last key.
    pub fn rev_range_by_rank(&self, spec: &SkiplistRangeByRankSpec) -> Vec<K> {
        let mut keys = Vec::new();
        let (start, end_excl) = match self.resolve_rank_bounds(spec) {
            Some(bounds) => bounds,
            None => return keys,
        };
        let (offset, count) = Self::resolve_limit(&spec.limit);
        let forward_start = self.size - 1 - start;
        let mut node = match self.node_at_rank(forward_start) {
            Some(n) => n,
            None => return keys,
        };
        let mut idx = start;
        let mut skipped = 0usize;
        loop {
            if idx >= end_excl {
                break;
            }
            if skipped < offset {
                skipped += 1;
            } else {
                if count >= 0 && keys.len() as i64 >= count {
                    break;
                }
                keys.push(node.read().unwrap().key.clone().unwrap());
            }
            idx += 1;
            node = match self.prev_of(&node) {
                Some(n) => n,
                None => break,
            };
        }
        keys
    }

    pub fn range_by_key(&self, spec: &SkiplistRangeByKeySpec<K>) -> Vec<K> {
        let mut keys = Vec::new();
        let (offset, count) = Self::resolve_limit(&spec.limit);
        let mut node = self.first_in_range(&spec.min, spec.minex);
        let mut skipped = 0usize;
        while let Some(n) = node {
            let k = n.read().unwrap().key.clone().unwrap();
            let cmp = (self.compare)(&k, &spec.max);
            if cmp == Ordering::Greater || (spec.maxex && cmp == Ordering::Equal) {
                break;
            }
            if skipped < offset {
                skipped += 1;
            } else {
                if count >= 0 && keys.len() as i64 >= count {
                    break;
                }
                keys.push(k);
            }
            node = self.next_of(&n, 0);
        }
        keys
    }

    pub fn rev_range_by_key(&self, spec: &SkiplistRangeByKeySpec<K>) -> Vec<K> {
        let mut keys = Vec::new();
        let (offset, count) = Self::resolve_limit(&spec.limit);
        let last = self.last_in_range(&spec.max, spec.maxex);
        let mut node = match last {
            Some(n) => Some(n),
            None => return keys,
        };
        let mut skipped = 0usize;
        while let Some(n) = node {
            let k = n.read().unwrap().key.clone().unwrap();
            let cmp = (self.compare)(&k, &spec.min);
            if cmp == Ordering::Less || (spec.minex && cmp == Ordering::Equal) {
                break;
            }
            if skipped < offset {
                skipped += 1;
            } else {
                if count >= 0 && keys.len() as i64 >= count {
                    break;
                }
                keys.push(k);
            }
            node = self.prev_of(&n);
        }
        keys
    }

    /// Number of keys inside the range, limit ignored.
    pub fn count(&self, spec: &SkiplistRangeByKeySpec<K>) -> usize {
        let mut count = 0usize;
        let mut node = self.first_in_range(&spec.min, spec.minex);
        while let Some(n) = node {
            let k = n.read().unwrap().key.clone().unwrap();
            let cmp = (self.compare)(&k, &spec.max);
            if cmp == Ordering::Greater || (spec.maxex && cmp == Ordering::Equal) {
                break;
            }
            count += 1;
            node = self.next_of(&n, 0);
        }
        count
    }

    /// Walk top-down collecting, per level, the last node strictly before
    /// the key and the rank crossed to reach it.
    fn find_update(&self, key: &K) -> (Vec<Arc<RwLock<SkiplistNode<K>>>>, Vec<usize>) {
        let mut update = Vec::with_capacity(self.level);
        let mut rank = vec![0usize; self.level];
        for _ in 0..self.level {
            update.push(self.head.clone());
        }
        let mut node = self.head.clone();
        for i in (0..self.level).rev() {
            rank[i] = if i == self.level - 1 { 0 } else { rank[i + 1] };
            loop {
                let (next, span) = {
                    let n = node.read().unwrap();
                    (n.levels[i].next.clone(), n.levels[i].span)
                };
                match next {
                    Some(nx) => {
                        let k = nx.read().unwrap().key.clone().unwrap();
                        if (self.compare)(&k, key) == Ordering::Less {
                            rank[i] += span;
                            node = nx;
                        } else {
                            break;
                        }
                    },
                    None => break,
                }
            }
            update[i] = node.clone();
        }
        (update, rank)
    }

    /// The caller must pass the update vector produced for this node's key.
    fn delete_node(&mut self, node: &Arc<RwLock<SkiplistNode<K>>>, update: &[Arc<RwLock<SkiplistNode<K>>>]) {
        for i in 0..self.level {
            let next_is_node = match update[i].read().unwrap().levels[i].next {
                Some(ref nx) => Arc::ptr_eq(nx, node),
                None => false,
            };
            if next_is_node {
                let (node_next, node_span) = {
                    let n = node.read().unwrap();
                    (n.levels[i].next.clone(), n.levels[i].span)
                };
                let mut u = update[i].write().unwrap();
                u.levels[i].span += node_span;
                u.levels[i].span -= 1;
                u.levels[i].next = node_next;
            } else {
                let mut u = update[i].write().unwrap();
                if u.levels[i].span > 0 {
                    u.levels[i].span -= 1;
                }
            }
        }
        let next0 = node.read().unwrap().levels[0].next.clone();
        if let Some(nx) = next0 {
            let prev = node.read().unwrap().prev.clone();
            nx.write().unwrap().prev = prev;
        }
        while self.level > 1 && self.head.read().unwrap().levels[self.level - 1].next.is_none() {
            self.level -= 1;
        }
        self.head.write().unwrap().levels.truncate(self.level);
        self.size -= 1;
    }

    /// First node with key > min (exclusive) or >= min (inclusive).
    fn first_in_range(&self, min: &K, minex: bool) -> Option<Arc<RwLock<SkiplistNode<K>>>> {
        let mut node = self.head.clone();
        for i in (0..self.level).rev() {
            loop {
                let next = node.read().unwrap().levels[i].next.clone();
                match next {
                    Some(nx) => {
                        let k = nx.read().unwrap().key.clone().unwrap();
                        let cmp = (self.compare)(&k, min);
                        let before_range = cmp == Ordering::Less || (minex && cmp == Ordering::Equal);
                        if before_range {
                            node = nx;
                        } else {
                            break;
                        }
                    },
                    None => break,
                }
            }
        }
        self.next_of(&node, 0)
    }

    /// Last node with key < max (exclusive) or <= max (inclusive), None when
    /// no node qualifies.
    fn last_in_range(&self, max: &K, maxex: bool) -> Option<Arc<RwLock<SkiplistNode<K>>>> {
        let mut node = self.head.clone();
        for i in (0..self.level).rev() {
            loop {
                let next = node.read().unwrap().levels[i].next.clone();
                match next {
                    Some(nx) => {
                        let k = nx.read().unwrap().key.clone().unwrap();
                        let cmp = (self.compare)(&k, max);
                        let in_range = cmp == Ordering::Less || (!maxex && cmp == Ordering::Equal);
                        if in_range {
                            node = nx;
                        } else {
                            break;
                        }
                    },
                    None => break,
                }
            }
        }
        if Arc::ptr_eq(&node, &self.head) {
            None
        } else {
            Some(node)
        }
    }

    fn node_at_rank(&self, rank: usize) -> Option<Arc<RwLock<SkiplistNode<K>>>> {
        if rank >= self.size {
            return None;
        }
        let mut traversed = 0usize;
        let mut node = self.head.clone();
        for i in (0..self.level).rev() {
            loop {
                let (next, span) = {
                    let n = node.read().unwrap();
                    (n.levels[i].next.clone(), n.levels[i].span)
                };
                match next {
                    Some(nx) => {
                        if traversed + span < rank + 1 {
                            traversed += span;
                            node = nx;
                        } else if traversed + span == rank + 1 {
                            return Some(nx);
                        } else {
                            break;
                        }
                    },
                    None => break,
                }
            }
        }
        None
    }

    fn find_last(&self) -> Arc<RwLock<SkiplistNode<K>>> {
        let mut node = self.head.clone();
        for i in (0..self.level).rev() {
            loop {
                let next = node.read().unwrap().levels[i].next.clone();
                match next {
                    Some(nx) => node = nx,
                    None => break,
                }
            }
        }
        node
    }

    fn next_of(&self, node: &Arc<RwLock<SkiplistNode<K>>>, level: usize) -> Option<Arc<RwLock<SkiplistNode<K>>>> {
        node.read().unwrap().levels.get(level).and_then(|l| l.next.clone())
    }

    fn prev_of(&self, node: &Arc<RwLock<SkiplistNode<K>>>) -> Option<Arc<RwLock<SkiplistNode<K>>>> {
        node.read().unwrap().prev.as_ref().and_then(|w| w.upgrade())
    }

    fn key_eq(&self, node: &Arc<RwLock<SkiplistNode<K>>>, key: &K) -> bool {
        let k = node.read().unwrap().key.clone().unwrap();
        (self.compare)(&k, key) == Ordering::Equal
    }

    fn resolve_rank_bounds(&self, spec: &SkiplistRangeByRankSpec) -> Option<(usize, usize)> {
        if self.size == 0 || spec.min < 0 || spec.max < 0 {
            return None;
        }
        let start = spec.min + if spec.minex { 1 } else { 0 };
        let max = spec.max.min(self.size as i64 - 1);
        let end_excl = if spec.maxex { max } else { max + 1 };
        if start >= end_excl {
            return None;
        }
        Some((start as usize, end_excl as usize))
    }

    fn resolve_limit(limit: &Option<SkiplistLimitSpec>) -> (usize, i64) {
        match limit {
            Some(l) => (l.offset, l.count),
            None => (0, -1),
        }
    }

    /// Draw 1 plus the number of successful p = 0.5 coin flips, capped.
    fn random_level(&self) -> usize {
        let mut rand_gen = rand::thread_rng();
        let mut level = 1;
        while level < MAX_LEVEL && rand_gen.gen_bool(0.5) {
            level += 1;
        }
        level
    }

    #[cfg(test)]
    fn check_spans(&self) -> bool {
        // level-0 order gives every node its rank; spans at every level must
        // agree with the rank distance they claim to cover
        let mut order: Vec<Arc<RwLock<SkiplistNode<K>>>> = Vec::new();
        let mut node = self.next_of(&self.head, 0);
        while let Some(n) = node {
            order.push(n.clone());
            node = self.next_of(&n, 0);
        }
        let rank_of_ptr = |target: &Arc<RwLock<SkiplistNode<K>>>| -> Option<usize> {
            order.iter().position(|n| Arc::ptr_eq(n, target))
        };
        for i in 0..self.level {
            let mut cur = self.head.clone();
            let mut cur_rank: i64 = -1;
            loop {
                let (next, span) = {
                    let n = cur.read().unwrap();
                    match n.levels.get(i) {
                        Some(l) => (l.next.clone(), l.span),
                        None => break,
                    }
                };
                match next {
                    Some(nx) => {
                        let next_rank = rank_of_ptr(&nx).unwrap() as i64;
                        if next_rank - cur_rank != span as i64 {
                            return false;
                        }
                        cur_rank = next_rank;
                        cur = nx;
                    },
                    None => {
                        // span of a nil pointer is the remaining distance
                        if (self.size as i64 - 1 - cur_rank) != span as i64 {
                            return false;
                        }
                        break;
                    },
                }
            }
        }
        true
    }
}

impl<K> SkiplistNode<K> {
    fn head(level: usize) -> SkiplistNode<K> {
        let mut levels = Vec::with_capacity(level);
        for _ in 0..level {
            levels.push(SkiplistLevel { next: None, span: 0 });
        }
        SkiplistNode { key: None, levels, prev: None }
    }

    fn new(key: K, level: usize) -> SkiplistNode<K> {
        let mut levels = Vec::with_capacity(level);
        for _ in 0..level {
            levels.push(SkiplistLevel { next: None, span: 0 });
        }
        SkiplistNode { key: Some(key), levels, prev: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(keys: &[i32]) -> Skiplist<i32> {
        let mut sl = Skiplist::new();
        for &k in keys {
            assert!(sl.insert(k));
        }
        sl
    }

    #[test]
    fn insert_rejects_duplicates() {
        let mut sl = Skiplist::new();
        assert!(sl.insert(3));
        assert!(sl.insert(1));
        assert!(sl.insert(2));
        assert!(!sl.insert(2));
        assert_eq!(sl.size(), 3);
        assert_eq!(sl.keys(), vec![1, 2, 3]);
        assert!(sl.check_spans());
    }

    #[test]
    fn contains_and_delete() {
        let mut sl = build(&[5, 1, 9, 3, 7]);
        assert!(sl.contains(&7));
        assert!(!sl.contains(&8));

        assert!(sl.delete(&7));
        assert!(!sl.delete(&7));
        assert!(!sl.contains(&7));
        assert_eq!(sl.keys(), vec![1, 3, 5, 9]);
        assert!(sl.check_spans());
    }

    #[test]
    fn spans_survive_a_storm() {
        let mut sl = Skiplist::new();
        for k in 0..256 {
            // shuffled-ish insertion order
            sl.insert((k * 67) % 256);
        }
        assert_eq!(sl.size(), 256);
        assert!(sl.check_spans());
        for k in (0..256).step_by(3) {
            assert!(sl.delete(&k));
        }
        assert!(sl.check_spans());
        assert_eq!(sl.size(), 256 - 86);
    }

    #[test]
    fn rank_queries() {
        let sl = build(&[10, 20, 30, 40, 50]);
        assert_eq!(sl.rank_of(&10), Some(0));
        assert_eq!(sl.rank_of(&30), Some(2));
        assert_eq!(sl.rank_of(&50), Some(4));
        assert_eq!(sl.rank_of(&15), None);

        assert_eq!(sl.at_rank(0), Some(10));
        assert_eq!(sl.at_rank(4), Some(50));
        assert_eq!(sl.at_rank(-1), Some(50));
        assert_eq!(sl.at_rank(-5), Some(10));
        assert_eq!(sl.at_rank(-6), None);
        assert_eq!(sl.at_rank(5), None);
    }

    #[test]
    fn first_and_last() {
        let sl = build(&[4, 2, 8]);
        assert_eq!(sl.first(), Some(2));
        assert_eq!(sl.last(), Some(8));

        let empty: Skiplist<i32> = Skiplist::new();
        assert_eq!(empty.first(), None);
        assert_eq!(empty.last(), None);
    }

    #[test]
    fn update_in_place_and_move() {
        let mut sl = build(&[1, 5, 9]);
        // 5 -> 6 stays between 1 and 9
        assert!(sl.update(&5, 6));
        assert_eq!(sl.keys(), vec![1, 6, 9]);
        // 6 -> 20 must move to the tail
        assert!(sl.update(&6, 20));
        assert_eq!(sl.keys(), vec![1, 9, 20]);
        assert!(!sl.update(&6, 30));
        assert!(sl.check_spans());
    }

    #[test]
    fn range_by_rank_with_limits() {
        let sl = build(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let spec = SkiplistRangeByRankSpec { min: 1, max: 5, minex: false, maxex: false, limit: None };
        assert_eq!(sl.range_by_rank(&spec), vec![2, 3, 4, 5, 6]);

        let spec = SkiplistRangeByRankSpec { min: 1, max: 5, minex: true, maxex: true, limit: None };
        assert_eq!(sl.range_by_rank(&spec), vec![3, 4, 5]);

        let spec = SkiplistRangeByRankSpec {
            min: 0, max: 7, minex: false, maxex: false,
            limit: Some(SkiplistLimitSpec { offset: 2, count: 3 }),
        };
        assert_eq!(sl.range_by_rank(&spec), vec![3, 4, 5]);

        let spec = SkiplistRangeByRankSpec {
            min: 0, max: i64::MAX, minex: false, maxex: false, limit: None,
        };
        assert_eq!(sl.range_by_rank(&spec).len(), 8);
    }

    #[test]
    fn rev_range_by_rank() {
        let sl = build(&[1, 2, 3, 4, 5]);
        let spec = SkiplistRangeByRankSpec { min: 0, max: 2, minex: false, maxex: false, limit: None };
        assert_eq!(sl.rev_range_by_rank(&spec), vec![5, 4, 3]);
        let spec = SkiplistRangeByRankSpec { min: 0, max: -1, minex: false, maxex: false, limit: None };
        assert!(sl.rev_range_by_rank(&spec).is_empty());
    }

    #[test]
    fn range_by_key_bounds() {
        let sl = build(&[10, 20, 30, 40]);
        let spec = SkiplistRangeByKeySpec { min: 15, max: 35, minex: false, maxex: false, limit: None };
        assert_eq!(sl.range_by_key(&spec), vec![20, 30]);
        assert_eq!(sl.count(&spec), 2);

        let spec = SkiplistRangeByKeySpec { min: 20, max: 40, minex: true, maxex: true, limit: None };
        assert_eq!(sl.range_by_key(&spec), vec![30]);
        assert_eq!(sl.count(&spec), 1);

        let spec = SkiplistRangeByKeySpec { min: 10, max: 40, minex: false, maxex: false, limit: None };
        assert_eq!(sl.rev_range_by_key(&spec), vec![40, 30, 20, 10]);
    }

    #[test]
    fn custom_comparator_reverses_order() {
        let mut sl: Skiplist<i32> = Skiplist::with_comparator(Arc::new(|a, b| b.cmp(a)));
        sl.insert(1);
        sl.insert(2);
        sl.insert(3);
        assert_eq!(sl.keys(), vec![3, 2, 1]);
        assert_eq!(sl.rank_of(&3), Some(0));
    }
}
