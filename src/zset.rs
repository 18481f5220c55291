//! Polymorphic sorted set.
//!
//! Small zsets are a listpack of adjacent (member, score-string) pairs kept
//! sorted by (score ascending, member ascending). Past the entry bound the
//! structure is rebuilt as the skiplist composite: a dict mapping member to
//! score next to a skiplist ordered by (score, member), kept consistent on
//! every mutation. There is no demotion.

use std::{cmp::Ordering, sync::Arc};
use crate::{dict::Dict, listpack::ListPack, skiplist::{Skiplist, SkiplistLimitSpec, SkiplistRangeByKeySpec, SkiplistRangeByRankSpec}, util::float_to_string};

const LISTPACK_MAX_ENTRIES: usize = 128;

#[derive(Clone, Debug)]
pub struct ZSetEntry {
    pub key: String,
    pub score: f64,
}

impl PartialEq for ZSetEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.score == other.score
    }
}

#[derive(Clone, Copy)]
pub struct LimitSpec {
    pub offset: usize,
    pub count: i64,
}

/// Rank range; negative indices rebase against the size.
pub struct RangeByRankSpec {
    pub min: i64,
    pub max: i64,
    pub minex: bool,
    pub maxex: bool,
    pub limit: Option<LimitSpec>,
    pub reverse: bool,
}

/// Score range; the infinities are valid sentinels.
pub struct RangeByScoreSpec {
    pub min: f64,
    pub max: f64,
    pub minex: bool,
    pub maxex: bool,
    pub limit: Option<LimitSpec>,
    pub reverse: bool,
}

enum ZSetBacking {
    ListPack(ZSetListPack),
    Skiplist(ZSetSkiplist),
}

pub struct ZSet {
    backing: ZSetBacking,
}

impl ZSet {
    pub fn new() -> ZSet {
        ZSet { backing: ZSetBacking::ListPack(ZSetListPack::new()) }
    }

    /// Insert or re-score a member. Returns true iff the member is new.
    /// A successful insert past the listpack bound promotes to the skiplist
    /// form.
    pub fn insert_or_update(&mut self, key: &str, score: f64) -> bool {
        let inserted = match &mut self.backing {
            ZSetBacking::ListPack(lp) => lp.insert_or_update(key, score),
            ZSetBacking::Skiplist(sl) => sl.insert_or_update(key, score),
        };
        if inserted && matches!(self.backing, ZSetBacking::ListPack(_)) && self.size() > LISTPACK_MAX_ENTRIES {
            self.convert_and_expand();
        }
        inserted
    }

    pub fn delete(&mut self, key: &str) -> bool {
        match &mut self.backing {
            ZSetBacking::ListPack(lp) => lp.delete(key),
            ZSetBacking::Skiplist(sl) => sl.delete(key),
        }
    }

    pub fn score_of(&mut self, key: &str) -> Option<f64> {
        match &mut self.backing {
            ZSetBacking::ListPack(lp) => lp.score_of(key),
            ZSetBacking::Skiplist(sl) => sl.score_of(key),
        }
    }

    pub fn rank_of(&mut self, key: &str) -> Option<usize> {
        match &mut self.backing {
            ZSetBacking::ListPack(lp) => lp.rank_of(key),
            ZSetBacking::Skiplist(sl) => sl.rank_of(key),
        }
    }

    pub fn range_by_rank(&self, spec: &RangeByRankSpec) -> Vec<ZSetEntry> {
        match &self.backing {
            ZSetBacking::ListPack(lp) => lp.range_by_rank(spec),
            ZSetBacking::Skiplist(sl) => sl.range_by_rank(spec),
        }
    }

    pub fn range_by_score(&self, spec: &RangeByScoreSpec) -> Vec<ZSetEntry> {
        match &self.backing {
            ZSetBacking::ListPack(lp) => lp.range_by_score(spec),
            ZSetBacking::Skiplist(sl) => sl.range_by_score(spec),
        }
    }

    pub fn count(&self, spec: &RangeByScoreSpec) -> usize {
        match &self.backing {
            ZSetBacking::ListPack(lp) => lp.count(spec),
            ZSetBacking::Skiplist(sl) => sl.count(spec),
        }
    }

    pub fn size(&self) -> usize {
        match &self.backing {
            ZSetBacking::ListPack(lp) => lp.size(),
            ZSetBacking::Skiplist(sl) => sl.size(),
        }
    }

    fn convert_and_expand(&mut self) {
        let spec = RangeByRankSpec {
            min: 0,
            max: self.size() as i64,
            minex: false,
            maxex: false,
            limit: None,
            reverse: false,
        };
        let entries = self.range_by_rank(&spec);
        let mut skiplist = ZSetSkiplist::new();
        for entry in entries {
            skiplist.insert_or_update(&entry.key, entry.score);
        }
        self.backing = ZSetBacking::Skiplist(skiplist);
    }

    #[cfg(test)]
    fn is_listpack(&self) -> bool {
        matches!(self.backing, ZSetBacking::ListPack(_))
    }
}

/// Listpack form: (member, score-string) pairs, sorted by (score, member).
struct ZSetListPack {
    lp: ListPack,
}

impl ZSetListPack {
    fn new() -> ZSetListPack {
        ZSetListPack { lp: ListPack::new() }
    }

    fn size(&self) -> usize {
        self.lp.size() / 2
    }

    fn insert_or_update(&mut self, key: &str, score: f64) -> bool {
        let key_idx = self.lp.find_and_skip(key, 1);
        let inserted = key_idx.is_none();
        if let Some(idx) = key_idx {
            let score_idx = self.lp.next(idx).expect("score entry expected");
            if self.score_at(score_idx) == score {
                return false;
            }
            self.delete_pair(idx);
        }
        let score_str = float_to_string(score);
        // insert in (score, member) position
        let mut idx = self.lp.first();
        while let Some(i) = idx {
            let ele = self.lp.get_str(i).expect("member entry expected");
            let score_idx = self.lp.next(i).expect("score entry expected");
            let ele_score = self.score_at(score_idx);
            if score < ele_score || (score == ele_score && key < ele.as_str()) {
                self.lp.insert_str_before(i, key);
                let pos = self.lp.next(i).expect("shifted member expected");
                self.lp.insert_str_before(pos, &score_str);
                return inserted;
            }
            idx = self.lp.next(score_idx);
        }
        self.lp.append(key);
        self.lp.append(&score_str);
        inserted
    }

    fn delete(&mut self, key: &str) -> bool {
        match self.lp.find_and_skip(key, 1) {
            Some(idx) => {
                self.delete_pair(idx);
                true
            },
            None => false,
        }
    }

    fn score_of(&self, key: &str) -> Option<f64> {
        let idx = self.lp.find_and_skip(key, 1)?;
        let score_idx = self.lp.next(idx)?;
        Some(self.score_at(score_idx))
    }

    fn rank_of(&self, key: &str) -> Option<usize> {
        let key_idx = self.lp.find_and_skip(key, 1)?;
        let mut idx = self.lp.first()?;
        let mut rank = 0;
        while idx != key_idx {
            let score_idx = self.lp.next(idx)?;
            idx = self.lp.next(score_idx)?;
            rank += 1;
        }
        Some(rank)
    }

    fn range_by_rank(&self, spec: &RangeByRankSpec) -> Vec<ZSetEntry> {
        let size = self.size() as i64;
        let min = if spec.min < 0 { spec.min + size } else { spec.min };
        let max = if spec.max < 0 { spec.max + size } else { spec.max };
        if min < 0 || max < 0 {
            return Vec::new();
        }
        let start = min + if spec.minex { 1 } else { 0 };
        let end_excl = if spec.maxex { max } else { max.saturating_add(1) };
        if start >= end_excl {
            return Vec::new();
        }
        let (offset, count) = resolve_limit(&spec.limit);
        if spec.reverse {
            self.rev_range_by_rank_util(start, end_excl, offset, count)
        } else {
            self.range_by_rank_util(start, end_excl, offset, count)
        }
    }

    fn range_by_score(&self, spec: &RangeByScoreSpec) -> Vec<ZSetEntry> {
        if !validate_score_spec(spec) {
            return Vec::new();
        }
        let (offset, count) = resolve_limit(&spec.limit);
        if spec.reverse {
            self.rev_range_by_score_util(spec, offset, count)
        } else {
            self.range_by_score_util(spec, offset, count)
        }
    }

    fn count(&self, spec: &RangeByScoreSpec) -> usize {
        let mut count = 0;
        let mut idx = self.lp.first();
        while let Some(i) = idx {
            let score_idx = match self.lp.next(i) {
                Some(s) => s,
                None => break,
            };
            let score = self.score_at(score_idx);
            if score_in_range(score, spec) {
                count += 1;
            } else if !less_or_equal_max(score, spec) {
                // entries are score sorted, nothing further can qualify
                break;
            }
            idx = self.lp.next(score_idx);
        }
        count
    }

    fn range_by_rank_util(&self, start: i64, end_excl: i64, offset: usize, count: i64) -> Vec<ZSetEntry> {
        let mut keys = Vec::new();
        if count == 0 {
            return keys;
        }
        let mut idx = self.lp.first();
        let mut rank = 0i64;
        let mut skipped = 0usize;
        while let Some(i) = idx {
            if rank >= end_excl {
                break;
            }
            let score_idx = match self.lp.next(i) {
                Some(s) => s,
                None => break,
            };
            if rank >= start {
                if skipped < offset {
                    skipped += 1;
                } else {
                    if count >= 0 && keys.len() as i64 >= count {
                        break;
                    }
                    let key = self.lp.get_str(i).expect("member entry expected");
                    keys.push(ZSetEntry { key, score: self.score_at(score_idx) });
                }
            }
            idx = self.lp.next(score_idx);
            rank += 1;
        }
        keys
    }

    fn rev_range_by_rank_util(&self, start: i64, end_excl: i64, offset: usize, count: i64) -> Vec<ZSetEntry> {
        let mut keys = Vec::new();
        if count == 0 {
            return keys;
        }
        // walk pairs back to front: reverse rank 0 is the last pair
        let mut score_idx = self.lp.last();
        let mut rank = 0i64;
        let mut skipped = 0usize;
        while let Some(s) = score_idx {
            if rank >= end_excl {
                break;
            }
            let key_idx = match self.lp.prev(s) {
                Some(k) => k,
                None => break,
            };
            if rank >= start {
                if skipped < offset {
                    skipped += 1;
                } else {
                    if count >= 0 && keys.len() as i64 >= count {
                        break;
                    }
                    let key = self.lp.get_str(key_idx).expect("member entry expected");
                    keys.push(ZSetEntry { key, score: self.score_at(s) });
                }
            }
            score_idx = self.lp.prev(key_idx);
            rank += 1;
        }
        keys
    }

    fn range_by_score_util(&self, spec: &RangeByScoreSpec, offset: usize, count: i64) -> Vec<ZSetEntry> {
        let mut keys = Vec::new();
        if count == 0 {
            return keys;
        }
        let mut idx = self.lp.first();
        let mut skipped = 0usize;
        while let Some(i) = idx {
            let score_idx = match self.lp.next(i) {
                Some(s) => s,
                None => break,
            };
            let score = self.score_at(score_idx);
            if !less_or_equal_max(score, spec) {
                break;
            }
            if score_in_range(score, spec) {
                if skipped < offset {
                    skipped += 1;
                } else {
                    if count >= 0 && keys.len() as i64 >= count {
                        break;
                    }
                    let key = self.lp.get_str(i).expect("member entry expected");
                    keys.push(ZSetEntry { key, score });
                }
            }
            idx = self.lp.next(score_idx);
        }
        keys
    }

    fn rev_range_by_score_util(&self, spec: &RangeByScoreSpec, offset: usize, count: i64) -> Vec<ZSetEntry> {
        let mut keys = Vec::new();
        if count == 0 {
            return keys;
        }
        let mut score_idx = self.lp.last();
        let mut skipped = 0usize;
        while let Some(s) = score_idx {
            let key_idx = match self.lp.prev(s) {
                Some(k) => k,
                None => break,
            };
            let score = self.score_at(s);
            let below_min = if spec.minex { score <= spec.min } else { score < spec.min };
            if below_min {
                break;
            }
            if score_in_range(score, spec) {
                if skipped < offset {
                    skipped += 1;
                } else {
                    if count >= 0 && keys.len() as i64 >= count {
                        break;
                    }
                    let key = self.lp.get_str(key_idx).expect("member entry expected");
                    keys.push(ZSetEntry { key, score });
                }
            }
            score_idx = self.lp.prev(key_idx);
        }
        keys
    }

    fn score_at(&self, idx: usize) -> f64 {
        self.lp.get_str(idx).and_then(|s| s.parse().ok()).unwrap_or(0.0)
    }

    fn delete_pair(&mut self, idx: usize) {
        // score slides into the member's position after the first delete
        self.lp.delete(idx);
        self.lp.delete(idx);
    }
}

/// Skiplist form: member -> score dict next to a (score, member) ordered
/// skiplist. The minimum and maximum member ever seen are cached; exclusive
/// score bounds use them to collapse the run of equal-score entries on that
/// side.
struct ZSetSkiplist {
    dict: Dict<String, f64>,
    skiplist: Skiplist<ZSetEntry>,
    min_key: Option<String>,
    max_key: Option<String>,
}

impl ZSetSkiplist {
    fn new() -> ZSetSkiplist {
        ZSetSkiplist {
            dict: Dict::new(),
            skiplist: Skiplist::with_comparator(Arc::new(|e1: &ZSetEntry, e2: &ZSetEntry| {
                e1.score
                    .partial_cmp(&e2.score)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| e1.key.cmp(&e2.key))
            })),
            min_key: None,
            max_key: None,
        }
    }

    fn size(&self) -> usize {
        self.skiplist.size()
    }

    fn insert_or_update(&mut self, key: &str, score: f64) -> bool {
        let old_score = self.dict.get(&key.to_string()).copied();
        if old_score == Some(score) {
            return false;
        }
        self.dict.replace(key.to_string(), score);
        let entry = ZSetEntry { key: key.to_string(), score };
        let inserted = match old_score {
            Some(old) => {
                let old_entry = ZSetEntry { key: key.to_string(), score: old };
                self.skiplist.update(&old_entry, entry);
                false
            },
            None => {
                self.skiplist.insert(entry);
                true
            },
        };
        if self.min_key.as_deref().map_or(true, |k| key < k) {
            self.min_key = Some(key.to_string());
        }
        if self.max_key.as_deref().map_or(true, |k| key > k) {
            self.max_key = Some(key.to_string());
        }
        inserted
    }

    fn delete(&mut self, key: &str) -> bool {
        let score = match self.dict.get(&key.to_string()).copied() {
            Some(s) => s,
            None => return false,
        };
        self.dict.delete(&key.to_string());
        self.skiplist.delete(&ZSetEntry { key: key.to_string(), score })
    }

    fn score_of(&mut self, key: &str) -> Option<f64> {
        self.dict.get(&key.to_string()).copied()
    }

    fn rank_of(&mut self, key: &str) -> Option<usize> {
        let score = self.dict.get(&key.to_string()).copied()?;
        self.skiplist.rank_of(&ZSetEntry { key: key.to_string(), score })
    }

    fn range_by_rank(&self, spec: &RangeByRankSpec) -> Vec<ZSetEntry> {
        let size = self.size() as i64;
        let min = if spec.min < 0 { spec.min + size } else { spec.min };
        let max = if spec.max < 0 { spec.max + size } else { spec.max };
        if min < 0 || max < 0 {
            return Vec::new();
        }
        let skiplist_spec = SkiplistRangeByRankSpec {
            min,
            max,
            minex: spec.minex,
            maxex: spec.maxex,
            limit: to_skiplist_limit(&spec.limit),
        };
        if spec.reverse {
            self.skiplist.rev_range_by_rank(&skiplist_spec)
        } else {
            self.skiplist.range_by_rank(&skiplist_spec)
        }
    }

    fn range_by_score(&self, spec: &RangeByScoreSpec) -> Vec<ZSetEntry> {
        if !validate_score_spec(spec) {
            return Vec::new();
        }
        let skiplist_spec = match self.to_skiplist_key_spec(spec) {
            Some(s) => s,
            None => return Vec::new(),
        };
        if spec.reverse {
            self.skiplist.rev_range_by_key(&skiplist_spec)
        } else {
            self.skiplist.range_by_key(&skiplist_spec)
        }
    }

    fn count(&self, spec: &RangeByScoreSpec) -> usize {
        let skiplist_spec = match self.to_skiplist_key_spec(spec) {
            Some(s) => s,
            None => return 0,
        };
        self.skiplist.count(&skiplist_spec)
    }

    /// Translate a score range into a composite key range. An exclusive
    /// score bound picks the cached extreme member on that side so every
    /// member carrying the boundary score falls outside the range.
    fn to_skiplist_key_spec(&self, spec: &RangeByScoreSpec) -> Option<SkiplistRangeByKeySpec<ZSetEntry>> {
        let min_key = self.min_key.clone()?;
        let max_key = self.max_key.clone()?;
        let min_entry = ZSetEntry {
            key: if spec.minex { max_key.clone() } else { min_key.clone() },
            score: spec.min,
        };
        let max_entry = ZSetEntry {
            key: if spec.maxex { min_key } else { max_key },
            score: spec.max,
        };
        Some(SkiplistRangeByKeySpec {
            min: min_entry,
            max: max_entry,
            minex: spec.minex,
            maxex: spec.maxex,
            limit: to_skiplist_limit(&spec.limit),
        })
    }

    #[cfg(test)]
    fn coherent(&mut self) -> bool {
        // the dict and the skiplist must agree on every member and score
        if self.dict.size() != self.skiplist.size() {
            return false;
        }
        let entries = self.skiplist.keys();
        for entry in &entries {
            if self.dict.get(&entry.key).copied() != Some(entry.score) {
                return false;
            }
        }
        // and the skiplist order must be (score, member)
        for w in entries.windows(2) {
            let ord = w[0].score < w[1].score || (w[0].score == w[1].score && w[0].key < w[1].key);
            if !ord {
                return false;
            }
        }
        true
    }
}

fn resolve_limit(limit: &Option<LimitSpec>) -> (usize, i64) {
    match limit {
        Some(l) => (l.offset, l.count),
        None => (0, -1),
    }
}

fn to_skiplist_limit(limit: &Option<LimitSpec>) -> Option<SkiplistLimitSpec> {
    limit.as_ref().map(|l| SkiplistLimitSpec { offset: l.offset, count: l.count })
}

fn validate_score_spec(spec: &RangeByScoreSpec) -> bool {
    if spec.minex || spec.maxex {
        spec.min < spec.max
    } else {
        spec.min <= spec.max
    }
}

fn score_in_range(score: f64, spec: &RangeByScoreSpec) -> bool {
    let above = if spec.minex { score > spec.min } else { score >= spec.min };
    let below = if spec.maxex { score < spec.max } else { score <= spec.max };
    above && below
}

fn less_or_equal_max(score: f64, spec: &RangeByScoreSpec) -> bool {
    if spec.maxex {
        score < spec.max
    } else {
        score <= spec.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rank_spec(min: i64, max: i64) -> RangeByRankSpec {
        RangeByRankSpec { min, max, minex: false, maxex: false, limit: None, reverse: false }
    }

    fn score_spec(min: f64, max: f64) -> RangeByScoreSpec {
        RangeByScoreSpec { min, max, minex: false, maxex: false, limit: None, reverse: false }
    }

    fn keys_of(entries: &[ZSetEntry]) -> Vec<String> {
        entries.iter().map(|e| e.key.clone()).collect()
    }

    #[test]
    fn insert_and_rank_small_form() {
        let mut zset = ZSet::new();
        assert!(zset.is_listpack());
        assert!(zset.insert_or_update("key1", 3.0));
        assert!(zset.insert_or_update("key2", 2.0));
        assert!(zset.insert_or_update("key3", 1.0));
        assert!(zset.insert_or_update("key4", 1.0));
        assert_eq!(zset.size(), 4);

        assert_eq!(zset.rank_of("key3"), Some(0));
        assert_eq!(zset.rank_of("key4"), Some(1));
        assert_eq!(zset.rank_of("key2"), Some(2));
        assert_eq!(zset.rank_of("key1"), Some(3));
        assert_eq!(zset.rank_of("nope"), None);
    }

    #[test]
    fn update_repositions() {
        let mut zset = ZSet::new();
        zset.insert_or_update("key1", 3.0);
        zset.insert_or_update("key2", 2.0);
        zset.insert_or_update("key3", 1.0);

        // same score: no structural change, not an insert
        assert!(!zset.insert_or_update("key1", 3.0));
        // new score moves the member
        assert!(!zset.insert_or_update("key1", 0.5));
        assert_eq!(zset.rank_of("key1"), Some(0));
        assert_eq!(zset.size(), 3);
        assert_eq!(zset.score_of("key1"), Some(0.5));
    }

    #[test]
    fn delete_both_forms() {
        let mut zset = ZSet::new();
        zset.insert_or_update("a", 1.0);
        zset.insert_or_update("b", 2.0);
        assert!(zset.delete("a"));
        assert!(!zset.delete("a"));
        assert_eq!(zset.size(), 1);

        for i in 0..200 {
            zset.insert_or_update(&format!("m{}", i), i as f64);
        }
        assert!(!zset.is_listpack());
        assert!(zset.delete("m42"));
        assert!(!zset.delete("m42"));
        assert_eq!(zset.score_of("m42"), None);
    }

    #[test]
    fn score_ties_break_by_key() {
        let mut zset = ZSet::new();
        zset.insert_or_update("a", 1.0);
        zset.insert_or_update("b", 2.0);
        zset.insert_or_update("a", 2.0);
        let entries = zset.range_by_rank(&rank_spec(0, -1));
        assert_eq!(keys_of(&entries), vec!["a", "b"]);
    }

    #[test]
    fn promotion_past_listpack_bound() {
        let mut zset = ZSet::new();
        for i in 0..LISTPACK_MAX_ENTRIES {
            assert!(zset.insert_or_update(&format!("m{:04}", i), i as f64));
            assert!(zset.is_listpack());
        }
        assert!(zset.insert_or_update("m9999", 9999.0));
        assert!(!zset.is_listpack());
        assert_eq!(zset.size(), LISTPACK_MAX_ENTRIES + 1);

        // order survives the rebuild
        let entries = zset.range_by_rank(&rank_spec(0, -1));
        assert_eq!(entries.len(), LISTPACK_MAX_ENTRIES + 1);
        assert_eq!(entries[0].key, "m0000");
        assert_eq!(entries[LISTPACK_MAX_ENTRIES].key, "m9999");
        if let ZSetBacking::Skiplist(sl) = &mut zset.backing {
            assert!(sl.coherent());
        }
    }

    #[test]
    fn range_by_rank_negative_rebase() {
        let mut zset = ZSet::new();
        for (k, s) in [("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)] {
            zset.insert_or_update(k, s);
        }
        assert_eq!(keys_of(&zset.range_by_rank(&rank_spec(0, -1))), vec!["a", "b", "c", "d"]);
        assert_eq!(keys_of(&zset.range_by_rank(&rank_spec(-2, -1))), vec!["c", "d"]);
        assert_eq!(keys_of(&zset.range_by_rank(&rank_spec(1, 2))), vec!["b", "c"]);
        assert!(zset.range_by_rank(&rank_spec(-10, -9)).is_empty());
    }

    #[test]
    fn range_by_rank_reverse_and_limit() {
        let mut zset = ZSet::new();
        for (k, s) in [("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)] {
            zset.insert_or_update(k, s);
        }
        let spec = RangeByRankSpec { min: 0, max: -1, minex: false, maxex: false, limit: None, reverse: true };
        assert_eq!(keys_of(&zset.range_by_rank(&spec)), vec!["d", "c", "b", "a"]);

        let spec = RangeByRankSpec {
            min: 0, max: -1, minex: false, maxex: false,
            limit: Some(LimitSpec { offset: 1, count: 2 }), reverse: false,
        };
        assert_eq!(keys_of(&zset.range_by_rank(&spec)), vec!["b", "c"]);
    }

    #[test]
    fn range_by_score_inclusive_exclusive() {
        let mut zset = ZSet::new();
        for (k, s) in [("a", 1.0), ("b", 2.0), ("c", 2.0), ("d", 3.0)] {
            zset.insert_or_update(k, s);
        }
        assert_eq!(keys_of(&zset.range_by_score(&score_spec(1.0, 3.0))), vec!["a", "b", "c", "d"]);
        assert_eq!(keys_of(&zset.range_by_score(&score_spec(2.0, 2.0))), vec!["b", "c"]);

        let spec = RangeByScoreSpec { min: 2.0, max: 3.0, minex: true, maxex: false, limit: None, reverse: false };
        assert_eq!(keys_of(&zset.range_by_score(&spec)), vec!["d"]);

        let spec = RangeByScoreSpec { min: 1.0, max: 2.0, minex: false, maxex: true, limit: None, reverse: false };
        assert_eq!(keys_of(&zset.range_by_score(&spec)), vec!["a"]);

        let spec = RangeByScoreSpec {
            min: f64::NEG_INFINITY, max: f64::INFINITY, minex: false, maxex: false, limit: None, reverse: false,
        };
        assert_eq!(zset.range_by_score(&spec).len(), 4);
    }

    #[test]
    fn range_by_score_on_skiplist_form() {
        let mut zset = ZSet::new();
        for i in 0..200 {
            zset.insert_or_update(&format!("m{:03}", i), (i / 2) as f64);
        }
        assert!(!zset.is_listpack());
        // scores 10..=12 cover members 20..=25
        let entries = zset.range_by_score(&score_spec(10.0, 12.0));
        assert_eq!(entries.len(), 6);
        assert_eq!(entries[0].key, "m020");
        assert_eq!(entries[5].key, "m025");

        // exclusive bound drops the whole equal-score run
        let spec = RangeByScoreSpec { min: 10.0, max: 12.0, minex: true, maxex: false, limit: None, reverse: false };
        let entries = zset.range_by_score(&spec);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].key, "m022");

        let spec = RangeByScoreSpec { min: 10.0, max: 12.0, minex: false, maxex: false, limit: None, reverse: true };
        let entries = zset.range_by_score(&spec);
        assert_eq!(entries[0].key, "m025");
        assert_eq!(entries[5].key, "m020");
    }

    #[test]
    fn count_by_score() {
        let mut zset = ZSet::new();
        for (k, s) in [("a", 1.0), ("b", 2.0), ("c", 2.0), ("d", 3.0)] {
            zset.insert_or_update(k, s);
        }
        assert_eq!(zset.count(&score_spec(2.0, 2.0)), 2);
        assert_eq!(zset.count(&score_spec(f64::NEG_INFINITY, f64::INFINITY)), 4);
        let spec = RangeByScoreSpec { min: 2.0, max: 3.0, minex: true, maxex: true, limit: None, reverse: false };
        assert_eq!(zset.count(&spec), 0);
    }
}
