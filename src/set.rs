//! Polymorphic set. Small all-integer sets live in an intset, small mixed
//! sets in a listpack, and everything else in a dict with unit values.
//! Transitions are monotone: once a set upgrades it never goes back.

use crate::{dict::Dict, intset::IntSet, listpack::ListPack, util::{digits10, to_int64}};

const INTSET_MAX_ENTRIES: usize = 512;
const LISTPACK_MAX_ENTRIES: usize = 128;
const LISTPACK_ELEMENT_MAX_LENGTH: usize = 64;

enum SetBacking {
    IntSet(IntSet),
    ListPack(ListPack),
    Dict(Dict<String, ()>),
}

pub struct Set {
    backing: SetBacking,
}

impl Set {
    pub fn new() -> Set {
        Set { backing: SetBacking::IntSet(IntSet::new()) }
    }

    /// Add the value. Returns true iff the set did not already contain it.
    pub fn add(&mut self, value: &str) -> bool {
        match &mut self.backing {
            SetBacking::IntSet(_) => self.intset_add_and_maybe_convert(value),
            SetBacking::ListPack(_) => self.listpack_add_and_maybe_convert(value),
            SetBacking::Dict(dict) => dict.add(value.to_string(), ()),
        }
    }

    pub fn contains(&mut self, value: &str) -> bool {
        if self.size() == 0 {
            return false;
        }
        match &mut self.backing {
            SetBacking::IntSet(intset) => match to_int64(value) {
                Some(v) => intset.find(v),
                None => false,
            },
            SetBacking::ListPack(lp) => lp.find(value).is_some(),
            SetBacking::Dict(dict) => dict.contains(&value.to_string()),
        }
    }

    /// Remove the value. Returns true if it was present.
    pub fn remove(&mut self, value: &str) -> bool {
        if self.size() == 0 {
            return false;
        }
        match &mut self.backing {
            SetBacking::IntSet(intset) => match to_int64(value) {
                Some(v) => intset.remove(v),
                None => false,
            },
            SetBacking::ListPack(lp) => match lp.find(value) {
                Some(idx) => {
                    lp.delete(idx);
                    true
                },
                None => false,
            },
            SetBacking::Dict(dict) => dict.delete(&value.to_string()),
        }
    }

    pub fn size(&self) -> usize {
        match &self.backing {
            SetBacking::IntSet(intset) => intset.size(),
            SetBacking::ListPack(lp) => lp.size(),
            SetBacking::Dict(dict) => dict.size(),
        }
    }

    /// Every member, rendered as strings. Order is backing-defined.
    pub fn members(&self) -> Vec<String> {
        match &self.backing {
            SetBacking::IntSet(intset) => {
                let mut members = Vec::with_capacity(intset.size());
                for i in 0..intset.size() {
                    members.push(intset.get(i).to_string());
                }
                members
            },
            SetBacking::ListPack(lp) => {
                let mut members = Vec::with_capacity(lp.size());
                let mut idx = lp.first();
                while let Some(i) = idx {
                    if let Some(s) = lp.get_str(i) {
                        members.push(s);
                    }
                    idx = lp.next(i);
                }
                members
            },
            SetBacking::Dict(dict) => dict.keys(),
        }
    }

    /// Add to the intset form, converting on the way out when either the
    /// value is not an integer or the intset outgrew its bound.
    fn intset_add_and_maybe_convert(&mut self, value: &str) -> bool {
        if let Some(v) = to_int64(value) {
            let added = match &mut self.backing {
                SetBacking::IntSet(intset) => intset.add(v),
                _ => unreachable!(),
            };
            if added {
                self.maybe_convert_intset_to_dict();
            }
            return added;
        }
        if !self.maybe_convert_intset_to_listpack(value) {
            // listpack bounds would burst, go straight to the dict
            self.convert_intset_to_dict();
            if let SetBacking::Dict(dict) = &mut self.backing {
                dict.add(value.to_string(), ());
            }
        }
        true
    }

    fn listpack_add_and_maybe_convert(&mut self, value: &str) -> bool {
        let (exists, size, fits) = match &self.backing {
            SetBacking::ListPack(lp) => (
                lp.find(value).is_some(),
                lp.size(),
                ListPack::safe_to_add(Some(lp), value.len()),
            ),
            _ => unreachable!(),
        };
        if exists {
            return false;
        }
        if size < LISTPACK_MAX_ENTRIES && value.len() <= LISTPACK_ELEMENT_MAX_LENGTH && fits {
            match &mut self.backing {
                SetBacking::ListPack(lp) => lp.append(value),
                _ => unreachable!(),
            }
        } else {
            self.convert_listpack_to_dict();
            match &mut self.backing {
                SetBacking::Dict(dict) => dict.add(value.to_string(), ()),
                _ => unreachable!(),
            }
        }
    }

    fn maybe_convert_intset_to_dict(&mut self) {
        let size = match &self.backing {
            SetBacking::IntSet(intset) => intset.size(),
            _ => return,
        };
        if size > INTSET_MAX_ENTRIES {
            self.convert_intset_to_dict();
        }
    }

    /// Try converting intset -> listpack to take one string element. The
    /// estimation assumes every current integer is as wide as the widest
    /// one; refuse when entry count, element length or the byte budget
    /// would already be out of listpack range.
    fn maybe_convert_intset_to_listpack(&mut self, value: &str) -> bool {
        let (size, int_maxlen, est_bytes) = match &self.backing {
            SetBacking::IntSet(intset) => {
                if intset.size() == 0 {
                    (0, 0, 0)
                } else {
                    let max = intset.max();
                    let min = intset.min();
                    let maxint_len = digits10(max.unsigned_abs()) as usize + usize::from(max < 0);
                    let minint_len = digits10(min.unsigned_abs()) as usize + usize::from(min < 0);
                    let est_int = if maxint_len > minint_len { max } else { min };
                    (
                        intset.size(),
                        maxint_len.max(minint_len),
                        ListPack::estimate_bytes(est_int, intset.size()),
                    )
                }
            },
            _ => return false,
        };
        if size < LISTPACK_MAX_ENTRIES
            && value.len() <= LISTPACK_ELEMENT_MAX_LENGTH
            && int_maxlen <= LISTPACK_ELEMENT_MAX_LENGTH
            && ListPack::safe_to_add(None, est_bytes + value.len())
        {
            self.convert_intset_to_listpack(value);
            return true;
        }
        false
    }

    fn convert_intset_to_listpack(&mut self, value: &str) {
        let mut lp = ListPack::new();
        if let SetBacking::IntSet(intset) = &self.backing {
            for i in 0..intset.size() {
                lp.append_integer(intset.get(i));
            }
        }
        lp.append(value);
        self.backing = SetBacking::ListPack(lp);
    }

    fn convert_intset_to_dict(&mut self) {
        let mut dict = Dict::new();
        if let SetBacking::IntSet(intset) = &self.backing {
            for i in 0..intset.size() {
                dict.add(intset.get(i).to_string(), ());
            }
        }
        self.backing = SetBacking::Dict(dict);
    }

    fn convert_listpack_to_dict(&mut self) {
        let mut dict = Dict::new();
        if let SetBacking::ListPack(lp) = &self.backing {
            let mut idx = lp.first();
            while let Some(i) = idx {
                if let Some(s) = lp.get_str(i) {
                    dict.add(s, ());
                }
                idx = lp.next(i);
            }
        }
        self.backing = SetBacking::Dict(dict);
    }

    #[cfg(test)]
    fn backing_name(&self) -> &'static str {
        match self.backing {
            SetBacking::IntSet(_) => "intset",
            SetBacking::ListPack(_) => "listpack",
            SetBacking::Dict(_) => "dict",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_stay_in_intset() {
        let mut set = Set::new();
        assert!(set.add("1"));
        assert!(set.add("2"));
        assert!(!set.add("1"));
        assert_eq!(set.backing_name(), "intset");
        assert_eq!(set.size(), 2);
        assert!(set.contains("1"));
        assert!(!set.contains("3"));
        assert!(set.remove("1"));
        assert!(!set.remove("1"));
    }

    #[test]
    fn string_member_converts_to_listpack() {
        let mut set = Set::new();
        set.add("1");
        set.add("2");
        assert!(set.add("hello"));
        assert_eq!(set.backing_name(), "listpack");
        assert_eq!(set.size(), 3);
        assert!(set.contains("1"));
        assert!(set.contains("hello"));

        let mut members = set.members();
        members.sort();
        assert_eq!(members, vec!["1", "2", "hello"]);
    }

    #[test]
    fn long_string_skips_listpack() {
        let mut set = Set::new();
        set.add("1");
        let long = "x".repeat(65);
        assert!(set.add(&long));
        assert_eq!(set.backing_name(), "dict");
        assert!(set.contains("1"));
        assert!(set.contains(&long));
    }

    #[test]
    fn intset_overflow_converts_to_dict() {
        let mut set = Set::new();
        for i in 0..=INTSET_MAX_ENTRIES as i64 {
            assert!(set.add(&i.to_string()));
        }
        assert_eq!(set.backing_name(), "dict");
        assert_eq!(set.size(), INTSET_MAX_ENTRIES + 1);
        assert!(set.contains("0"));
        assert!(set.contains("512"));
    }

    #[test]
    fn listpack_overflow_converts_to_dict() {
        let mut set = Set::new();
        set.add("seed");
        assert_eq!(set.backing_name(), "listpack");
        for i in 0..LISTPACK_MAX_ENTRIES {
            set.add(&format!("member-{}", i));
        }
        assert_eq!(set.backing_name(), "dict");
        assert_eq!(set.size(), LISTPACK_MAX_ENTRIES + 1);
        assert!(set.contains("seed"));
        assert!(set.contains("member-127"));
    }

    #[test]
    fn members_of_each_backing() {
        let mut set = Set::new();
        set.add("3");
        set.add("1");
        // intset members come out sorted
        assert_eq!(set.members(), vec!["1", "3"]);

        set.add("word");
        let mut members = set.members();
        members.sort();
        assert_eq!(members, vec!["1", "3", "word"]);
    }
}
