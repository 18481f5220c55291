//! Listpack: a whole list serialized into one contiguous byte blob.
//!
//! Layout: [ total_bytes : u32 BE ][ num_elements : u16 BE ][ entry* ][ 0xff ]
//! Each entry is [ encoding + payload ][ backlen ] where backlen encodes the
//! byte length of the encoding+payload part in a base-128 form that can be
//! read walking backwards, enabling reverse traversal. Positions handed to
//! callers are byte offsets into the blob and are invalidated by any
//! mutating call.

use crate::util::to_int64;

pub const LP_HEADER_SIZE: usize = 6;
const LP_EOF: u8 = 0xff;

const TYPE_7BIT_UINT: u8 = 0;
const TYPE_6BIT_STR: u8 = 0x80;
const TYPE_13BIT_INT: u8 = 0xc0;
const TYPE_12BIT_STR: u8 = 0xe0;
const TYPE_32BIT_STR: u8 = 0xf0;
const TYPE_16BIT_INT: u8 = 0xf1;
const TYPE_24BIT_INT: u8 = 0xf2;
const TYPE_32BIT_INT: u8 = 0xf3;
const TYPE_64BIT_INT: u8 = 0xf4;

const TYPE_7BIT_UINT_MASK: u8 = 0x80;
const TYPE_6BIT_STR_MASK: u8 = 0xc0;
const TYPE_13BIT_INT_MASK: u8 = 0xe0;
const TYPE_12BIT_STR_MASK: u8 = 0xf0;

const INT24_MAX: i64 = (1 << 23) - 1;
const INT24_MIN: i64 = -(1 << 23);

/// Total bytes is a 4 byte unsigned integer, so the blob can never grow
/// past u32::MAX.
const LP_MAX_TOTAL_BYTES: usize = u32::MAX as usize;

/// Budget used by the polymorphic containers to decide whether growing the
/// listpack is still reasonable.
const LP_SAFE_SIZE_LIMIT: usize = 1 << 30;

#[derive(Clone, Copy, PartialEq, Debug)]
enum EncodingType {
    UInt7,
    Str6,
    Int13,
    Str12,
    Str32,
    Int16,
    Int24,
    Int32,
    Int64,
}

impl EncodingType {
    fn is_string(&self) -> bool {
        matches!(self, Self::Str6 | Self::Str12 | Self::Str32)
    }
}

/// A decoded element: integers keep their numeric form, everything else is
/// raw bytes.
#[derive(Clone, PartialEq, Debug)]
pub enum LpValue {
    Int(i64),
    Str(Vec<u8>),
}

impl LpValue {
    pub fn to_string_value(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Str(bytes) => String::from_utf8_lossy(bytes).to_string(),
        }
    }
}

/// An element waiting to be batch inserted.
pub enum LpEntry {
    Int(i64),
    Str(String),
}

pub struct ListPack {
    lp: Vec<u8>,
}

impl ListPack {
    pub fn new() -> ListPack {
        let mut lp = vec![0u8; LP_HEADER_SIZE + 1];
        lp[LP_HEADER_SIZE] = LP_EOF;
        let mut l = ListPack { lp };
        l.set_total_bytes((LP_HEADER_SIZE + 1) as u32);
        l.set_num_of_elements(0);
        l
    }

    pub fn total_bytes(&self) -> u32 {
        ((self.lp[0] as u32) << 24) | ((self.lp[1] as u32) << 16) | ((self.lp[2] as u32) << 8) | self.lp[3] as u32
    }

    pub fn size(&self) -> usize {
        (((self.lp[4] as u16) << 8) | self.lp[5] as u16) as usize
    }

    /// Byte offset of the first element, None when empty.
    pub fn first(&self) -> Option<usize> {
        if self.size() == 0 {
            None
        } else {
            Some(LP_HEADER_SIZE)
        }
    }

    /// Byte offset of the last element, found by decoding the terminal
    /// backlen backwards from just before the EOF byte.
    pub fn last(&self) -> Option<usize> {
        if self.size() == 0 {
            return None;
        }
        let eof = self.total_bytes() as usize - 1;
        let entry_bytes = self.decode_backlen_reverse(eof - 1);
        Some(eof - Self::backlen_bytes(entry_bytes) as usize - entry_bytes)
    }

    /// Beginning of the element after the one at `idx`.
    pub fn next(&self, idx: usize) -> Option<usize> {
        if self.lp[idx] == LP_EOF {
            return None;
        }
        let entry_bytes = self.entry_len(idx);
        let j = idx + entry_bytes + Self::backlen_bytes(entry_bytes) as usize;
        if self.lp[j] == LP_EOF {
            None
        } else {
            Some(j)
        }
    }

    /// Beginning of the element before the one at `idx`.
    pub fn prev(&self, idx: usize) -> Option<usize> {
        if idx <= LP_HEADER_SIZE {
            return None;
        }
        let entry_bytes = self.decode_backlen_reverse(idx - 1);
        Some(idx - Self::backlen_bytes(entry_bytes) as usize - entry_bytes)
    }

    pub fn get(&self, idx: usize) -> Option<LpValue> {
        let encoding = self.encoding_type(idx)?;
        if encoding.is_string() {
            let len = self.decode_string_length(idx, encoding);
            let start = idx + Self::string_header_bytes(encoding);
            Some(LpValue::Str(self.lp[start..start + len].to_vec()))
        } else {
            Some(LpValue::Int(self.decode_integer(idx, encoding)))
        }
    }

    /// Decoded element rendered as a string; integers come back in their
    /// canonical decimal form, which is exactly what was inserted because a
    /// string is only demoted to the integer form when it parses strictly.
    pub fn get_str(&self, idx: usize) -> Option<String> {
        self.get(idx).map(|v| v.to_string_value())
    }

    pub fn append(&mut self, elestr: &str) -> bool {
        let eof = self.total_bytes() as usize - 1;
        self.insert_str_before(eof, elestr)
    }

    pub fn append_integer(&mut self, eleint: i64) -> bool {
        let eof = self.total_bytes() as usize - 1;
        self.insert(eof, Self::encode_entry_int(eleint))
    }

    pub fn prepend(&mut self, elestr: &str) -> bool {
        self.insert_str_before(LP_HEADER_SIZE, elestr)
    }

    /// Insert before the element at `idx` (or before EOF to append).
    pub fn insert_str_before(&mut self, idx: usize, elestr: &str) -> bool {
        self.insert(idx, Self::encode_entry_str(elestr))
    }

    /// Batch append: every entry is encoded first and the blob grows once.
    pub fn batch_append(&mut self, entries: &[LpEntry]) -> bool {
        if entries.is_empty() {
            return false;
        }
        let mut encoded: Vec<u8> = Vec::new();
        for entry in entries {
            let bytes = match entry {
                LpEntry::Int(v) => Self::encode_entry_int(*v),
                LpEntry::Str(s) => Self::encode_entry_str(s),
            };
            encoded.extend_from_slice(&bytes);
        }
        let total = self.total_bytes() as usize;
        if total + encoded.len() > LP_MAX_TOTAL_BYTES {
            return false;
        }
        let eof = total - 1;
        self.lp.splice(eof..eof, encoded.iter().cloned());
        self.set_total_bytes((total + encoded.len()) as u32);
        self.set_num_of_elements((self.size() + entries.len()) as u16);
        true
    }

    /// Replace the element at `idx`, keeping its position.
    pub fn replace(&mut self, idx: usize, elestr: &str) -> bool {
        let cur_bytes = self.entry_len(idx);
        let cur_total = cur_bytes + Self::backlen_bytes(cur_bytes) as usize;
        let encoded = Self::encode_entry_str(elestr);
        let total = self.total_bytes() as usize;
        let new_total = total + encoded.len() - cur_total;
        if new_total > LP_MAX_TOTAL_BYTES {
            return false;
        }
        self.lp.splice(idx..idx + cur_total, encoded.iter().cloned());
        self.set_total_bytes(new_total as u32);
        true
    }

    pub fn delete(&mut self, idx: usize) {
        let total = self.total_bytes() as usize;
        if idx >= total {
            return;
        }
        let entry_bytes = self.entry_len(idx);
        let removed = entry_bytes + Self::backlen_bytes(entry_bytes) as usize;
        self.lp.drain(idx..idx + removed);
        self.set_total_bytes((total - removed) as u32);
        self.set_num_of_elements((self.size() - 1) as u16);
    }

    /// Linear scan for an element equal to `needle`, comparing one element
    /// out of every `skip + 1`. The zset pair layout passes skip = 1 so only
    /// member entries are compared, never scores.
    pub fn find_and_skip(&self, needle: &str, skip: usize) -> Option<usize> {
        let mut idx = self.first();
        while let Some(i) = idx {
            if let Some(s) = self.get_str(i) {
                if s == needle {
                    return Some(i);
                }
            }
            idx = self.next(i);
            for _ in 0..skip {
                idx = match idx {
                    Some(j) => self.next(j),
                    None => return None,
                };
            }
        }
        None
    }

    pub fn find(&self, needle: &str) -> Option<usize> {
        self.find_and_skip(needle, 0)
    }

    /// Whether a listpack (or a hypothetical empty one) stays inside the
    /// budget after adding `add` bytes.
    pub fn safe_to_add(lp: Option<&ListPack>, add: usize) -> bool {
        let len = lp.map_or(0, |l| l.total_bytes() as usize) + add;
        len <= LP_SAFE_SIZE_LIMIT
    }

    /// Estimate the encoded size of `count` copies of the integer `ele`,
    /// header and terminator included. Used to judge intset conversions
    /// without performing them.
    pub fn estimate_bytes(ele: i64, count: usize) -> usize {
        let entry = Self::encode_entry_int(ele);
        LP_HEADER_SIZE + entry.len() * count + 1
    }

    fn set_total_bytes(&mut self, total_bytes: u32) {
        self.lp[0] = (total_bytes >> 24) as u8;
        self.lp[1] = (total_bytes >> 16) as u8;
        self.lp[2] = (total_bytes >> 8) as u8;
        self.lp[3] = total_bytes as u8;
    }

    fn set_num_of_elements(&mut self, num: u16) {
        self.lp[4] = (num >> 8) as u8;
        self.lp[5] = num as u8;
    }

    /// Splice a fully encoded entry (encoding + payload + backlen) in
    /// before byte offset `idx`.
    fn insert(&mut self, idx: usize, encoded: Vec<u8>) -> bool {
        let total = self.total_bytes() as usize;
        if idx >= total {
            return false;
        }
        if total + encoded.len() > LP_MAX_TOTAL_BYTES {
            return false;
        }
        self.lp.splice(idx..idx, encoded.iter().cloned());
        self.set_total_bytes((total + encoded.len()) as u32);
        self.set_num_of_elements((self.size() + 1) as u16);
        true
    }

    /// Encode a string element. A string that parses strictly as an i64 is
    /// demoted to the integer form.
    fn encode_entry_str(elestr: &str) -> Vec<u8> {
        if let Some(v) = to_int64(elestr) {
            return Self::encode_entry_int(v);
        }
        let payload = elestr.as_bytes();
        let len = payload.len();
        let mut buf: Vec<u8> = Vec::with_capacity(len + 10);
        if len <= 63 {
            buf.push(TYPE_6BIT_STR | len as u8);
        } else if len <= 4095 {
            buf.push(TYPE_12BIT_STR | (len >> 8) as u8);
            buf.push(len as u8);
        } else {
            buf.push(TYPE_32BIT_STR);
            buf.push((len >> 24) as u8);
            buf.push((len >> 16) as u8);
            buf.push((len >> 8) as u8);
            buf.push(len as u8);
        }
        buf.extend_from_slice(payload);
        let entry_bytes = buf.len();
        Self::encode_backlen(&mut buf, entry_bytes);
        buf
    }

    /// Encode an integer element into the smallest form whose range holds
    /// it. Negative values are stored two's-complement within the nominal
    /// width; payloads are big-endian.
    fn encode_entry_int(v: i64) -> Vec<u8> {
        let mut buf: Vec<u8> = Vec::with_capacity(10);
        if v >= 0 && v <= 127 {
            buf.push(TYPE_7BIT_UINT | v as u8);
        } else if v >= -4096 && v <= 4095 {
            let mut u = v;
            if u < 0 {
                u += 1 << 13;
            }
            buf.push(TYPE_13BIT_INT | (u >> 8) as u8);
            buf.push(u as u8);
        } else if v >= i16::MIN as i64 && v <= i16::MAX as i64 {
            let mut u = v;
            if u < 0 {
                u += 1 << 16;
            }
            buf.push(TYPE_16BIT_INT);
            buf.push((u >> 8) as u8);
            buf.push(u as u8);
        } else if v >= INT24_MIN && v <= INT24_MAX {
            let mut u = v;
            if u < 0 {
                u += 1 << 24;
            }
            buf.push(TYPE_24BIT_INT);
            buf.push((u >> 16) as u8);
            buf.push((u >> 8) as u8);
            buf.push(u as u8);
        } else if v >= i32::MIN as i64 && v <= i32::MAX as i64 {
            let mut u = v;
            if u < 0 {
                u += 1i64 << 32;
            }
            buf.push(TYPE_32BIT_INT);
            buf.push((u >> 24) as u8);
            buf.push((u >> 16) as u8);
            buf.push((u >> 8) as u8);
            buf.push(u as u8);
        } else {
            let u = v as u64;
            buf.push(TYPE_64BIT_INT);
            buf.push((u >> 56) as u8);
            buf.push((u >> 48) as u8);
            buf.push((u >> 40) as u8);
            buf.push((u >> 32) as u8);
            buf.push((u >> 24) as u8);
            buf.push((u >> 16) as u8);
            buf.push((u >> 8) as u8);
            buf.push(u as u8);
        }
        let entry_bytes = buf.len();
        Self::encode_backlen(&mut buf, entry_bytes);
        buf
    }

    /// Append the base-128 backlen for an entry of `entry_bytes` bytes.
    /// The last written byte holds the lowest 7 bits so the value can be
    /// re-assembled reading byte by byte backwards; every byte except the
    /// first carries the high continuation bit.
    fn encode_backlen(buf: &mut Vec<u8>, entry_bytes: usize) {
        let l = entry_bytes;
        if l <= 127 {
            buf.push(l as u8);
        } else if l < 16384 {
            buf.push((l >> 7) as u8);
            buf.push((l & 127) as u8 | 128);
        } else if l < 2097152 {
            buf.push((l >> 14) as u8);
            buf.push(((l >> 7) & 127) as u8 | 128);
            buf.push((l & 127) as u8 | 128);
        } else if l < 268435456 {
            buf.push((l >> 21) as u8);
            buf.push(((l >> 14) & 127) as u8 | 128);
            buf.push(((l >> 7) & 127) as u8 | 128);
            buf.push((l & 127) as u8 | 128);
        } else {
            buf.push((l >> 28) as u8);
            buf.push(((l >> 21) & 127) as u8 | 128);
            buf.push(((l >> 14) & 127) as u8 | 128);
            buf.push(((l >> 7) & 127) as u8 | 128);
            buf.push((l & 127) as u8 | 128);
        }
    }

    /// Number of bytes the backlen of an entry of `entry_bytes` occupies.
    fn backlen_bytes(entry_bytes: usize) -> u8 {
        if entry_bytes <= 127 {
            1
        } else if entry_bytes < 16384 {
            2
        } else if entry_bytes < 2097152 {
            3
        } else if entry_bytes < 268435456 {
            4
        } else {
            5
        }
    }

    /// Reverse-decode entry point: `idx` is the offset of the LAST backlen
    /// byte (the byte just before the following entry). Walks backwards
    /// while the continuation bit is set.
    fn decode_backlen_reverse(&self, idx: usize) -> usize {
        let mut val: usize = 0;
        let mut shift = 0;
        let mut i = idx;
        loop {
            val |= ((self.lp[i] & 127) as usize) << shift;
            if self.lp[i] & 128 == 0 {
                break;
            }
            shift += 7;
            i -= 1;
        }
        val
    }

    /// Forward entry point: length of the encoding + payload derived from
    /// the first byte of the entry at `idx`. Never reads the backlen.
    fn entry_len(&self, idx: usize) -> usize {
        match self.encoding_type(idx).expect("entry expected") {
            EncodingType::UInt7 => 1,
            EncodingType::Str6 => 1 + self.decode_string_length(idx, EncodingType::Str6),
            EncodingType::Int13 => 2,
            EncodingType::Str12 => 2 + self.decode_string_length(idx, EncodingType::Str12),
            EncodingType::Int16 => 3,
            EncodingType::Int24 => 4,
            EncodingType::Int32 => 5,
            EncodingType::Str32 => 5 + self.decode_string_length(idx, EncodingType::Str32),
            EncodingType::Int64 => 9,
        }
    }

    fn encoding_type(&self, idx: usize) -> Option<EncodingType> {
        let b = self.lp[idx];
        if b & TYPE_7BIT_UINT_MASK == TYPE_7BIT_UINT {
            return Some(EncodingType::UInt7);
        }
        if b & TYPE_6BIT_STR_MASK == TYPE_6BIT_STR {
            return Some(EncodingType::Str6);
        }
        if b & TYPE_13BIT_INT_MASK == TYPE_13BIT_INT {
            return Some(EncodingType::Int13);
        }
        if b & TYPE_12BIT_STR_MASK == TYPE_12BIT_STR {
            return Some(EncodingType::Str12);
        }
        match b {
            TYPE_16BIT_INT => Some(EncodingType::Int16),
            TYPE_24BIT_INT => Some(EncodingType::Int24),
            TYPE_32BIT_INT => Some(EncodingType::Int32),
            TYPE_64BIT_INT => Some(EncodingType::Int64),
            TYPE_32BIT_STR => Some(EncodingType::Str32),
            _ => None,
        }
    }

    fn string_header_bytes(encoding: EncodingType) -> usize {
        match encoding {
            EncodingType::Str6 => 1,
            EncodingType::Str12 => 2,
            _ => 5,
        }
    }

    fn decode_string_length(&self, idx: usize, encoding: EncodingType) -> usize {
        match encoding {
            EncodingType::Str6 => (self.lp[idx] & 0x3f) as usize,
            EncodingType::Str12 => (((self.lp[idx] & 0xf) as usize) << 8) | self.lp[idx + 1] as usize,
            _ => ((self.lp[idx + 1] as usize) << 24) | ((self.lp[idx + 2] as usize) << 16) |
                 ((self.lp[idx + 3] as usize) << 8) | self.lp[idx + 4] as usize,
        }
    }

    /// Unsigned payload plus the negstart/negmax translation restoring
    /// two's-complement values stored within the nominal width.
    fn decode_integer(&self, idx: usize, encoding: EncodingType) -> i64 {
        let lp = &self.lp;
        let (uval, negstart, negmax): (u64, u64, u64) = match encoding {
            EncodingType::UInt7 => ((lp[idx] & 0x7f) as u64, u64::MAX, 0),
            EncodingType::Int13 => (
                (((lp[idx] & 0x1f) as u64) << 8) | lp[idx + 1] as u64,
                1 << 12,
                (u16::MAX >> 3) as u64,
            ),
            EncodingType::Int16 => (
                ((lp[idx + 1] as u64) << 8) | lp[idx + 2] as u64,
                1 << 15,
                u16::MAX as u64,
            ),
            EncodingType::Int24 => (
                ((lp[idx + 1] as u64) << 16) | ((lp[idx + 2] as u64) << 8) | lp[idx + 3] as u64,
                1 << 23,
                (u32::MAX >> 8) as u64,
            ),
            EncodingType::Int32 => (
                ((lp[idx + 1] as u64) << 24) | ((lp[idx + 2] as u64) << 16) |
                ((lp[idx + 3] as u64) << 8) | lp[idx + 4] as u64,
                1 << 31,
                u32::MAX as u64,
            ),
            _ => (
                ((lp[idx + 1] as u64) << 56) | ((lp[idx + 2] as u64) << 48) |
                ((lp[idx + 3] as u64) << 40) | ((lp[idx + 4] as u64) << 32) |
                ((lp[idx + 5] as u64) << 24) | ((lp[idx + 6] as u64) << 16) |
                ((lp[idx + 7] as u64) << 8) | lp[idx + 8] as u64,
                1 << 63,
                u64::MAX,
            ),
        };
        if uval >= negstart {
            let translated = negmax - uval;
            -(translated as i64) - 1
        } else {
            uval as i64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_listpack_shape() {
        let lp = ListPack::new();
        assert_eq!(lp.size(), 0);
        assert_eq!(lp.total_bytes(), 7);
        assert!(lp.first().is_none());
        assert!(lp.last().is_none());
    }

    #[test]
    fn append_and_get_strings() {
        let mut lp = ListPack::new();
        assert!(lp.append("hello"));
        assert!(lp.append("world"));
        assert_eq!(lp.size(), 2);

        let first = lp.first().unwrap();
        assert_eq!(lp.get_str(first), Some("hello".to_string()));
        let second = lp.next(first).unwrap();
        assert_eq!(lp.get_str(second), Some("world".to_string()));
        assert!(lp.next(second).is_none());
        assert_eq!(lp.last(), Some(second));
        assert_eq!(lp.prev(second), Some(first));
        assert!(lp.prev(first).is_none());
    }

    #[test]
    fn integer_forms_round_trip() {
        // one value per encoding family, both signs where applicable
        let values = [
            0i64, 127,                          // 7 bit unsigned
            -1, 128, 4095, -4096,               // 13 bit
            4096, -4097, 32767, -32768,         // 16 bit
            32768, -32769, 8388607, -8388608,   // 24 bit
            8388608, -8388609, i32::MAX as i64, i32::MIN as i64,
            i32::MAX as i64 + 1, i32::MIN as i64 - 1, i64::MAX, i64::MIN,
        ];
        let mut lp = ListPack::new();
        for v in values {
            assert!(lp.append_integer(v));
        }
        assert_eq!(lp.size(), values.len());
        let mut idx = lp.first();
        for v in values {
            let i = idx.unwrap();
            assert_eq!(lp.get(i), Some(LpValue::Int(v)));
            idx = lp.next(i);
        }
        assert!(idx.is_none());
    }

    #[test]
    fn int_looking_string_is_demoted() {
        let mut lp = ListPack::new();
        assert!(lp.append("12345"));
        let first = lp.first().unwrap();
        assert_eq!(lp.get(first), Some(LpValue::Int(12345)));
        // the caller still reads back what it wrote
        assert_eq!(lp.get_str(first), Some("12345".to_string()));
    }

    #[test]
    fn long_strings_pick_wider_length_forms() {
        let mut lp = ListPack::new();
        let s63 = "a".repeat(63);
        let s64 = "b".repeat(64);
        let s4096 = "c".repeat(4096);
        assert!(lp.append(&s63));
        assert!(lp.append(&s64));
        assert!(lp.append(&s4096));

        let i0 = lp.first().unwrap();
        let i1 = lp.next(i0).unwrap();
        let i2 = lp.next(i1).unwrap();
        assert_eq!(lp.get_str(i0), Some(s63));
        assert_eq!(lp.get_str(i1), Some(s64));
        assert_eq!(lp.get_str(i2), Some(s4096.clone()));
        // reverse traversal across the multi-byte backlen
        assert_eq!(lp.prev(i2), Some(i1));
        assert_eq!(lp.last(), Some(i2));
        assert_eq!(lp.get_str(lp.last().unwrap()), Some(s4096));
    }

    #[test]
    fn total_bytes_accounting() {
        let mut lp = ListPack::new();
        lp.append("alpha");
        lp.append_integer(-300);
        lp.append(&"x".repeat(200));
        // header + sum of entries and backlens + terminator
        let mut expected = LP_HEADER_SIZE + 1;
        let mut idx = lp.first();
        while let Some(i) = idx {
            let entry = lp.entry_len(i);
            expected += entry + ListPack::backlen_bytes(entry) as usize;
            idx = lp.next(i);
        }
        assert_eq!(lp.total_bytes() as usize, expected);
        assert_eq!(lp.lp[lp.total_bytes() as usize - 1], LP_EOF);
    }

    #[test]
    fn insert_replace_delete() {
        let mut lp = ListPack::new();
        lp.append("a");
        lp.append("c");
        let second = lp.next(lp.first().unwrap()).unwrap();
        assert!(lp.insert_str_before(second, "b"));
        assert_eq!(lp.size(), 3);

        let i0 = lp.first().unwrap();
        let i1 = lp.next(i0).unwrap();
        assert_eq!(lp.get_str(i1), Some("b".to_string()));

        assert!(lp.replace(i1, "B-replaced"));
        let i1 = lp.next(lp.first().unwrap()).unwrap();
        assert_eq!(lp.get_str(i1), Some("B-replaced".to_string()));
        assert_eq!(lp.size(), 3);

        lp.delete(i1);
        assert_eq!(lp.size(), 2);
        let i0 = lp.first().unwrap();
        assert_eq!(lp.get_str(i0), Some("a".to_string()));
        assert_eq!(lp.get_str(lp.next(i0).unwrap()), Some("c".to_string()));
    }

    #[test]
    fn prepend_goes_first() {
        let mut lp = ListPack::new();
        lp.append("tail");
        lp.prepend("head");
        assert_eq!(lp.get_str(lp.first().unwrap()), Some("head".to_string()));
    }

    #[test]
    fn find_with_stride() {
        let mut lp = ListPack::new();
        // zset style pairs: member, score, member, score
        lp.append("alice");
        lp.append("1.5");
        lp.append("bob");
        lp.append("2.5");
        let bob = lp.find_and_skip("bob", 1).unwrap();
        assert_eq!(lp.get_str(bob), Some("bob".to_string()));
        // "1.5" sits at a score position, the stride must skip it
        assert!(lp.find_and_skip("1.5", 1).is_none());
        assert!(lp.find("1.5").is_some());
    }

    #[test]
    fn batch_append_bulk() {
        let mut lp = ListPack::new();
        let entries = vec![
            LpEntry::Str("one".to_string()),
            LpEntry::Int(2),
            LpEntry::Str("three".to_string()),
        ];
        assert!(lp.batch_append(&entries));
        assert_eq!(lp.size(), 3);
        let i0 = lp.first().unwrap();
        let i1 = lp.next(i0).unwrap();
        let i2 = lp.next(i1).unwrap();
        assert_eq!(lp.get_str(i0), Some("one".to_string()));
        assert_eq!(lp.get(i1), Some(LpValue::Int(2)));
        assert_eq!(lp.get_str(i2), Some("three".to_string()));
    }

    #[test]
    fn backlen_round_trip() {
        for entry_bytes in [1usize, 127, 128, 16383, 16384, 2097151, 2097152, 268435455] {
            let mut buf = Vec::new();
            ListPack::encode_backlen(&mut buf, entry_bytes);
            assert_eq!(buf.len(), ListPack::backlen_bytes(entry_bytes) as usize);
            // decode backwards from the final byte as prev() would
            let mut lp = ListPack::new();
            let idx = lp.lp.len();
            lp.lp.extend_from_slice(&buf);
            assert_eq!(lp.decode_backlen_reverse(idx + buf.len() - 1), entry_bytes);
        }
    }
}
